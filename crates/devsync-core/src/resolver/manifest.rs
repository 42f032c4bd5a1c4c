//! Typed view of the `package.json` fields the resolver reads.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// One node of an `exports` value.
///
/// Conditions nest to any depth, e.g.
/// `{"import": {"types": "./i.d.ts", "default": "./i.js"}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportsTarget {
    /// A path string such as `"./dist/index.js"`.
    Leaf(String),
    /// Condition name to target.
    Conditions(BTreeMap<String, ExportsTarget>),
    /// Alternatives tried in order.
    Fallbacks(Vec<ExportsTarget>),
    /// Explicitly not exported.
    Null,
}

impl From<Value> for ExportsTarget {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Self::Leaf(s),
            Value::Array(items) => Self::Fallbacks(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                Self::Conditions(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
            // Booleans and numbers are not valid targets.
            Value::Null | Value::Bool(_) | Value::Number(_) => Self::Null,
        }
    }
}

/// The top-level `exports` field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "Value")]
pub enum ExportsField {
    /// Sugar for `{ ".": target }`.
    Target(ExportsTarget),
    /// Keys are `"."`, `"./sub"`, or single-`*` patterns like `"./icons/*"`.
    Subpaths(BTreeMap<String, ExportsTarget>),
}

impl From<Value> for ExportsField {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) if map.keys().any(|k| k.starts_with('.')) => Self::Subpaths(
                map.into_iter()
                    .filter(|(k, _)| k.starts_with('.'))
                    .map(|(k, v)| (k, ExportsTarget::from(v)))
                    .collect(),
            ),
            other => Self::Target(ExportsTarget::from(other)),
        }
    }
}

/// Parsed `package.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, deserialize_with = "string_or_none")]
    pub main: Option<String>,
    #[serde(default, deserialize_with = "string_or_none")]
    pub module: Option<String>,
    #[serde(default, deserialize_with = "string_or_none")]
    pub types: Option<String>,
    #[serde(default, deserialize_with = "string_or_none")]
    pub typings: Option<String>,
    #[serde(default)]
    pub exports: Option<ExportsField>,
    #[serde(default, deserialize_with = "string_map")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "string_map")]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "string_map")]
    pub peer_dependencies: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "string_map")]
    pub optional_dependencies: BTreeMap<String, String>,
}

impl PackageManifest {
    /// Parse manifest JSON.
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Read and parse `package.json` at `path`.
    pub fn read(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::from_json(&content).map_err(|e| ManifestError {
            message: format!("invalid JSON in {}: {e}", path.display()),
        })
    }

    /// The declared type entry (`types`, else `typings`).
    #[must_use]
    pub fn types_entry(&self) -> Option<&str> {
        self.types.as_deref().or(self.typings.as_deref())
    }
}

/// A `package.json` that could not be read or parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ManifestError {
    pub message: String,
}

/// Dependency sections keep only string ranges; other values are ignored.
fn string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Object(map) => map
            .into_iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
            .collect(),
        _ => BTreeMap::new(),
    })
}

fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().map(ToString::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exports_string_is_target() {
        let field = ExportsField::from(json!("./index.js"));
        assert_eq!(
            field,
            ExportsField::Target(ExportsTarget::Leaf("./index.js".into()))
        );
    }

    #[test]
    fn test_exports_root_conditions_are_target() {
        let field = ExportsField::from(json!({ "import": "./a.mjs", "require": "./a.cjs" }));
        assert!(matches!(field, ExportsField::Target(ExportsTarget::Conditions(_))));
    }

    #[test]
    fn test_exports_subpath_map() {
        let field = ExportsField::from(json!({
            ".": { "import": { "types": "./d.ts", "default": "./i.js" } },
            "./icons/*": "./dist/icons/*.js",
            "./internal": null
        }));
        let ExportsField::Subpaths(map) = field else {
            panic!("expected subpaths");
        };
        assert_eq!(map.len(), 3);
        assert_eq!(map["./internal"], ExportsTarget::Null);
        let ExportsTarget::Conditions(root) = &map["."] else {
            panic!("expected conditions");
        };
        assert!(matches!(root["import"], ExportsTarget::Conditions(_)));
    }

    #[test]
    fn test_manifest_parses_fields() {
        let manifest = PackageManifest::from_json(
            r#"{
                "name": "@tsci/demo",
                "version": "1.2.3",
                "main": "dist/index.js",
                "typings": "dist/index.d.ts",
                "dependencies": { "left-pad": "^1.0.0", "bad": 42 },
                "peerDependencies": { "react": "*" }
            }"#,
        )
        .unwrap();
        assert_eq!(manifest.name.as_deref(), Some("@tsci/demo"));
        assert_eq!(manifest.main.as_deref(), Some("dist/index.js"));
        assert_eq!(manifest.types_entry(), Some("dist/index.d.ts"));
        assert_eq!(manifest.dependencies.len(), 1);
        assert!(manifest.peer_dependencies.contains_key("react"));
        assert!(manifest.exports.is_none());
    }

    #[test]
    fn test_manifest_non_string_main_is_ignored() {
        let manifest = PackageManifest::from_json(r#"{ "main": false }"#).unwrap();
        assert!(manifest.main.is_none());
    }

    #[test]
    fn test_manifest_invalid_json() {
        assert!(PackageManifest::from_json("{ nope").is_err());
    }
}
