//! Package.json exports field evaluation.
//!
//! Implements the parts of Node.js exports resolution a browser-side ESM
//! loader needs:
//! - Root exports (string, conditions, or `"."` key)
//! - Subpath exports (`"./feature"`)
//! - Pattern exports with a single `*` wildcard, most specific first
//! - Conditional exports nested to any depth, with array fallbacks

use super::manifest::{ExportsField, ExportsTarget, PackageManifest};

/// Conditions honoured, highest priority first. `require`, `types`, and
/// anything else never match.
pub const CONDITION_PRIORITY: &[&str] = &["import", "module", "node", "default"];

/// Outcome of evaluating one exports target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetResolution<'a> {
    /// A `./`-relative path.
    Found(&'a str),
    /// The target is `null`: the subpath is deliberately hidden.
    Excluded,
    /// No condition matched and no alternative produced a path.
    Unmatched,
}

impl<'a> TargetResolution<'a> {
    #[must_use]
    pub fn path(self) -> Option<&'a str> {
        match self {
            Self::Found(p) => Some(p),
            Self::Excluded | Self::Unmatched => None,
        }
    }
}

/// Evaluate a target recursively.
///
/// A conditions object is descended, never read as a path: the first
/// honoured condition that does not come back `Unmatched` decides.
#[must_use]
pub fn resolve_target(target: &ExportsTarget) -> TargetResolution<'_> {
    match target {
        ExportsTarget::Leaf(path) => {
            if path.starts_with("./") {
                TargetResolution::Found(path)
            } else {
                TargetResolution::Unmatched
            }
        }
        ExportsTarget::Null => TargetResolution::Excluded,
        ExportsTarget::Conditions(conditions) => CONDITION_PRIORITY
            .iter()
            .filter_map(|name| conditions.get(*name))
            .map(resolve_target)
            .find(|r| *r != TargetResolution::Unmatched)
            .unwrap_or(TargetResolution::Unmatched),
        ExportsTarget::Fallbacks(alternatives) => alternatives
            .iter()
            .map(resolve_target)
            .find(|r| matches!(r, TargetResolution::Found(_)))
            .unwrap_or(TargetResolution::Unmatched),
    }
}

/// Resolve `subpath` (`"."` or `"./..."`) against an exports field.
///
/// Returns the package-relative target with any `*` substituted.
#[must_use]
pub fn resolve_exports(exports: &ExportsField, subpath: &str) -> Option<String> {
    match exports {
        ExportsField::Target(target) => {
            if subpath == "." {
                resolve_target(target).path().map(ToString::to_string)
            } else {
                None
            }
        }
        ExportsField::Subpaths(map) => {
            if let Some(target) = map.get(subpath) {
                return resolve_target(target).path().map(ToString::to_string);
            }
            resolve_exports_pattern(map, subpath)
        }
    }
}

/// Match `subpath` against single-`*` pattern keys.
///
/// The longest key wins; ties break lexicographically.
fn resolve_exports_pattern(
    map: &std::collections::BTreeMap<String, ExportsTarget>,
    subpath: &str,
) -> Option<String> {
    let (_, target, star_value) = map
        .iter()
        .filter(|(key, _)| key.starts_with("./") && key.matches('*').count() == 1)
        .filter_map(|(key, target)| {
            match_pattern(key, subpath).map(|star| (key.as_str(), target, star))
        })
        .min_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)))?;

    let resolved = resolve_target(target).path()?;
    substitute_star(resolved, star_value)
}

/// Match a pattern key against a subpath.
///
/// Returns the `*` substitution value if matched.
/// E.g., pattern `"./features/*"` with subpath `"./features/foo"` returns `Some("foo")`.
fn match_pattern<'s>(pattern: &str, subpath: &'s str) -> Option<&'s str> {
    let (prefix, suffix) = pattern.split_once('*')?;
    let rest = subpath.strip_prefix(prefix)?;
    let star = rest.strip_suffix(suffix)?;
    (!star.is_empty()).then_some(star)
}

/// Substitute `*` in target with the star value.
///
/// Rejects targets without exactly one `*` and results that traverse upward.
fn substitute_star(target: &str, star_value: &str) -> Option<String> {
    if target.matches('*').count() != 1 {
        return None;
    }

    let result = target.replacen('*', star_value, 1);
    if result.split('/').any(|segment| segment == "..") {
        return None;
    }

    Some(result)
}

/// Candidate entry files for `subpath` of a package, best first.
///
/// Paths are package-relative without a leading `./`. Existence is the
/// caller's concern.
///
/// - With `exports`: the matching export; a `"."` miss still falls back to
///   `main`/`module`, any other miss yields nothing.
/// - Without `exports`: `"."` tries `main`, `module`, `index.js`; other
///   subpaths map straight onto the package directory.
#[must_use]
pub fn resolve_entry_files(manifest: Option<&PackageManifest>, subpath: &str) -> Vec<String> {
    let subpath = if subpath.is_empty() { "." } else { subpath };

    if let Some(exports) = manifest.and_then(|m| m.exports.as_ref()) {
        if let Some(target) = resolve_exports(exports, subpath) {
            return vec![strip_dot_slash(&target)];
        }
        if subpath != "." {
            return Vec::new();
        }
    }

    if subpath != "." {
        return vec![strip_dot_slash(subpath)];
    }

    let mut candidates = Vec::new();
    if let Some(m) = manifest {
        for field in [m.main.as_deref(), m.module.as_deref()].into_iter().flatten() {
            let candidate = strip_dot_slash(field);
            if !candidate.is_empty() && !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
    }
    if !candidates.iter().any(|c| c == "index.js") {
        candidates.push("index.js".to_string());
    }
    candidates
}

fn strip_dot_slash(path: &str) -> String {
    path.trim_start_matches("./").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(value: serde_json::Value) -> PackageManifest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_exports_string_root() {
        let m = manifest(json!({ "exports": "./dist/index.js" }));
        assert_eq!(resolve_entry_files(Some(&m), "."), vec!["dist/index.js"]);
        assert!(resolve_entry_files(Some(&m), "./other").is_empty());
    }

    #[test]
    fn test_exports_one_level_conditions() {
        let m = manifest(json!({
            "exports": { ".": { "require": "./cjs.js", "import": "./esm.js" } }
        }));
        assert_eq!(resolve_entry_files(Some(&m), "."), vec!["esm.js"]);
    }

    #[test]
    fn test_exports_nested_conditions_skip_types() {
        let m = manifest(json!({
            "exports": { ".": { "import": { "types": "./d.ts", "default": "./i.js" } } }
        }));
        assert_eq!(resolve_entry_files(Some(&m), "."), vec!["i.js"]);
    }

    #[test]
    fn test_exports_three_levels_deep() {
        let m = manifest(json!({
            "exports": {
                ".": {
                    "node": {
                        "import": {
                            "types": "./types/index.d.mts",
                            "default": "./dist/node/index.mjs"
                        },
                        "require": "./dist/node/index.cjs"
                    },
                    "default": "./dist/browser.js"
                }
            }
        }));
        assert_eq!(resolve_entry_files(Some(&m), "."), vec!["dist/node/index.mjs"]);
    }

    #[test]
    fn test_condition_priority_ignores_key_order() {
        let m = manifest(json!({
            "exports": { "default": "./d.js", "module": "./m.js", "import": "./i.js" }
        }));
        assert_eq!(resolve_entry_files(Some(&m), "."), vec!["i.js"]);
    }

    #[test]
    fn test_unmatched_condition_falls_through() {
        let m = manifest(json!({
            "exports": {
                ".": {
                    "import": { "types": "./only-types.d.ts" },
                    "default": "./fallback.js"
                }
            }
        }));
        assert_eq!(resolve_entry_files(Some(&m), "."), vec!["fallback.js"]);
    }

    #[test]
    fn test_require_only_is_unresolved() {
        let m = manifest(json!({ "exports": { "./cjs": { "require": "./c.js" } } }));
        assert!(resolve_entry_files(Some(&m), "./cjs").is_empty());
    }

    #[test]
    fn test_null_target_excludes() {
        let m = manifest(json!({
            "exports": { "./internal/*": null, "./*": "./src/*.js" }
        }));
        assert!(resolve_entry_files(Some(&m), "./internal/secret").is_empty());
        assert_eq!(resolve_entry_files(Some(&m), "./public"), vec!["src/public.js"]);
    }

    #[test]
    fn test_null_condition_stops_fallthrough() {
        let target = ExportsTarget::from(json!({ "import": null, "default": "./d.js" }));
        assert_eq!(resolve_target(&target), TargetResolution::Excluded);
    }

    #[test]
    fn test_array_fallbacks() {
        let target = ExportsTarget::from(json!([
            "not-relative.js",
            { "require": "./c.js" },
            { "import": "./ok.js" },
            "./later.js"
        ]));
        assert_eq!(resolve_target(&target), TargetResolution::Found("./ok.js"));
    }

    #[test]
    fn test_pattern_most_specific_wins() {
        let m = manifest(json!({
            "exports": {
                "./*": "./dist/*.js",
                "./icons/*": { "import": "./dist/icons/*.mjs" }
            }
        }));
        assert_eq!(
            resolve_entry_files(Some(&m), "./icons/led"),
            vec!["dist/icons/led.mjs"]
        );
        assert_eq!(resolve_entry_files(Some(&m), "./board"), vec!["dist/board.js"]);
    }

    #[test]
    fn test_pattern_rejects_traversal() {
        let m = manifest(json!({ "exports": { "./*": "./dist/*" } }));
        assert!(resolve_entry_files(Some(&m), "./../../etc/passwd").is_empty());
    }

    #[test]
    fn test_exact_subpath() {
        let m = manifest(json!({
            "exports": { ".": "./index.js", "./feature": { "default": "./feature.js" } }
        }));
        assert_eq!(resolve_entry_files(Some(&m), "./feature"), vec!["feature.js"]);
    }

    #[test]
    fn test_root_miss_falls_back_to_main() {
        let m = manifest(json!({
            "main": "./lib/main.js",
            "exports": { "./feature": "./feature.js" }
        }));
        assert_eq!(resolve_entry_files(Some(&m), "."), vec!["lib/main.js", "index.js"]);
    }

    #[test]
    fn test_no_exports_main_module_index() {
        let m = manifest(json!({ "main": "main.js", "module": "esm/index.js" }));
        assert_eq!(
            resolve_entry_files(Some(&m), "."),
            vec!["main.js", "esm/index.js", "index.js"]
        );
        assert_eq!(resolve_entry_files(Some(&m), "./utils/x"), vec!["utils/x"]);
    }

    #[test]
    fn test_no_manifest() {
        assert_eq!(resolve_entry_files(None, "."), vec!["index.js"]);
        assert_eq!(resolve_entry_files(None, "./lib/a"), vec!["lib/a"]);
    }
}
