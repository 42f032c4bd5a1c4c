//! npm registry client.

use super::error::PkgError;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Registry client for fetching package metadata.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: Url,
    http: Client,
}

impl RegistryClient {
    /// Create a new registry client with the given base URL.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be created.
    pub fn new(base_url: &str) -> Result<Self, PkgError> {
        // Url::join drops the last segment unless the base ends with '/'
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| PkgError::registry(format!("Invalid registry URL '{base_url}': {e}")))?;

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("devsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PkgError::registry(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { base_url, http })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Get the HTTP client (for reuse in tarball downloads).
    #[must_use]
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Fetch the packument (package metadata) for a package.
    ///
    /// # Errors
    /// Returns an error if the request fails or the package is not found.
    pub async fn fetch_packument(&self, name: &str) -> Result<serde_json::Value, PkgError> {
        let url = packument_url(&self.base_url, name)?;

        let response = self.http.get(url.as_str()).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PkgError::not_found(name));
        }

        if !response.status().is_success() {
            return Err(PkgError::registry(format!(
                "Registry returned status {} for '{name}'",
                response.status()
            )));
        }

        let json: serde_json::Value = response.json().await?;
        Ok(json)
    }
}

/// Packument URL; the `/` of a scoped name is percent-encoded.
fn packument_url(base: &Url, name: &str) -> Result<Url, PkgError> {
    let encoded_name = if name.starts_with('@') {
        name.replace('/', "%2F")
    } else {
        name.to_string()
    };

    base.join(&encoded_name)
        .map_err(|e| PkgError::registry(format!("Failed to build URL for '{name}': {e}")))
}

/// Extract the latest version from a packument.
#[must_use]
pub fn get_latest_version(packument: &serde_json::Value) -> Option<&str> {
    packument.get("dist-tags")?.get("latest")?.as_str()
}

/// Extract the tarball URL for a specific version.
#[must_use]
pub fn get_tarball_url<'a>(packument: &'a serde_json::Value, version: &str) -> Option<&'a str> {
    packument
        .get("versions")?
        .get(version)?
        .get("dist")?
        .get("tarball")?
        .as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_latest_version_and_tarball() {
        let packument = serde_json::json!({
            "name": "@tsci/seveibar.led",
            "dist-tags": { "latest": "0.2.0" },
            "versions": {
                "0.2.0": {
                    "dist": {
                        "tarball": "https://registry.npmjs.org/@tsci/seveibar.led/-/seveibar.led-0.2.0.tgz"
                    }
                }
            }
        });

        let latest = get_latest_version(&packument).unwrap();
        assert_eq!(latest, "0.2.0");
        assert!(get_tarball_url(&packument, latest)
            .unwrap()
            .ends_with("seveibar.led-0.2.0.tgz"));
        assert_eq!(get_tarball_url(&packument, "9.9.9"), None);
    }

    #[test]
    fn test_packument_url_encodes_scope() {
        let base = Url::parse("https://registry.example.com/npm/").unwrap();
        assert_eq!(
            packument_url(&base, "@tsci/board").unwrap().as_str(),
            "https://registry.example.com/npm/@tsci%2Fboard"
        );
        assert_eq!(
            packument_url(&base, "left-pad").unwrap().as_str(),
            "https://registry.example.com/npm/left-pad"
        );
    }

    #[test]
    fn test_client_normalizes_trailing_slash() {
        let client = RegistryClient::new("http://127.0.0.1:4873/npm").unwrap();
        assert_eq!(client.base_url().as_str(), "http://127.0.0.1:4873/npm/");
    }

    #[test]
    fn test_client_invalid_url() {
        assert!(RegistryClient::new("not-a-url").is_err());
    }
}
