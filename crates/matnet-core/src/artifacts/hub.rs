//! Hugging Face style hub client: the production [`SnapshotSource`].

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::{FetchError, SnapshotSource};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Repository metadata returned by `GET /api/models/{repo_id}`.
#[derive(Debug, Deserialize)]
struct ModelInfo {
    #[serde(default)]
    siblings: Vec<Sibling>,
}

#[derive(Debug, Deserialize)]
struct Sibling {
    rfilename: String,
}

/// Snapshot source backed by a hub HTTP endpoint. Read access needs no
/// authentication.
pub struct HubClient {
    endpoint: String,
    http: reqwest::blocking::Client,
}

impl HubClient {
    /// Create a client for `endpoint` (e.g. `https://huggingface.co`).
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::NetworkUnreachable`] when the HTTP client
    /// cannot be initialized.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, FetchError> {
        let http = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|error| FetchError::NetworkUnreachable {
                message: error.to_string(),
            })?;
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            http,
        })
    }
}

impl SnapshotSource for HubClient {
    fn list_files(&self, repo_id: &str) -> Result<Vec<String>, FetchError> {
        let url = format!("{}/api/models/{repo_id}", self.endpoint);
        let response = self
            .http
            .get(&url)
            .send()
            .map_err(|error| FetchError::NetworkUnreachable {
                message: error.to_string(),
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::RemoteNotFound {
                repo_id: repo_id.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(FetchError::NetworkUnreachable {
                message: format!("{url} returned HTTP {}", response.status()),
            });
        }

        let info: ModelInfo = response.json().map_err(|error| FetchError::NetworkUnreachable {
            message: format!("malformed repository metadata: {error}"),
        })?;
        Ok(info.siblings.into_iter().map(|s| s.rfilename).collect())
    }

    fn fetch_file(&self, repo_id: &str, name: &str, dest: &Path) -> Result<(), FetchError> {
        let url = format!("{}/{repo_id}/resolve/main/{name}", self.endpoint);
        debug!(%url, dest = %dest.display(), "downloading repository file");

        let mut response = self
            .http
            .get(&url)
            .send()
            .map_err(|error| FetchError::NetworkUnreachable {
                message: error.to_string(),
            })?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::RemoteNotFound {
                repo_id: repo_id.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(FetchError::NetworkUnreachable {
                message: format!("{url} returned HTTP {}", response.status()),
            });
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|error| map_write_error(error, dest))?;
        }
        let mut file = std::fs::File::create(dest).map_err(|error| map_write_error(error, dest))?;
        response
            .copy_to(&mut file)
            .map_err(|error| FetchError::NetworkUnreachable {
                message: format!("transfer of {name} failed: {error}"),
            })?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "hub"
    }
}

fn map_write_error(error: std::io::Error, dest: &Path) -> FetchError {
    if error.kind() == std::io::ErrorKind::StorageFull {
        return FetchError::DiskSpaceExhausted {
            path: dest.to_path_buf(),
            available: 0,
            required: 0,
        };
    }
    FetchError::NetworkUnreachable {
        message: format!("cannot write {}: {error}", dest.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_trailing_slash_is_normalized() {
        let client = HubClient::new("https://huggingface.co/").unwrap();
        assert_eq!(client.endpoint, "https://huggingface.co");
    }

    #[test]
    fn model_info_parses_siblings() {
        let info: ModelInfo = serde_json::from_str(
            r#"{"id":"org/model","siblings":[{"rfilename":"checkpoint"},{"rfilename":"options.json"}]}"#,
        )
        .unwrap();
        let names: Vec<String> = info.siblings.into_iter().map(|s| s.rfilename).collect();
        assert_eq!(names, vec!["checkpoint", "options.json"]);
    }

    #[test]
    fn model_info_tolerates_missing_siblings() {
        let info: ModelInfo = serde_json::from_str(r#"{"id":"org/model"}"#).unwrap();
        assert!(info.siblings.is_empty());
    }
}
