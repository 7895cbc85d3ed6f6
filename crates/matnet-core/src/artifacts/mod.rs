//! Checkpoint artifact validation, fetching, and layout repair.
//!
//! The remote repository is versioned as a unit, so a partial local set
//! is never patched file-by-file: any invalid required file triggers a
//! full snapshot re-fetch. Validity is existence plus non-zero size;
//! content-hash verification would slot into
//! [`ArtifactManifest::validate`] if the repository ever publishes
//! digests.

mod hub;
mod repair;

pub use hub::HubClient;
pub use repair::{repair_layout, LayoutRepair};

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

/// Free space required under the checkpoint directory before a fetch is
/// attempted.
const MIN_FETCH_FREE_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// The set of files that must exist, non-empty, under the checkpoint
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactManifest {
    files: Vec<String>,
}

/// Validity of one required file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCheck {
    /// Relative path under the checkpoint directory.
    pub name: String,
    /// Exists and has non-zero size.
    pub valid: bool,
    /// Size in bytes; zero when missing.
    pub size: u64,
}

impl ArtifactManifest {
    pub fn new(files: Vec<String>) -> Self {
        Self { files }
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Check every required file under `dir`.
    pub fn validate(&self, dir: &Path) -> Vec<FileCheck> {
        self.files
            .iter()
            .map(|name| {
                let size = std::fs::metadata(dir.join(name))
                    .ok()
                    .filter(std::fs::Metadata::is_file)
                    .map_or(0, |meta| meta.len());
                FileCheck {
                    name: name.clone(),
                    valid: size > 0,
                    size,
                }
            })
            .collect()
    }

    /// Names of required files that are missing or empty under `dir`.
    pub fn missing(&self, dir: &Path) -> Vec<String> {
        self.validate(dir)
            .into_iter()
            .filter(|check| !check.valid)
            .map(|check| check.name)
            .collect()
    }

    /// Whether every required file is present and non-empty.
    pub fn is_complete(&self, dir: &Path) -> bool {
        self.missing(dir).is_empty()
    }
}

/// Errors from ensuring checkpoint artifacts.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// The hub could not be reached or the transfer failed.
    #[error("hub unreachable: {message}")]
    NetworkUnreachable {
        /// Underlying transport or HTTP status detail.
        message: String,
    },

    /// Not enough free space under the checkpoint directory.
    #[error(
        "not enough free disk space at {}: {available} bytes available, {required} required",
        path.display()
    )]
    DiskSpaceExhausted {
        /// Where free space was measured.
        path: PathBuf,
        /// Bytes available.
        available: u64,
        /// Bytes required.
        required: u64,
    },

    /// The repository id is invalid or the repository has moved.
    #[error("model repository not found: {repo_id}")]
    RemoteNotFound {
        /// The repository id that failed to resolve.
        repo_id: String,
    },

    /// The fetch completed but required files are still invalid.
    #[error("checkpoint download incomplete, still missing: {}", missing_files.join(", "))]
    IncompleteDownload {
        /// Required files missing or empty after the fetch.
        missing_files: Vec<String>,
    },
}

/// Where snapshot files come from. The production implementation is
/// [`HubClient`]; tests substitute an in-memory source.
pub trait SnapshotSource {
    /// List the relative file paths available in the repository.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::RemoteNotFound`] when the repository does
    /// not resolve and [`FetchError::NetworkUnreachable`] on transport
    /// failures.
    fn list_files(&self, repo_id: &str) -> Result<Vec<String>, FetchError>;

    /// Download one repository file to `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on transport or write failure.
    fn fetch_file(&self, repo_id: &str, name: &str, dest: &Path) -> Result<(), FetchError>;

    /// Source name for logging.
    fn name(&self) -> &'static str;
}

/// Ensures the checkpoint directory satisfies a manifest, fetching the
/// full snapshot when it does not.
pub struct ArtifactFetcher<'a, S: SnapshotSource> {
    source: &'a S,
    repo_id: &'a str,
}

impl<'a, S: SnapshotSource> ArtifactFetcher<'a, S> {
    pub fn new(source: &'a S, repo_id: &'a str) -> Self {
        Self { source, repo_id }
    }

    /// Make every required file valid under `dest`.
    ///
    /// When the manifest is already satisfied no network call is made.
    /// Otherwise the complete artifact set is re-fetched; the local
    /// partial set is not trusted.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when the repository cannot be resolved,
    /// the transfer fails, space runs out, or required files remain
    /// invalid after the fetch.
    pub fn ensure(&self, manifest: &ArtifactManifest, dest: &Path) -> Result<(), FetchError> {
        let missing = manifest.missing(dest);
        if missing.is_empty() {
            debug!(dir = %dest.display(), "checkpoints already valid, skipping fetch");
            return Ok(());
        }

        info!(
            repo = %self.repo_id,
            source = %self.source.name(),
            missing = %missing.join(", "),
            "checkpoints invalid, fetching full snapshot"
        );

        std::fs::create_dir_all(dest).map_err(|error| FetchError::NetworkUnreachable {
            message: format!("cannot create {}: {error}", dest.display()),
        })?;
        check_free_space(dest)?;

        let files = self.source.list_files(self.repo_id)?;
        if files.is_empty() {
            return Err(FetchError::RemoteNotFound {
                repo_id: self.repo_id.to_string(),
            });
        }

        for name in &files {
            debug!(file = %name, "fetching");
            self.source.fetch_file(self.repo_id, name, &dest.join(name))?;
        }

        let still_missing = manifest.missing(dest);
        if !still_missing.is_empty() {
            return Err(FetchError::IncompleteDownload {
                missing_files: still_missing,
            });
        }

        info!(dir = %dest.display(), "checkpoints fetched and verified");
        Ok(())
    }
}

fn check_free_space(dest: &Path) -> Result<(), FetchError> {
    let Ok(available) = fs2::available_space(dest) else {
        debug!(path = %dest.display(), "free-space query failed, continuing");
        return Ok(());
    };
    if available < MIN_FETCH_FREE_BYTES {
        return Err(FetchError::DiskSpaceExhausted {
            path: dest.to_path_buf(),
            available,
            required: MIN_FETCH_FREE_BYTES,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn manifest() -> ArtifactManifest {
        ArtifactManifest::new(vec![
            "checkpoint".to_string(),
            "options.json".to_string(),
        ])
    }

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    /// In-memory snapshot source recording every call.
    struct FakeSource {
        files: Vec<(&'static str, &'static str)>,
        list_calls: Mutex<u32>,
        fetch_calls: Mutex<Vec<String>>,
        missing_repo: bool,
    }

    impl FakeSource {
        fn new(files: Vec<(&'static str, &'static str)>) -> Self {
            Self {
                files,
                list_calls: Mutex::new(0),
                fetch_calls: Mutex::new(Vec::new()),
                missing_repo: false,
            }
        }
    }

    impl SnapshotSource for FakeSource {
        fn list_files(&self, repo_id: &str) -> Result<Vec<String>, FetchError> {
            *self.list_calls.lock().unwrap() += 1;
            if self.missing_repo {
                return Err(FetchError::RemoteNotFound {
                    repo_id: repo_id.to_string(),
                });
            }
            Ok(self.files.iter().map(|(name, _)| (*name).to_string()).collect())
        }

        fn fetch_file(&self, _repo_id: &str, name: &str, dest: &Path) -> Result<(), FetchError> {
            self.fetch_calls.lock().unwrap().push(name.to_string());
            let content = self
                .files
                .iter()
                .find(|(file, _)| *file == name)
                .map(|(_, content)| *content)
                .unwrap_or_default();
            std::fs::write(dest, content).unwrap();
            Ok(())
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    #[test]
    fn validate_reports_missing_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "checkpoint", "data");
        write(dir.path(), "options.json", "");

        let checks = manifest().validate(dir.path());
        assert_eq!(checks.len(), 2);
        assert!(checks[0].valid);
        assert_eq!(checks[0].size, 4);
        assert!(!checks[1].valid, "empty file must be invalid");
        assert_eq!(manifest().missing(dir.path()), vec!["options.json"]);
    }

    #[test]
    fn valid_manifest_makes_no_network_call() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "checkpoint", "data");
        write(dir.path(), "options.json", "{}");

        let source = FakeSource::new(vec![]);
        let fetcher = ArtifactFetcher::new(&source, "org/model");
        fetcher.ensure(&manifest(), dir.path()).unwrap();
        assert_eq!(*source.list_calls.lock().unwrap(), 0);
        assert!(source.fetch_calls.lock().unwrap().is_empty());
    }

    #[test]
    fn partial_set_triggers_full_refetch() {
        let dir = tempfile::tempdir().unwrap();
        // one of two required files present: the whole snapshot must be
        // re-fetched, not just the missing file
        write(dir.path(), "checkpoint", "stale");

        let source = FakeSource::new(vec![
            ("checkpoint", "fresh"),
            ("options.json", "{}"),
            ("README.md", "extra repo file"),
        ]);
        let fetcher = ArtifactFetcher::new(&source, "org/model");
        fetcher.ensure(&manifest(), dir.path()).unwrap();

        let fetched = source.fetch_calls.lock().unwrap().clone();
        assert_eq!(fetched, vec!["checkpoint", "options.json", "README.md"]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("checkpoint")).unwrap(),
            "fresh"
        );
        assert!(manifest().is_complete(dir.path()));
    }

    #[test]
    fn incomplete_download_names_the_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::new(vec![("checkpoint", "data")]);
        let fetcher = ArtifactFetcher::new(&source, "org/model");
        let err = fetcher.ensure(&manifest(), dir.path()).unwrap_err();
        match err {
            FetchError::IncompleteDownload { missing_files } => {
                assert_eq!(missing_files, vec!["options.json"]);
            }
            other => panic!("expected IncompleteDownload, got {other:?}"),
        }
    }

    #[test]
    fn missing_repository_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = FakeSource::new(vec![]);
        source.missing_repo = true;
        let fetcher = ArtifactFetcher::new(&source, "org/model");
        let err = fetcher.ensure(&manifest(), dir.path()).unwrap_err();
        assert!(matches!(err, FetchError::RemoteNotFound { .. }));
    }

    #[test]
    fn empty_repository_listing_is_remote_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::new(vec![]);
        let fetcher = ArtifactFetcher::new(&source, "org/model");
        let err = fetcher.ensure(&manifest(), dir.path()).unwrap_err();
        assert!(matches!(err, FetchError::RemoteNotFound { .. }));
    }
}
