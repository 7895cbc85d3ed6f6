//! Miniconda acquisition when no environment manager is present.
//!
//! Downloads the platform installer to a temporary location, runs it
//! unattended, and verifies the result by re-probing. Installation is
//! idempotent: when conda already answers its version command the call
//! is a no-op success.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::ManagerConfig;
use crate::probe::{home_dir, EnvironmentProbe, ManagerState};
use crate::subprocess::failure_summary;

/// Free space required under the install prefix before the download is
/// attempted. Covers the installer artifact plus the base install.
const MIN_INSTALL_FREE_BYTES: u64 = 2 * 1024 * 1024 * 1024;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Supported host platforms. Anything else is rejected before any
/// network traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    Windows,
}

impl Platform {
    /// Map an `std::env::consts::OS` value to a supported platform.
    pub fn from_os(os: &str) -> Option<Self> {
        match os {
            "linux" => Some(Self::Linux),
            "windows" => Some(Self::Windows),
            _ => None,
        }
    }

    /// Detect the current host platform.
    pub fn detect() -> Option<Self> {
        Self::from_os(std::env::consts::OS)
    }

    fn installer_file(self) -> &'static str {
        match self {
            Self::Linux => "Miniconda3-latest-Linux-x86_64.sh",
            Self::Windows => "Miniconda3-latest-Windows-x86_64.exe",
        }
    }
}

/// Errors from acquiring the environment manager.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InstallError {
    /// The host OS is neither Linux nor Windows.
    #[error("unsupported platform: {os} (only linux and windows are supported)")]
    UnsupportedPlatform {
        /// The unrecognized `std::env::consts::OS` value.
        os: String,
    },

    /// The installer could not be downloaded.
    #[error("installer download failed: {message}")]
    NetworkUnreachable {
        /// Underlying transport or HTTP status detail.
        message: String,
    },

    /// Not enough free space for the installer plus base install.
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

    /// The installer needs elevation that is not available.
    #[error("permission denied while {action}: {message}")]
    PermissionDenied {
        /// What was being attempted.
        action: String,
        /// Underlying detail.
        message: String,
    },

    /// The installer ran but conda still does not answer its version
    /// command, or installation could not be completed.
    #[error("conda installation could not be verified: {message}")]
    VerificationFailed {
        /// Underlying detail.
        message: String,
    },
}

/// Downloads and silently installs Miniconda.
pub struct ManagerInstaller<'a> {
    manager: &'a ManagerConfig,
    probe: &'a EnvironmentProbe,
}

impl<'a> ManagerInstaller<'a> {
    pub fn new(manager: &'a ManagerConfig, probe: &'a EnvironmentProbe) -> Self {
        Self { manager, probe }
    }

    /// Install the environment manager if it is not already valid.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError`] when the platform is unsupported, the
    /// download or silent install fails, or the post-install probe does
    /// not report a valid manager.
    pub fn install(&self) -> Result<(), InstallError> {
        if self.probe.manager_state() == ManagerState::PresentValid {
            debug!("conda already present and valid, skipping install");
            return Ok(());
        }
        self.install_for(std::env::consts::OS)
    }

    fn install_for(&self, os: &str) -> Result<(), InstallError> {
        let platform = Platform::from_os(os).ok_or_else(|| InstallError::UnsupportedPlatform {
            os: os.to_string(),
        })?;

        let prefix = self.install_prefix()?;
        check_free_space(&prefix)?;

        let url = installer_url(&self.manager.installer_base_url, platform);
        info!(%url, "downloading Miniconda installer");

        let staging = tempfile::tempdir().map_err(|error| InstallError::VerificationFailed {
            message: format!("failed to create staging directory: {error}"),
        })?;
        let installer_path = staging.path().join(platform.installer_file());
        download(&url, &installer_path)?;

        info!(prefix = %prefix.display(), "running Miniconda installer unattended");
        run_installer(platform, &installer_path, &prefix)?;

        match self.probe.manager_state() {
            ManagerState::PresentValid => {
                info!("conda installed and verified");
                Ok(())
            }
            state => Err(InstallError::VerificationFailed {
                message: format!("conda probe reports {state:?} after installation"),
            }),
        }
    }

    fn install_prefix(&self) -> Result<PathBuf, InstallError> {
        if let Some(prefix) = &self.manager.install_prefix {
            return Ok(prefix.clone());
        }
        home_dir()
            .map(|home| home.join("miniconda3"))
            .ok_or_else(|| InstallError::VerificationFailed {
                message: "cannot resolve install prefix: HOME not set".to_string(),
            })
    }
}

fn installer_url(base_url: &str, platform: Platform) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        platform.installer_file()
    )
}

/// Measure free space at the closest existing ancestor of `prefix`.
fn check_free_space(prefix: &Path) -> Result<(), InstallError> {
    let mut probe_path = prefix;
    while !probe_path.exists() {
        match probe_path.parent() {
            Some(parent) => probe_path = parent,
            // nothing in the chain exists; let the installer surface it
            None => return Ok(()),
        }
    }

    let Ok(available) = fs2::available_space(probe_path) else {
        debug!(path = %probe_path.display(), "free-space query failed, continuing");
        return Ok(());
    };
    if available < MIN_INSTALL_FREE_BYTES {
        return Err(InstallError::DiskSpaceExhausted {
            path: probe_path.to_path_buf(),
            available,
            required: MIN_INSTALL_FREE_BYTES,
        });
    }
    Ok(())
}

fn download(url: &str, dest: &Path) -> Result<(), InstallError> {
    let client = reqwest::blocking::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .map_err(|error| InstallError::NetworkUnreachable {
            message: error.to_string(),
        })?;

    let mut response = client
        .get(url)
        .send()
        .map_err(|error| InstallError::NetworkUnreachable {
            message: error.to_string(),
        })?;
    if !response.status().is_success() {
        return Err(InstallError::NetworkUnreachable {
            message: format!("installer download returned HTTP {}", response.status()),
        });
    }

    let mut file = std::fs::File::create(dest).map_err(|error| map_io_error(error, "creating installer file"))?;
    response
        .copy_to(&mut file)
        .map_err(|error| InstallError::NetworkUnreachable {
            message: format!("installer transfer failed: {error}"),
        })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dest, std::fs::Permissions::from_mode(0o755))
            .map_err(|error| map_io_error(error, "marking installer executable"))?;
    }

    Ok(())
}

fn run_installer(platform: Platform, installer: &Path, prefix: &Path) -> Result<(), InstallError> {
    let mut command = match platform {
        Platform::Linux => {
            let mut command = Command::new("bash");
            command.arg(installer).arg("-b").arg("-p").arg(prefix);
            command
        }
        Platform::Windows => {
            let mut command = Command::new(installer);
            command.args([
                "/InstallationType=JustMe",
                "/AddToPath=1",
                "/RegisterPython=0",
                "/S",
            ]);
            command
        }
    };

    let output = command
        .output()
        .map_err(|error| map_io_error(error, "launching installer"))?;

    if !output.status.success() {
        let summary = failure_summary(&output);
        if summary.contains("Permission denied") || summary.contains("EACCES") {
            return Err(InstallError::PermissionDenied {
                action: "running installer".to_string(),
                message: summary,
            });
        }
        return Err(InstallError::VerificationFailed {
            message: format!("installer exited unsuccessfully: {summary}"),
        });
    }
    Ok(())
}

fn map_io_error(error: std::io::Error, action: &str) -> InstallError {
    match error.kind() {
        std::io::ErrorKind::PermissionDenied => InstallError::PermissionDenied {
            action: action.to_string(),
            message: error.to_string(),
        },
        _ => InstallError::VerificationFailed {
            message: format!("{action} failed: {error}"),
        },
    }
}
