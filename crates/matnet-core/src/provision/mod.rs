//! Creation of the named environment and installation of its pinned
//! dependency set.
//!
//! Packages are installed one at a time in declared order so a version
//! conflict fails deterministically at the same package on every run.
//! The provisioner's postcondition is a `Ready` probe, verified before
//! returning.

use std::path::Path;
use std::process::Command;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{EnvironmentDescriptor, PackageSpec};
use crate::probe::{EnvironmentProbe, EnvironmentState};
use crate::subprocess::failure_summary;

/// Anaconda channels whose Terms of Service must be accepted before
/// newer conda versions will create environments.
const TOS_CHANNELS: [&str; 2] = [
    "https://repo.anaconda.com/pkgs/main",
    "https://repo.anaconda.com/pkgs/r",
];

/// Errors from provisioning the named environment.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProvisionError {
    /// No conda executable could be located.
    #[error("conda executable not found")]
    ManagerUnavailable,

    /// The pinned interpreter version is not resolvable by the manager.
    #[error("pinned interpreter python={version} could not be resolved: {message}")]
    InterpreterUnavailable {
        /// The requested interpreter pin.
        version: String,
        /// Conda's diagnostics.
        message: String,
    },

    /// Package download failed at the network layer.
    #[error("network unreachable while installing {package}: {message}")]
    NetworkUnreachable {
        /// Package being installed when the failure occurred.
        package: String,
        /// Underlying detail.
        message: String,
    },

    /// A package failed to install for non-network reasons.
    #[error("failed to install {package}: {message}")]
    DependencyConflict {
        /// The offending package.
        package: String,
        /// Installer diagnostics.
        message: String,
    },

    /// The filesystem filled up during provisioning.
    #[error("disk space exhausted while provisioning: {message}")]
    DiskSpaceExhausted {
        /// Underlying detail.
        message: String,
    },

    /// Installation reported success but the environment still does not
    /// probe `Ready`.
    #[error("environment verification failed: {package} is not importable after install")]
    DependencyVerificationFailed {
        /// The first package (in declared order) that fails its import
        /// check.
        package: String,
    },
}

/// Creates the environment and installs its dependency set.
pub struct EnvironmentProvisioner<'a> {
    descriptor: &'a EnvironmentDescriptor,
    probe: &'a EnvironmentProbe,
}

impl<'a> EnvironmentProvisioner<'a> {
    pub fn new(descriptor: &'a EnvironmentDescriptor, probe: &'a EnvironmentProbe) -> Self {
        Self { descriptor, probe }
    }

    /// Bring the named environment to `Ready`.
    ///
    /// A `Ready` environment is a no-op success. An `Absent` environment
    /// is created first; an `Absent` or `PartiallyCreated` environment
    /// then has the full dependency set installed, in declared order.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when creation or any install step
    /// fails, or when the post-install probe does not report `Ready`.
    pub fn provision(&self) -> Result<(), ProvisionError> {
        let conda = self.probe.locate().ok_or(ProvisionError::ManagerUnavailable)?;

        match self.probe.environment_state(self.descriptor) {
            EnvironmentState::Ready => {
                debug!(environment = %self.descriptor.name, "environment already ready");
                return Ok(());
            }
            EnvironmentState::Absent => {
                accept_channel_terms(&conda);
                self.create_environment(&conda)?;
            }
            EnvironmentState::PartiallyCreated => {
                info!(
                    environment = %self.descriptor.name,
                    "environment exists but is incomplete, reinstalling dependency set"
                );
            }
        }

        for package in &self.descriptor.packages {
            self.install_package(&conda, package)?;
        }

        match self.probe.environment_state(self.descriptor) {
            EnvironmentState::Ready => {
                info!(environment = %self.descriptor.name, "environment provisioned and verified");
                Ok(())
            }
            _ => {
                let package = self
                    .probe
                    .first_unimportable(&conda, self.descriptor)
                    .unwrap_or_else(|| "python".to_string());
                Err(ProvisionError::DependencyVerificationFailed { package })
            }
        }
    }

    fn create_environment(&self, conda: &Path) -> Result<(), ProvisionError> {
        let python_spec = format!("python={}", self.descriptor.python_version);
        info!(
            environment = %self.descriptor.name,
            python = %self.descriptor.python_version,
            "creating conda environment"
        );

        let output = Command::new(conda)
            .args(["create", "-n", &self.descriptor.name, &python_spec, "-y"])
            .args(["-c", "conda-forge"])
            .output()
            .map_err(|_| ProvisionError::ManagerUnavailable)?;

        if output.status.success() {
            return Ok(());
        }

        let message = failure_summary(&output);
        Err(match classify_failure(&message) {
            FailureClass::Network => ProvisionError::NetworkUnreachable {
                package: "python".to_string(),
                message,
            },
            FailureClass::DiskSpace => ProvisionError::DiskSpaceExhausted { message },
            FailureClass::Other => ProvisionError::InterpreterUnavailable {
                version: self.descriptor.python_version.clone(),
                message,
            },
        })
    }

    fn install_package(&self, conda: &Path, package: &PackageSpec) -> Result<(), ProvisionError> {
        let spec = package.pip_spec();
        info!(environment = %self.descriptor.name, package = %spec, "installing package");

        let output = Command::new(conda)
            .args(["run", "-n", &self.descriptor.name, "pip", "install", &spec])
            .output()
            .map_err(|_| ProvisionError::ManagerUnavailable)?;

        if output.status.success() {
            return Ok(());
        }

        let message = failure_summary(&output);
        Err(match classify_failure(&message) {
            FailureClass::Network => ProvisionError::NetworkUnreachable {
                package: package.name.clone(),
                message,
            },
            FailureClass::DiskSpace => ProvisionError::DiskSpaceExhausted { message },
            FailureClass::Other => ProvisionError::DependencyConflict {
                package: package.name.clone(),
                message,
            },
        })
    }
}

/// Accept Anaconda channel Terms of Service. Failures are tolerated:
/// older conda versions have no `tos` subcommand, and conda-forge does
/// not require acceptance.
fn accept_channel_terms(conda: &Path) {
    for channel in TOS_CHANNELS {
        let result = Command::new(conda)
            .args(["tos", "accept", "--override-channels", "--channel", channel])
            .output();
        match result {
            Ok(output) if output.status.success() => {
                debug!(%channel, "accepted channel terms of service");
            }
            Ok(_) | Err(_) => {
                warn!(%channel, "terms-of-service acceptance skipped");
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum FailureClass {
    Network,
    DiskSpace,
    Other,
}

/// Classify conda/pip diagnostics into the failure taxonomy.
fn classify_failure(message: &str) -> FailureClass {
    const NETWORK_MARKERS: [&str; 6] = [
        "CondaHTTPError",
        "ConnectionError",
        "Connection refused",
        "Temporary failure in name resolution",
        "Read timed out",
        "Network is unreachable",
    ];
    if NETWORK_MARKERS.iter().any(|marker| message.contains(marker)) {
        return FailureClass::Network;
    }
    if message.contains("No space left on device") || message.contains("Disk quota exceeded") {
        return FailureClass::DiskSpace;
    }
    FailureClass::Other
}
