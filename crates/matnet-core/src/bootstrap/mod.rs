//! The bootstrap state machine.
//!
//! A linear sequence of probe/repair stages with short-circuit on
//! failure:
//!
//! ```text
//! MANAGER_CHECK -> (MANAGER_INSTALL)? -> ENV_CHECK -> (ENV_PROVISION)?
//!   -> ARTIFACT_CHECK -> (ARTIFACT_FETCH)? -> READY
//! ```
//!
//! Every stage is idempotent: re-running a stage whose postcondition
//! already holds is a no-op success. All mutation happens in the
//! external environment and filesystem, never in this process, so
//! `bootstrap()` is safely re-callable; an interrupted run leaves state
//! the next run's probes classify correctly. Two processes
//! bootstrapping concurrently may race on installation; this is a known
//! gap, not guarded by locking.

use serde::Serialize;
use tracing::info;

use crate::artifacts::{ArtifactFetcher, ArtifactManifest, FetchError, SnapshotSource};
use crate::config::MatnetConfig;
use crate::installer::{InstallError, ManagerInstaller};
use crate::probe::{EnvironmentProbe, EnvironmentState, ManagerState};
use crate::provision::{EnvironmentProvisioner, ProvisionError};

/// One unit of the bootstrap sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    ManagerCheck,
    ManagerInstall,
    EnvCheck,
    EnvProvision,
    ArtifactCheck,
    ArtifactFetch,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManagerCheck => "manager-check",
            Self::ManagerInstall => "manager-install",
            Self::EnvCheck => "env-check",
            Self::EnvProvision => "env-provision",
            Self::ArtifactCheck => "artifact-check",
            Self::ArtifactFetch => "artifact-fetch",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure taxonomy shared across stages. Each kind maps onto one
/// documented manual remedy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    UnsupportedPlatform,
    NetworkUnreachable,
    DiskSpaceExhausted,
    PermissionDenied,
    VerificationFailed,
    DependencyConflict,
    RemoteNotFound,
    IncompleteDownload,
    NotReady,
    ProcessLaunchFailed,
    NonZeroExit,
    OutputParseFailed,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnsupportedPlatform => "unsupported-platform",
            Self::NetworkUnreachable => "network-unreachable",
            Self::DiskSpaceExhausted => "disk-space-exhausted",
            Self::PermissionDenied => "permission-denied",
            Self::VerificationFailed => "verification-failed",
            Self::DependencyConflict => "dependency-conflict",
            Self::RemoteNotFound => "remote-not-found",
            Self::IncompleteDownload => "incomplete-download",
            Self::NotReady => "not-ready",
            Self::ProcessLaunchFailed => "process-launch-failed",
            Self::NonZeroExit => "non-zero-exit",
            Self::OutputParseFailed => "output-parse-failed",
        }
    }

    /// The manual fallback an operator should reach for.
    pub fn remedy(self) -> &'static str {
        match self {
            Self::UnsupportedPlatform => {
                "install Miniconda manually from https://docs.conda.io/en/latest/miniconda.html"
            }
            Self::NetworkUnreachable => "check connectivity and proxy settings, then re-run bootstrap",
            Self::DiskSpaceExhausted => "free disk space, then re-run bootstrap",
            Self::PermissionDenied => "re-run with sufficient privileges or choose a writable install prefix",
            Self::VerificationFailed => {
                "install Miniconda manually, then re-run bootstrap to verify"
            }
            Self::DependencyConflict => {
                "create the environment manually (conda create) and install the pinned packages with pip"
            }
            Self::RemoteNotFound => "verify artifacts.repo_id points at an existing model repository",
            Self::IncompleteDownload => "re-run the fetch, or download the repository files manually",
            Self::NotReady => "run bootstrap and resolve the reported stage failure first",
            Self::ProcessLaunchFailed => "verify the conda environment and inference script path",
            Self::NonZeroExit => "inspect the captured inference diagnostics",
            Self::OutputParseFailed => "inspect the inference output directory and diagnostics",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stage failure: which stage, which kind, and the underlying detail.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapFailure {
    pub stage: Stage,
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome of one bootstrap attempt. Produced fresh on every call;
/// never persisted, the installed manager, created environment, and
/// downloaded files are what make later attempts fast.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapResult {
    /// Whether every stage reached its terminal success state.
    pub ready: bool,
    /// Stages completed, in order.
    pub completed: Vec<Stage>,
    /// The failure that terminated the run, when not ready.
    pub failure: Option<BootstrapFailure>,
}

impl BootstrapResult {
    fn ready(completed: Vec<Stage>) -> Self {
        Self {
            ready: true,
            completed,
            failure: None,
        }
    }

    fn failed(completed: Vec<Stage>, stage: Stage, kind: FailureKind, message: String) -> Self {
        Self {
            ready: false,
            completed,
            failure: Some(BootstrapFailure {
                stage,
                kind,
                message,
            }),
        }
    }
}

/// Sequences probe, install, provision, and fetch into one idempotent
/// setup procedure.
pub struct BootstrapOrchestrator<'a, S: SnapshotSource> {
    config: &'a MatnetConfig,
    probe: EnvironmentProbe,
    source: &'a S,
}

impl<'a, S: SnapshotSource> BootstrapOrchestrator<'a, S> {
    pub fn new(config: &'a MatnetConfig, source: &'a S) -> Self {
        Self {
            config,
            probe: EnvironmentProbe::new(config.manager.clone()),
            source,
        }
    }

    /// Run the state machine to completion or first failure.
    ///
    /// Safe to call repeatedly: stages whose postconditions already
    /// hold are skipped after a cheap probe, and no probe mutates
    /// anything. Nothing is cached across calls; the filesystem and the
    /// manager are re-examined every time.
    pub fn bootstrap(&self) -> BootstrapResult {
        let mut completed = Vec::new();

        info!(stage = %Stage::ManagerCheck, "probing for conda");
        let manager = self.probe.manager_state();
        completed.push(Stage::ManagerCheck);

        if manager != ManagerState::PresentValid {
            info!(stage = %Stage::ManagerInstall, ?manager, "conda not usable, installing Miniconda");
            let installer = ManagerInstaller::new(&self.config.manager, &self.probe);
            if let Err(error) = installer.install() {
                return BootstrapResult::failed(
                    completed,
                    Stage::ManagerInstall,
                    install_failure_kind(&error),
                    error.to_string(),
                );
            }
            completed.push(Stage::ManagerInstall);
        }

        info!(stage = %Stage::EnvCheck, environment = %self.config.environment.name, "probing environment");
        let environment = self.probe.environment_state(&self.config.environment);
        completed.push(Stage::EnvCheck);

        if environment != EnvironmentState::Ready {
            info!(stage = %Stage::EnvProvision, ?environment, "environment not ready, provisioning");
            let provisioner = EnvironmentProvisioner::new(&self.config.environment, &self.probe);
            if let Err(error) = provisioner.provision() {
                return BootstrapResult::failed(
                    completed,
                    Stage::EnvProvision,
                    provision_failure_kind(&error),
                    error.to_string(),
                );
            }
            completed.push(Stage::EnvProvision);
        }

        info!(stage = %Stage::ArtifactCheck, "validating checkpoint files");
        let manifest = ArtifactManifest::new(self.config.artifacts.required_files.clone());
        let checkpoint_dir = &self.config.artifacts.checkpoint_dir;
        let complete = manifest.is_complete(checkpoint_dir);
        completed.push(Stage::ArtifactCheck);

        if !complete {
            info!(stage = %Stage::ArtifactFetch, "checkpoints missing or invalid, fetching");
            let fetcher = ArtifactFetcher::new(self.source, &self.config.artifacts.repo_id);
            if let Err(error) = fetcher.ensure(&manifest, checkpoint_dir) {
                return BootstrapResult::failed(
                    completed,
                    Stage::ArtifactFetch,
                    fetch_failure_kind(&error),
                    error.to_string(),
                );
            }
            completed.push(Stage::ArtifactFetch);
        }

        info!("bootstrap complete, environment ready");
        BootstrapResult::ready(completed)
    }
}

fn install_failure_kind(error: &InstallError) -> FailureKind {
    match error {
        InstallError::UnsupportedPlatform { .. } => FailureKind::UnsupportedPlatform,
        InstallError::NetworkUnreachable { .. } => FailureKind::NetworkUnreachable,
        InstallError::DiskSpaceExhausted { .. } => FailureKind::DiskSpaceExhausted,
        InstallError::PermissionDenied { .. } => FailureKind::PermissionDenied,
        InstallError::VerificationFailed { .. } => FailureKind::VerificationFailed,
    }
}

fn provision_failure_kind(error: &ProvisionError) -> FailureKind {
    match error {
        // same operator action as a conflict: adjust pins or channels
        ProvisionError::InterpreterUnavailable { .. }
        | ProvisionError::DependencyConflict { .. } => FailureKind::DependencyConflict,
        ProvisionError::NetworkUnreachable { .. } => FailureKind::NetworkUnreachable,
        ProvisionError::DiskSpaceExhausted { .. } => FailureKind::DiskSpaceExhausted,
        ProvisionError::ManagerUnavailable
        | ProvisionError::DependencyVerificationFailed { .. } => FailureKind::VerificationFailed,
    }
}

fn fetch_failure_kind(error: &FetchError) -> FailureKind {
    match error {
        FetchError::NetworkUnreachable { .. } => FailureKind::NetworkUnreachable,
        FetchError::DiskSpaceExhausted { .. } => FailureKind::DiskSpaceExhausted,
        FetchError::RemoteNotFound { .. } => FailureKind::RemoteNotFound,
        FetchError::IncompleteDownload { .. } => FailureKind::IncompleteDownload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_and_kind_names_are_kebab_case() {
        assert_eq!(Stage::ManagerInstall.to_string(), "manager-install");
        assert_eq!(Stage::ArtifactFetch.as_str(), "artifact-fetch");
        assert_eq!(FailureKind::NotReady.to_string(), "not-ready");
        assert_eq!(
            FailureKind::UnsupportedPlatform.as_str(),
            "unsupported-platform"
        );
    }

    #[test]
    fn every_kind_has_a_remedy() {
        let kinds = [
            FailureKind::UnsupportedPlatform,
            FailureKind::NetworkUnreachable,
            FailureKind::DiskSpaceExhausted,
            FailureKind::PermissionDenied,
            FailureKind::VerificationFailed,
            FailureKind::DependencyConflict,
            FailureKind::RemoteNotFound,
            FailureKind::IncompleteDownload,
            FailureKind::NotReady,
            FailureKind::ProcessLaunchFailed,
            FailureKind::NonZeroExit,
            FailureKind::OutputParseFailed,
        ];
        for kind in kinds {
            assert!(!kind.remedy().is_empty());
        }
    }

    #[test]
    fn error_kind_mapping_covers_all_stage_errors() {
        assert_eq!(
            install_failure_kind(&InstallError::UnsupportedPlatform {
                os: "macos".to_string()
            }),
            FailureKind::UnsupportedPlatform
        );
        assert_eq!(
            provision_failure_kind(&ProvisionError::DependencyVerificationFailed {
                package: "tensorflow".to_string()
            }),
            FailureKind::VerificationFailed
        );
        assert_eq!(
            fetch_failure_kind(&FetchError::IncompleteDownload {
                missing_files: vec!["checkpoint".to_string()]
            }),
            FailureKind::IncompleteDownload
        );
    }

    #[test]
    fn results_serialize_for_json_output() {
        let result = BootstrapResult::failed(
            vec![Stage::ManagerCheck],
            Stage::ManagerInstall,
            FailureKind::NetworkUnreachable,
            "installer download failed".to_string(),
        );
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"ready\":false"));
        assert!(json.contains("\"manager-check\""));
        assert!(json.contains("\"network-unreachable\""));
    }
}
