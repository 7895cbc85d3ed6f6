//! Read-only probes for the environment manager and the named
//! environment.
//!
//! Probes never mutate anything and never fail: inability to invoke
//! conda is itself a state (`Absent`), not an error. The filesystem and
//! the manager are the source of truth on every call; nothing is cached
//! across invocations.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::debug;

use crate::config::{EnvironmentDescriptor, ManagerConfig};

/// Observed state of the environment manager (conda).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// No conda executable could be located.
    Absent,
    /// An executable was found but its version command failed.
    PresentUnverified,
    /// `conda --version` succeeded.
    PresentValid,
}

/// Observed state of the named environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentState {
    /// The named environment does not exist.
    Absent,
    /// The environment exists but the interpreter pin or at least one
    /// dependency import check failed.
    PartiallyCreated,
    /// Interpreter pin matches and every dependency is importable.
    Ready,
}

/// Locates conda and answers state queries about it.
pub struct EnvironmentProbe {
    manager: ManagerConfig,
}

impl EnvironmentProbe {
    pub fn new(manager: ManagerConfig) -> Self {
        Self { manager }
    }

    /// Resolve the conda executable: explicit override first, then
    /// `PATH`, then the well-known install prefixes.
    pub fn locate(&self) -> Option<PathBuf> {
        if let Some(path) = &self.manager.conda_path {
            if path.is_file() {
                return Some(path.clone());
            }
            debug!(path = %path.display(), "configured conda_path does not exist");
            return None;
        }

        if let Some(found) = find_in_path() {
            return Some(found);
        }

        well_known_locations()
            .into_iter()
            .find(|candidate| candidate.is_file())
    }

    /// Probe the manager: locate the executable and run its version
    /// command.
    pub fn manager_state(&self) -> ManagerState {
        let Some(conda) = self.locate() else {
            return ManagerState::Absent;
        };

        match Command::new(&conda).arg("--version").output() {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
                debug!(conda = %conda.display(), %version, "conda responded");
                ManagerState::PresentValid
            }
            Ok(_) => ManagerState::PresentUnverified,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => ManagerState::Absent,
            Err(error) => {
                debug!(conda = %conda.display(), %error, "conda version command failed");
                ManagerState::PresentUnverified
            }
        }
    }

    /// Probe the named environment: existence, interpreter pin, and one
    /// import check per required package.
    pub fn environment_state(&self, descriptor: &EnvironmentDescriptor) -> EnvironmentState {
        let Some(conda) = self.locate() else {
            return EnvironmentState::Absent;
        };

        let Some(listing) = conda_output(&conda, &["env", "list"]) else {
            return EnvironmentState::Absent;
        };
        if !environment_listed(&listing, &descriptor.name) {
            return EnvironmentState::Absent;
        }

        let version_args = [
            "run",
            "-n",
            descriptor.name.as_str(),
            "python",
            "--version",
        ];
        match conda_output(&conda, &version_args) {
            Some(reported)
                if python_version_matches(&reported, &descriptor.python_version) => {}
            _ => {
                debug!(
                    environment = %descriptor.name,
                    pin = %descriptor.python_version,
                    "interpreter pin check failed"
                );
                return EnvironmentState::PartiallyCreated;
            }
        }

        match self.first_unimportable(&conda, descriptor) {
            Some(package) => {
                debug!(environment = %descriptor.name, %package, "import check failed");
                EnvironmentState::PartiallyCreated
            }
            None => EnvironmentState::Ready,
        }
    }

    /// The first package (in declared order) whose import check fails,
    /// if any.
    pub(crate) fn first_unimportable(
        &self,
        conda: &Path,
        descriptor: &EnvironmentDescriptor,
    ) -> Option<String> {
        for package in &descriptor.packages {
            let statement = format!("import {}", package.import_name());
            let args = [
                "run",
                "-n",
                descriptor.name.as_str(),
                "python",
                "-c",
                statement.as_str(),
            ];
            if conda_output(conda, &args).is_none() {
                return Some(package.name.clone());
            }
        }
        None
    }
}

/// Run conda with `args` and return combined stdout + stderr on success,
/// `None` on spawn failure or non-zero exit.
fn conda_output(conda: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new(conda).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(combined_output(&output))
}

/// Python historically printed its version to stderr, so both streams
/// are considered.
fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

/// Whether `conda env list` output names the environment. The listing
/// has one environment per line, name first, `#` comment lines
/// interspersed.
fn environment_listed(listing: &str, name: &str) -> bool {
    listing
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .filter_map(|line| line.split_whitespace().next())
        .any(|first| first == name)
}

/// Whether a `python --version` response satisfies the pin. The pin is
/// a prefix at version-component granularity: pin `3.8` accepts
/// `3.8.16` but not `3.81.0`.
fn python_version_matches(reported: &str, pin: &str) -> bool {
    let Some(version) = reported
        .split_whitespace()
        .find(|token| token.chars().next().is_some_and(|c| c.is_ascii_digit()))
    else {
        return false;
    };
    version == pin || version.starts_with(&format!("{pin}."))
}

fn find_in_path() -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        for name in executable_names() {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(windows)]
fn executable_names() -> &'static [&'static str] {
    &["conda.exe", "conda.bat"]
}

#[cfg(not(windows))]
fn executable_names() -> &'static [&'static str] {
    &["conda"]
}

/// Well-known conda install locations checked after `PATH`.
fn well_known_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from("/opt/conda/bin/conda")];
    if let Some(home) = home_dir() {
        #[cfg(windows)]
        {
            locations.insert(0, home.join("miniconda3").join("Scripts").join("conda.exe"));
            locations.insert(1, home.join("anaconda3").join("Scripts").join("conda.exe"));
        }
        #[cfg(not(windows))]
        {
            locations.insert(0, home.join("miniconda3/bin/conda"));
            locations.insert(1, home.join("anaconda3/bin/conda"));
        }
    }
    locations.push(PathBuf::from("/usr/local/miniconda3/bin/conda"));
    locations.push(PathBuf::from("/usr/local/anaconda3/bin/conda"));
    locations
}

pub(crate) fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}
