//! Configuration for the bootstrap pipeline.
//!
//! All tunables live in a single TOML document: the conda environment
//! descriptor (name, interpreter pin, package set), the checkpoint
//! manifest and hub coordinates, and the inference entry point. Defaults
//! reproduce the stock deepMaterials setup so a missing config file is
//! not an error.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level matnet configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MatnetConfig {
    /// Environment manager (conda) settings.
    #[serde(default)]
    pub manager: ManagerConfig,

    /// The isolated environment to provision.
    #[serde(default)]
    pub environment: EnvironmentDescriptor,

    /// Checkpoint artifact settings.
    #[serde(default)]
    pub artifacts: ArtifactConfig,

    /// Inference entry point settings.
    #[serde(default)]
    pub inference: InferenceConfig,
}

impl MatnetConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// parsed document fails validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid, or if the environment
    /// name, repository id, or required file set is empty.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.environment.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "environment.name must not be empty".to_string(),
            ));
        }
        if self.environment.python_version.trim().is_empty() {
            return Err(ConfigError::Validation(
                "environment.python_version must not be empty".to_string(),
            ));
        }
        if self.artifacts.repo_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "artifacts.repo_id must not be empty".to_string(),
            ));
        }
        if self.artifacts.required_files.is_empty() {
            return Err(ConfigError::Validation(
                "artifacts.required_files must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Environment manager (conda) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Explicit path to the conda executable. When unset, conda is
    /// discovered on `PATH` and in the well-known install prefixes.
    #[serde(default)]
    pub conda_path: Option<PathBuf>,

    /// Base URL for Miniconda installer artifacts.
    #[serde(default = "default_installer_base_url")]
    pub installer_base_url: String,

    /// Prefix to install Miniconda into when it is absent. Defaults to
    /// `~/miniconda3`.
    #[serde(default)]
    pub install_prefix: Option<PathBuf>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            conda_path: None,
            installer_base_url: default_installer_base_url(),
            install_prefix: None,
        }
    }
}

fn default_installer_base_url() -> String {
    "https://repo.anaconda.com/miniconda".to_string()
}

/// Immutable description of the isolated environment: its name, the
/// pinned interpreter, and the ordered dependency set. The declared
/// package order is the install order, so version conflicts fail
/// deterministically at the same package every time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentDescriptor {
    /// Name of the conda environment.
    #[serde(default = "default_env_name")]
    pub name: String,

    /// Pinned Python version passed to `conda create`.
    #[serde(default = "default_python_version")]
    pub python_version: String,

    /// Ordered package set installed into the environment.
    #[serde(default = "default_packages")]
    pub packages: Vec<PackageSpec>,
}

impl Default for EnvironmentDescriptor {
    fn default() -> Self {
        Self {
            name: default_env_name(),
            python_version: default_python_version(),
            packages: default_packages(),
        }
    }
}

fn default_env_name() -> String {
    "svbrdf".to_string()
}

fn default_python_version() -> String {
    "3.8".to_string()
}

/// One required package: its pip name, an optional version constraint,
/// and the module name used for the import check when it differs from
/// the pip name (e.g. `opencv-python` imports as `cv2`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSpec {
    /// Package name as given to `pip install`.
    pub name: String,

    /// Exact version constraint, e.g. `==2.12.0`.
    #[serde(default)]
    pub constraint: Option<String>,

    /// Module name for the import check; defaults to `name`.
    #[serde(default)]
    pub import_name: Option<String>,
}

impl PackageSpec {
    /// A package installed at whatever version pip resolves.
    pub fn unpinned(name: &str) -> Self {
        Self {
            name: name.to_string(),
            constraint: None,
            import_name: None,
        }
    }

    /// The argument passed to `pip install`.
    pub fn pip_spec(&self) -> String {
        match &self.constraint {
            Some(constraint) => format!("{}{constraint}", self.name),
            None => self.name.clone(),
        }
    }

    /// The module name probed with `python -c "import <module>"`.
    pub fn import_name(&self) -> &str {
        self.import_name.as_deref().unwrap_or(&self.name)
    }
}

fn default_packages() -> Vec<PackageSpec> {
    vec![
        PackageSpec::unpinned("numpy"),
        PackageSpec::unpinned("imageio"),
        PackageSpec {
            name: "opencv-python".to_string(),
            constraint: None,
            import_name: Some("cv2".to_string()),
        },
        PackageSpec {
            name: "pillow".to_string(),
            constraint: None,
            import_name: Some("PIL".to_string()),
        },
        PackageSpec::unpinned("matplotlib"),
        PackageSpec::unpinned("tqdm"),
        PackageSpec::unpinned("lxml"),
        PackageSpec::unpinned("scipy"),
        PackageSpec::unpinned("huggingface_hub"),
        PackageSpec {
            name: "tensorflow".to_string(),
            constraint: Some("==2.12.0".to_string()),
            import_name: None,
        },
    ]
}

/// Checkpoint artifact settings: where checkpoints live locally and
/// which remote repository they are fetched from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Hub repository id holding the pretrained model.
    #[serde(default = "default_repo_id")]
    pub repo_id: String,

    /// Hub endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Local checkpoint directory.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,

    /// Files that must exist (non-empty) under `checkpoint_dir`.
    #[serde(default = "default_required_files")]
    pub required_files: Vec<String>,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            repo_id: default_repo_id(),
            endpoint: default_endpoint(),
            checkpoint_dir: default_checkpoint_dir(),
            required_files: default_required_files(),
        }
    }
}

fn default_repo_id() -> String {
    "aruntd008/svbrdf-model".to_string()
}

fn default_endpoint() -> String {
    "https://huggingface.co".to_string()
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("pretrained_checkpoints")
}

fn default_required_files() -> Vec<String> {
    [
        "checkpoint",
        "model-deepMaterials.data-00000-of-00001",
        "model-deepMaterials.index",
        "model-deepMaterials.meta",
        "options.json",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

/// Inference entry point settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Path to the inference script run inside the environment.
    #[serde(default = "default_script")]
    pub script: PathBuf,

    /// Value passed as `--scale_size`.
    #[serde(default = "default_scale_size")]
    pub scale_size: u32,

    /// Value passed as `--batch_size`.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Whether `--correctGamma` is passed.
    #[serde(default = "default_true")]
    pub correct_gamma: bool,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            script: default_script(),
            scale_size: default_scale_size(),
            batch_size: default_batch_size(),
            correct_gamma: default_true(),
        }
    }
}

fn default_script() -> PathBuf {
    PathBuf::from("material_net.py")
}

fn default_scale_size() -> u32 {
    256
}

fn default_batch_size() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The parsed document is not usable.
    #[error("invalid config: {0}")]
    Validation(String),
}
