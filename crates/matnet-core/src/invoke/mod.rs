//! Inference invocation inside the provisioned environment.
//!
//! The invoker never launches anything unless the last bootstrap
//! reported ready: running the model against an unverified environment
//! would produce confusing downstream failures instead of one
//! actionable gate error.

use std::path::Path;
use std::process::Command;

use image::DynamicImage;
use thiserror::Error;
use tracing::{debug, info};

use crate::bootstrap::BootstrapResult;
use crate::config::MatnetConfig;
use crate::probe::EnvironmentProbe;
use crate::subprocess::failure_summary;

/// Output files the inference script writes under `<output>/images/`,
/// in return order.
const OUTPUT_FILES: [&str; 5] = [
    "input-inputs.png",
    "input-outputs-0-.png",
    "input-outputs-1-.png",
    "input-outputs-2-.png",
    "input-outputs-3-.png",
];

/// The five decoded material maps produced by one inference run.
#[derive(Debug)]
pub struct MaterialMaps {
    /// Echo of the (rescaled) input image.
    pub input: DynamicImage,
    pub normals: DynamicImage,
    pub diffuse: DynamicImage,
    pub roughness: DynamicImage,
    pub specular: DynamicImage,
}

/// Errors from invoking inference.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InvokeError {
    /// The last bootstrap did not reach ready; nothing was launched.
    #[error("environment is not ready: {reason}")]
    NotReady {
        /// The bootstrap failure, or a note that bootstrap never ran.
        reason: String,
    },

    /// The inference process could not be started.
    #[error("failed to launch inference: {message}")]
    LaunchFailed {
        /// Underlying detail.
        message: String,
    },

    /// The inference process exited unsuccessfully.
    #[error("inference exited with code {code}: {diagnostics}")]
    NonZeroExit {
        /// Exit code, `-1` when terminated by signal.
        code: i32,
        /// Captured stderr/stdout tail.
        diagnostics: String,
    },

    /// The expected five output images were not produced or could not
    /// be decoded.
    #[error("inference outputs missing or unreadable: {}", missing.join(", "))]
    OutputParseFailed {
        /// Output files that were absent or failed to decode.
        missing: Vec<String>,
    },
}

/// Runs the inference entry point against a verified environment.
pub struct InferenceInvoker<'a> {
    config: &'a MatnetConfig,
    last_bootstrap: &'a BootstrapResult,
}

impl<'a> InferenceInvoker<'a> {
    pub fn new(config: &'a MatnetConfig, last_bootstrap: &'a BootstrapResult) -> Self {
        Self {
            config,
            last_bootstrap,
        }
    }

    /// Decompose `input` into its material maps.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::NotReady`] without launching anything when
    /// the last bootstrap failed; otherwise surfaces launch, exit, and
    /// output decoding failures with captured diagnostics.
    pub fn invoke(&self, input: &DynamicImage) -> Result<MaterialMaps, InvokeError> {
        if !self.last_bootstrap.ready {
            let reason = self
                .last_bootstrap
                .failure
                .as_ref()
                .map_or_else(
                    || "bootstrap has not completed".to_string(),
                    |failure| format!("{} failed: {}", failure.stage, failure.message),
                );
            return Err(InvokeError::NotReady { reason });
        }

        let probe = EnvironmentProbe::new(self.config.manager.clone());
        let conda = probe.locate().ok_or_else(|| InvokeError::LaunchFailed {
            message: "conda executable not found".to_string(),
        })?;

        let workspace = tempfile::tempdir().map_err(|error| InvokeError::LaunchFailed {
            message: format!("cannot create scratch directory: {error}"),
        })?;
        let input_path = workspace.path().join("input.png");
        input
            .save(&input_path)
            .map_err(|error| InvokeError::LaunchFailed {
                message: format!("cannot write input image: {error}"),
            })?;
        let output_dir = workspace.path().join("output");

        self.run_inference(&conda, &input_path, &output_dir)?;
        decode_outputs(&output_dir)
    }

    fn run_inference(
        &self,
        conda: &Path,
        input_path: &Path,
        output_dir: &Path,
    ) -> Result<(), InvokeError> {
        let inference = &self.config.inference;
        let mut command = Command::new(conda);
        command
            .args(["run", "-n", &self.config.environment.name, "python"])
            .arg(&inference.script)
            .args(["--mode", "eval"])
            .arg("--input_dir")
            .arg(input_path)
            .arg("--output_dir")
            .arg(output_dir)
            .arg("--checkpoint")
            .arg(&self.config.artifacts.checkpoint_dir)
            .args(["--imageFormat", "png"])
            .args(["--scale_size", &inference.scale_size.to_string()])
            .args(["--batch_size", &inference.batch_size.to_string()]);
        if inference.correct_gamma {
            command.arg("--correctGamma");
        }
        if let Some(parent) = inference.script.parent().filter(|p| !p.as_os_str().is_empty()) {
            command.current_dir(parent);
        }

        info!(script = %inference.script.display(), "running inference");
        let output = command.output().map_err(|error| InvokeError::LaunchFailed {
            message: format!("cannot launch conda run: {error}"),
        })?;

        if !output.status.success() {
            return Err(InvokeError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
                diagnostics: failure_summary(&output),
            });
        }
        debug!("inference process completed");
        Ok(())
    }
}

/// Decode the five output images, collecting every failure before
/// reporting so the error names the complete missing set.
fn decode_outputs(output_dir: &Path) -> Result<MaterialMaps, InvokeError> {
    let images_dir = output_dir.join("images");
    let mut decoded = Vec::with_capacity(OUTPUT_FILES.len());
    let mut missing = Vec::new();

    for name in OUTPUT_FILES {
        match image::open(images_dir.join(name)) {
            Ok(img) => decoded.push(img),
            Err(_) => missing.push(name.to_string()),
        }
    }

    let mut maps = decoded.into_iter();
    match (
        maps.next(),
        maps.next(),
        maps.next(),
        maps.next(),
        maps.next(),
    ) {
        (Some(input), Some(normals), Some(diffuse), Some(roughness), Some(specular))
            if missing.is_empty() =>
        {
            Ok(MaterialMaps {
                input,
                normals,
                diffuse,
                roughness,
                specular,
            })
        }
        _ => Err(InvokeError::OutputParseFailed { missing }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::{BootstrapFailure, FailureKind, Stage};

    fn failed_bootstrap() -> BootstrapResult {
        BootstrapResult {
            ready: false,
            completed: vec![Stage::ManagerCheck],
            failure: Some(BootstrapFailure {
                stage: Stage::ManagerInstall,
                kind: FailureKind::NetworkUnreachable,
                message: "installer download failed".to_string(),
            }),
        }
    }

    #[test]
    fn invoke_is_gated_on_ready_bootstrap() {
        let mut config = MatnetConfig::default();
        // if gating were broken, this nonexistent conda would surface a
        // different error
        config.manager.conda_path = Some("/nonexistent/conda-xyz".into());
        let result = failed_bootstrap();
        let invoker = InferenceInvoker::new(&config, &result);
        let image = DynamicImage::new_rgb8(4, 4);

        let err = invoker.invoke(&image).unwrap_err();
        match err {
            InvokeError::NotReady { reason } => {
                assert!(reason.contains("manager-install"));
                assert!(reason.contains("installer download failed"));
            }
            other => panic!("expected NotReady, got {other:?}"),
        }
    }

    #[test]
    fn missing_outputs_are_all_reported() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        std::fs::create_dir_all(&images).unwrap();
        // only the input echo exists
        DynamicImage::new_rgb8(2, 2)
            .save(images.join("input-inputs.png"))
            .unwrap();

        let err = decode_outputs(dir.path()).unwrap_err();
        match err {
            InvokeError::OutputParseFailed { missing } => {
                assert_eq!(missing.len(), 4);
                assert!(missing.contains(&"input-outputs-0-.png".to_string()));
            }
            other => panic!("expected OutputParseFailed, got {other:?}"),
        }
    }

    #[test]
    fn complete_outputs_decode_to_five_maps() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        std::fs::create_dir_all(&images).unwrap();
        for name in OUTPUT_FILES {
            DynamicImage::new_rgb8(2, 2).save(images.join(name)).unwrap();
        }

        let maps = decode_outputs(dir.path()).unwrap();
        assert_eq!(maps.input.width(), 2);
        assert_eq!(maps.specular.height(), 2);
    }
}
