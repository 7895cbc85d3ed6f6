//! Host-facing adapter: one image in, five material maps out.
//!
//! Hosts embed this type and call [`MaterialNode::run`]; everything
//! else (manager install, environment provisioning, checkpoint
//! fetching, gating) happens behind it. The node holds no host
//! lifecycle state and caches nothing across calls: every run
//! re-probes, which is cheap once the environment is provisioned.

use image::DynamicImage;

use crate::artifacts::{HubClient, SnapshotSource};
use crate::bootstrap::{BootstrapOrchestrator, BootstrapResult};
use crate::config::MatnetConfig;
use crate::invoke::{InferenceInvoker, InvokeError, MaterialMaps};

/// The material-capture node.
pub struct MaterialNode<S: SnapshotSource = HubClient> {
    config: MatnetConfig,
    source: S,
    last_bootstrap: Option<BootstrapResult>,
}

impl MaterialNode<HubClient> {
    /// Create a node fetching checkpoints from the configured hub.
    ///
    /// # Errors
    ///
    /// Returns [`crate::artifacts::FetchError`] when the HTTP client
    /// cannot be initialized.
    pub fn new(config: MatnetConfig) -> Result<Self, crate::artifacts::FetchError> {
        let source = HubClient::new(config.artifacts.endpoint.clone())?;
        Ok(Self::with_source(config, source))
    }
}

impl<S: SnapshotSource> MaterialNode<S> {
    /// Create a node with an explicit snapshot source.
    pub fn with_source(config: MatnetConfig, source: S) -> Self {
        Self {
            config,
            source,
            last_bootstrap: None,
        }
    }

    /// Bootstrap (lazily, idempotently) and run inference.
    ///
    /// The first call does whatever setup is still needed; later calls
    /// re-run only the cheap probes. A failed bootstrap gates the run:
    /// inference is never launched against an unverified environment.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::NotReady`] carrying the bootstrap failure
    /// when setup did not complete, or the invocation error otherwise.
    pub fn run(&mut self, input: &DynamicImage) -> Result<MaterialMaps, InvokeError> {
        let result = BootstrapOrchestrator::new(&self.config, &self.source).bootstrap();
        let outcome = InferenceInvoker::new(&self.config, &result).invoke(input);
        self.last_bootstrap = Some(result);
        outcome
    }

    /// The most recent bootstrap outcome, for diagnostics.
    pub fn last_bootstrap(&self) -> Option<&BootstrapResult> {
        self.last_bootstrap.as_ref()
    }

    pub fn config(&self) -> &MatnetConfig {
        &self.config
    }
}
