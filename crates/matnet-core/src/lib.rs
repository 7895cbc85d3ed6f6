//! matnet-core - environment bootstrap and inference runner for
//! single-image SVBRDF material capture.
//!
//! The deepMaterials model runs inside an isolated conda environment
//! with a pinned interpreter and dependency set, against pretrained
//! checkpoints fetched from a model hub. This crate owns the state
//! machine that makes that true: probing, installing the manager,
//! provisioning the environment, fetching checkpoints, and gating
//! inference behind a fully verified setup.
//!
//! Entry points:
//!
//! - [`node::MaterialNode`] for hosts: `run(image)` returns the five
//!   material maps, bootstrapping lazily on first use.
//! - [`bootstrap::BootstrapOrchestrator`] for explicit, re-callable
//!   setup with per-stage reporting.
//! - [`artifacts`] and [`probe`] for the read-only diagnostics the CLI
//!   builds on.

pub mod artifacts;
pub mod bootstrap;
pub mod config;
pub mod installer;
pub mod invoke;
pub mod node;
pub mod probe;
pub mod provision;

mod subprocess;

pub use bootstrap::{BootstrapOrchestrator, BootstrapResult, FailureKind, Stage};
pub use config::MatnetConfig;
pub use invoke::{InferenceInvoker, MaterialMaps};
pub use node::MaterialNode;
