//! matnet - SVBRDF capture environment bootstrapper and runner
//!
//! CLI for provisioning the deepMaterials runtime (conda environment
//! plus pretrained checkpoints) and running inference against it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use matnet_core::MatnetConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;

use exit_codes::codes;

/// matnet - SVBRDF capture environment bootstrapper and runner
#[derive(Parser, Debug)]
#[command(name = "matnet")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the matnet configuration file
    #[arg(short, long, default_value = "matnet.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full bootstrap: manager, environment, checkpoints
    Bootstrap {
        /// Emit the bootstrap result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report manager, environment, and checkpoint state (read-only)
    Status,

    /// Check checkpoint files and diagnose layout problems
    Check,

    /// Fetch model checkpoints without the host plugin
    Fetch,

    /// Repair backslash-named and nested checkpoint layouts
    #[command(name = "fix-layout")]
    FixLayout,

    /// Bootstrap, then run inference on an image file
    Invoke {
        /// Input image path
        image: PathBuf,

        /// Directory the five material maps are written to
        #[arg(short, long, default_value = "material_maps")]
        out: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("ERROR: {error:#}");
            std::process::exit(i32::from(codes::GENERIC_ERROR));
        }
    };

    let code = match cli.command {
        Commands::Bootstrap { json } => commands::bootstrap::run(&config, json),
        Commands::Status => commands::status::run(&config),
        Commands::Check => commands::check::run(&config),
        Commands::Fetch => commands::fetch::run(&config),
        Commands::FixLayout => commands::fix_layout::run(&config),
        Commands::Invoke { image, out } => commands::invoke::run(&config, &image, &out),
    };
    std::process::exit(i32::from(code));
}

/// Load the config file when it exists; a missing file at the default
/// location means stock settings, not an error.
fn load_config(path: &PathBuf) -> Result<MatnetConfig> {
    if path.exists() {
        return MatnetConfig::from_file(path)
            .with_context(|| format!("cannot load {}", path.display()));
    }
    if path == &PathBuf::from("matnet.toml") {
        tracing::debug!("no config file found, using defaults");
        return Ok(MatnetConfig::default());
    }
    anyhow::bail!("config file not found: {}", path.display());
}
