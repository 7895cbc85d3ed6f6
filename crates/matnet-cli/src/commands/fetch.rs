//! `matnet fetch` - standalone checkpoint fetcher.

use matnet_core::artifacts::{ArtifactFetcher, ArtifactManifest, HubClient};
use matnet_core::MatnetConfig;

use crate::exit_codes::codes;

pub fn run(config: &MatnetConfig) -> u8 {
    let source = match HubClient::new(config.artifacts.endpoint.clone()) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("ERROR: {error}");
            return codes::GENERIC_ERROR;
        }
    };

    let manifest = ArtifactManifest::new(config.artifacts.required_files.clone());
    let dir = &config.artifacts.checkpoint_dir;
    println!(
        "Ensuring checkpoints from {} in {}...",
        config.artifacts.repo_id,
        dir.display()
    );

    let fetcher = ArtifactFetcher::new(&source, &config.artifacts.repo_id);
    match fetcher.ensure(&manifest, dir) {
        Ok(()) => {
            println!("Checkpoints complete.");
            codes::SUCCESS
        }
        Err(error) => {
            eprintln!("ERROR: {error}");
            codes::GENERIC_ERROR
        }
    }
}
