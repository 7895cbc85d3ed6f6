//! `matnet status` - read-only state report.

use matnet_core::artifacts::ArtifactManifest;
use matnet_core::probe::EnvironmentProbe;
use matnet_core::MatnetConfig;

use crate::exit_codes::codes;

pub fn run(config: &MatnetConfig) -> u8 {
    let probe = EnvironmentProbe::new(config.manager.clone());

    match probe.locate() {
        Some(conda) => println!("Conda:        {}", conda.display()),
        None => println!("Conda:        not found"),
    }
    println!("Manager:      {:?}", probe.manager_state());
    println!(
        "Environment:  {} ({:?})",
        config.environment.name,
        probe.environment_state(&config.environment)
    );

    let manifest = ArtifactManifest::new(config.artifacts.required_files.clone());
    let missing = manifest.missing(&config.artifacts.checkpoint_dir);
    if missing.is_empty() {
        println!(
            "Checkpoints:  complete ({})",
            config.artifacts.checkpoint_dir.display()
        );
    } else {
        println!("Checkpoints:  missing {}", missing.join(", "));
    }
    codes::SUCCESS
}
