//! `matnet fix-layout` - repair broken checkpoint layouts in place.

use matnet_core::artifacts::{repair_layout, ArtifactManifest};
use matnet_core::MatnetConfig;

use crate::exit_codes::codes;

pub fn run(config: &MatnetConfig) -> u8 {
    let dir = &config.artifacts.checkpoint_dir;
    if !dir.exists() {
        eprintln!("ERROR: checkpoint directory does not exist: {}", dir.display());
        return codes::GENERIC_ERROR;
    }

    let manifest = ArtifactManifest::new(config.artifacts.required_files.clone());
    match repair_layout(&manifest, dir) {
        Ok(repair) => {
            println!(
                "Extracted {} backslash-named file(s), hoisted {} nested entr(ies).",
                repair.extracted, repair.hoisted
            );
            if manifest.is_complete(dir) {
                println!("All required files are now in place.");
                codes::SUCCESS
            } else {
                println!(
                    "Still missing: {}. Run `matnet fetch` to re-download.",
                    manifest.missing(dir).join(", ")
                );
                codes::GENERIC_ERROR
            }
        }
        Err(error) => {
            eprintln!("ERROR: layout repair failed: {error}");
            codes::GENERIC_ERROR
        }
    }
}
