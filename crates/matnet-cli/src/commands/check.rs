//! `matnet check` - checkpoint diagnostic.
//!
//! Lists what is actually in the checkpoint directory, reports each
//! required file, and recognizes the two known broken layouts so the
//! operator is pointed at `fix-layout` instead of a pointless
//! re-download.

use std::path::Path;

use matnet_core::artifacts::ArtifactManifest;
use matnet_core::MatnetConfig;

use crate::exit_codes::codes;

pub fn run(config: &MatnetConfig) -> u8 {
    let dir = &config.artifacts.checkpoint_dir;
    println!("Checkpoint directory: {}", dir.display());

    if !dir.exists() {
        println!("Status: NOT FOUND - checkpoint directory does not exist");
        println!("Run `matnet fetch` to download the model checkpoints.");
        return codes::GENERIC_ERROR;
    }

    list_contents(dir);

    let manifest = ArtifactManifest::new(config.artifacts.required_files.clone());
    println!("\nRequired files:");
    let checks = manifest.validate(dir);
    let mut missing = 0;
    for check in &checks {
        if check.valid {
            println!("  FOUND:   {} ({} bytes)", check.name, check.size);
        } else {
            println!("  MISSING: {}", check.name);
            missing += 1;
        }
    }

    if missing == 0 {
        println!("\nStatus: COMPLETE - all required files present");
        return codes::SUCCESS;
    }

    println!("\nStatus: INCOMPLETE - {missing} file(s) missing");
    if has_layout_problem(dir) {
        println!("Detected a broken download layout. Run `matnet fix-layout` first.");
    } else {
        println!("Run `matnet fetch` to download the model checkpoints.");
    }
    codes::GENERIC_ERROR
}

fn list_contents(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    println!("\nContents:");
    let mut empty = true;
    for entry in entries.flatten() {
        empty = false;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        match entry.metadata() {
            Ok(meta) if meta.is_file() => println!("  {} ({} bytes)", name, meta.len()),
            _ => println!("  {name}/"),
        }
    }
    if empty {
        println!("  (empty directory)");
    }
}

/// Whether the directory shows one of the two repairable layouts:
/// backslash-separated file names, or a nested directory carrying the
/// checkpoint directory's own name.
fn has_layout_problem(dir: &Path) -> bool {
    let nested_name = dir.file_name().map(std::ffi::OsStr::to_os_string);
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        if name.to_string_lossy().contains('\\') {
            return true;
        }
        if Some(&name) == nested_name.as_ref() && entry.path().is_dir() {
            return true;
        }
    }
    false
}
