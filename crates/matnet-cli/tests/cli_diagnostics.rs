//! Subprocess tests for the diagnostic commands.
//!
//! Each test invokes the `matnet` binary with a hermetic config whose
//! conda override points at a nonexistent path and whose installer URL
//! points at a closed local port, so nothing ever leaves the temp
//! directory or touches the real network.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

fn matnet_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_matnet"))
}

const REQUIRED_FILES: [&str; 5] = [
    "checkpoint",
    "model-deepMaterials.data-00000-of-00001",
    "model-deepMaterials.index",
    "model-deepMaterials.meta",
    "options.json",
];

/// Write a hermetic config and return its path.
fn write_config(root: &Path) -> PathBuf {
    let checkpoint_dir = root.join("pretrained_checkpoints");
    let config_path = root.join("matnet.toml");
    let content = format!(
        r#"
[manager]
conda_path = "{conda}"
installer_base_url = "http://127.0.0.1:1"

[artifacts]
checkpoint_dir = "{ckpt}"
"#,
        conda = root.join("no-such-conda").display(),
        ckpt = checkpoint_dir.display(),
    );
    std::fs::write(&config_path, content).unwrap();
    config_path
}

fn run_command(config: &Path, args: &[&str]) -> std::process::Output {
    Command::new(matnet_bin())
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("matnet binary runs")
}

#[test]
fn check_reports_each_missing_file() {
    let root = TempDir::new().unwrap();
    let config = write_config(root.path());
    let ckpt = root.path().join("pretrained_checkpoints");
    std::fs::create_dir_all(&ckpt).unwrap();
    std::fs::write(ckpt.join("checkpoint"), "data").unwrap();

    let output = run_command(&config, &["check"]);
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("FOUND:   checkpoint"));
    assert!(stdout.contains("MISSING: options.json"));
    assert!(stdout.contains("INCOMPLETE"));
}

#[test]
fn check_passes_on_a_complete_directory() {
    let root = TempDir::new().unwrap();
    let config = write_config(root.path());
    let ckpt = root.path().join("pretrained_checkpoints");
    std::fs::create_dir_all(&ckpt).unwrap();
    for name in REQUIRED_FILES {
        std::fs::write(ckpt.join(name), "model bytes").unwrap();
    }

    let output = run_command(&config, &["check"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("COMPLETE"));
}

#[test]
fn check_points_at_fix_layout_for_nested_downloads() {
    let root = TempDir::new().unwrap();
    let config = write_config(root.path());
    let nested = root
        .path()
        .join("pretrained_checkpoints")
        .join("pretrained_checkpoints");
    std::fs::create_dir_all(&nested).unwrap();
    for name in REQUIRED_FILES {
        std::fs::write(nested.join(name), "model bytes").unwrap();
    }

    let output = run_command(&config, &["check"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout).contains("fix-layout"));
}

#[test]
fn fix_layout_hoists_nested_files_and_passes_check() {
    let root = TempDir::new().unwrap();
    let config = write_config(root.path());
    let ckpt = root.path().join("pretrained_checkpoints");
    let nested = ckpt.join("pretrained_checkpoints");
    std::fs::create_dir_all(&nested).unwrap();
    for name in REQUIRED_FILES {
        std::fs::write(nested.join(name), "model bytes").unwrap();
    }

    let output = run_command(&config, &["fix-layout"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(ckpt.join("options.json").exists());

    let output = run_command(&config, &["check"]);
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn status_is_read_only_and_always_succeeds() {
    let root = TempDir::new().unwrap();
    let config = write_config(root.path());

    let output = run_command(&config, &["status"]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Conda:        not found"));
    assert!(stdout.contains("svbrdf"));
    assert!(!root.path().join("pretrained_checkpoints").exists());
}

#[test]
fn bootstrap_failure_names_stage_and_remedy() {
    let root = TempDir::new().unwrap();
    let config = write_config(root.path());

    let output = run_command(&config, &["bootstrap"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("manager-install: FAILED"));
    assert!(stderr.contains("Remedy:"));
}

#[test]
fn invoke_refuses_when_bootstrap_failed() {
    let root = TempDir::new().unwrap();
    let config = write_config(root.path());
    let input = root.path().join("input.png");
    image::DynamicImage::new_rgb8(4, 4).save(&input).unwrap();
    let out_dir = root.path().join("maps");

    let output = Command::new(matnet_bin())
        .arg("--config")
        .arg(&config)
        .arg("invoke")
        .arg(&input)
        .arg("--out")
        .arg(&out_dir)
        .output()
        .expect("matnet binary runs");

    assert_eq!(output.status.code(), Some(2), "not-ready exit code");
    assert!(String::from_utf8_lossy(&output.stderr).contains("not ready"));
    assert!(!out_dir.exists(), "no outputs written when gated");
}
