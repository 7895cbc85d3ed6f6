//! Repair of broken checkpoint directory layouts.
//!
//! Hub snapshots occasionally arrive with Windows-style paths encoded
//! as literal backslashes in file names, or nested one directory too
//! deep. Both layouts carry the right bytes in the wrong place, so they
//! are repaired in place instead of re-downloaded.

use std::path::Path;

use tracing::{debug, info};

use super::ArtifactManifest;

/// Counts of repaired entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayoutRepair {
    /// Files extracted from backslash-separated names.
    pub extracted: usize,
    /// Entries hoisted out of a nested checkpoint directory.
    pub hoisted: usize,
}

impl LayoutRepair {
    pub fn changed(&self) -> bool {
        self.extracted > 0 || self.hoisted > 0
    }
}

/// Repair both known layout problems under `dir`. Existing files are
/// never overwritten; backslash-named originals are removed only once
/// the manifest is satisfied.
///
/// # Errors
///
/// Returns the underlying I/O error when the directory cannot be read
/// or an entry cannot be moved.
pub fn repair_layout(manifest: &ArtifactManifest, dir: &Path) -> std::io::Result<LayoutRepair> {
    let mut repair = LayoutRepair {
        hoisted: hoist_nested_dir(dir)?,
        extracted: 0,
    };
    repair.extracted = extract_backslash_names(manifest, dir)?;
    if repair.changed() {
        info!(
            dir = %dir.display(),
            extracted = repair.extracted,
            hoisted = repair.hoisted,
            "repaired checkpoint layout"
        );
    }
    Ok(repair)
}

/// Copy files whose names contain literal `\` separators to their
/// basename. Originals are removed only after the manifest validates,
/// so a half-finished repair never loses the only copy.
fn extract_backslash_names(manifest: &ArtifactManifest, dir: &Path) -> std::io::Result<usize> {
    let mut extracted = 0;
    let mut originals = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(basename) = name.rsplit('\\').next().filter(|_| name.contains('\\')) else {
            continue;
        };

        let target = dir.join(basename);
        if target.exists() {
            debug!(file = %name, "skipping extraction, target exists");
        } else {
            std::fs::copy(entry.path(), &target)?;
            debug!(file = %name, to = %basename, "extracted backslash-named file");
            extracted += 1;
        }
        originals.push(entry.path());
    }

    if !originals.is_empty() && manifest.is_complete(dir) {
        for original in originals {
            std::fs::remove_file(original)?;
        }
    }
    Ok(extracted)
}

/// Move entries out of a nested directory carrying the checkpoint
/// directory's own name (`<dir>/<dirname>/...`), then drop the nested
/// directory if emptied.
fn hoist_nested_dir(dir: &Path) -> std::io::Result<usize> {
    let Some(dirname) = dir.file_name() else {
        return Ok(0);
    };
    let nested = dir.join(dirname);
    if !nested.is_dir() {
        return Ok(0);
    }

    let mut hoisted = 0;
    for entry in std::fs::read_dir(&nested)? {
        let entry = entry?;
        let target = dir.join(entry.file_name());
        if target.exists() {
            debug!(entry = %entry.file_name().to_string_lossy(), "skipping hoist, target exists");
            continue;
        }
        std::fs::rename(entry.path(), &target)?;
        hoisted += 1;
    }

    // only removable when fully emptied
    let _ = std::fs::remove_dir(&nested);
    Ok(hoisted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> ArtifactManifest {
        ArtifactManifest::new(vec![
            "checkpoint".to_string(),
            "options.json".to_string(),
        ])
    }

    #[cfg(unix)]
    #[test]
    fn backslash_names_are_extracted_and_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(r"pretrained_checkpoints\checkpoint"),
            "data",
        )
        .unwrap();
        std::fs::write(
            dir.path().join(r"pretrained_checkpoints\options.json"),
            "{}",
        )
        .unwrap();

        let repair = repair_layout(&manifest(), dir.path()).unwrap();
        assert_eq!(repair.extracted, 2);
        assert!(manifest().is_complete(dir.path()));
        // originals removed once the manifest is satisfied
        assert!(!dir.path().join(r"pretrained_checkpoints\checkpoint").exists());
    }

    #[cfg(unix)]
    #[test]
    fn backslash_originals_survive_an_incomplete_repair() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(r"pretrained_checkpoints\checkpoint"),
            "data",
        )
        .unwrap();

        let repair = repair_layout(&manifest(), dir.path()).unwrap();
        assert_eq!(repair.extracted, 1);
        // options.json still missing, so the original is kept
        assert!(dir.path().join(r"pretrained_checkpoints\checkpoint").exists());
    }

    #[test]
    fn nested_directory_is_hoisted() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("pretrained_checkpoints");
        let nested = dir.join("pretrained_checkpoints");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("checkpoint"), "data").unwrap();
        std::fs::write(nested.join("options.json"), "{}").unwrap();

        let repair = repair_layout(&manifest(), &dir).unwrap();
        assert_eq!(repair.hoisted, 2);
        assert!(manifest().is_complete(&dir));
        assert!(!nested.exists(), "emptied nested directory is removed");
    }

    #[test]
    fn existing_files_are_never_overwritten() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("pretrained_checkpoints");
        let nested = dir.join("pretrained_checkpoints");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.join("checkpoint"), "keep me").unwrap();
        std::fs::write(nested.join("checkpoint"), "nested copy").unwrap();

        let repair = repair_layout(&manifest(), &dir).unwrap();
        assert_eq!(repair.hoisted, 0);
        assert_eq!(
            std::fs::read_to_string(dir.join("checkpoint")).unwrap(),
            "keep me"
        );
    }

    #[test]
    fn clean_layout_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("checkpoint"), "data").unwrap();
        std::fs::write(dir.path().join("options.json"), "{}").unwrap();

        let repair = repair_layout(&manifest(), dir.path()).unwrap();
        assert!(!repair.changed());
    }
}
