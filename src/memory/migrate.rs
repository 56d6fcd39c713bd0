//! Legacy JSON store discovery.
//!
//! Earlier versions kept the whole graph in line-delimited JSON files:
//! `memory.json` at the base directory (or inside `.memory/`) for the main
//! branch, plus one `<branch>.json` per extra branch inside `.memory/`. On
//! startup these are discovered, imported into the primary store, backed up,
//! and renamed so the migration runs once.

use std::path::{Path, PathBuf};

use crate::memory::error::Result;

/// A legacy file and the branch its records belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyFile {
    pub path: PathBuf,
    pub branch: String,
}

/// Suffix appended to a consumed legacy file.
pub const IMPORTED_SUFFIX: &str = "imported";

/// Discover legacy JSON stores under `base_dir`.
///
/// Looks for `memory.json` at `base_dir` and `base_dir/.memory/` (both map
/// to `main`), and any other `<branch>.json` directly inside `.memory/` —
/// dotfiles and the backups directory are ignored.
pub fn discover_legacy_files(base_dir: &Path) -> Result<Vec<LegacyFile>> {
    let mut files = Vec::new();

    for candidate in [
        base_dir.join("memory.json"),
        base_dir.join(".memory").join("memory.json"),
    ] {
        if candidate.is_file() {
            files.push(LegacyFile {
                path: candidate,
                branch: "main".to_string(),
            });
        }
    }

    let memory_dir = base_dir.join(".memory");
    if memory_dir.is_dir() {
        let mut branch_files = Vec::new();
        for entry in std::fs::read_dir(&memory_dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem == "memory" || stem == "memory.db" || stem.starts_with('.') {
                continue;
            }
            let branch = stem.to_string();
            branch_files.push(LegacyFile { path, branch });
        }
        branch_files.sort_by(|a, b| a.branch.cmp(&b.branch));
        files.extend(branch_files);
    }

    Ok(files)
}

/// Rename a consumed file to `<name>.imported` so a restart does not import
/// it twice.
pub fn mark_imported(path: &Path) -> Result<PathBuf> {
    let mut renamed = path.as_os_str().to_owned();
    renamed.push(".");
    renamed.push(IMPORTED_SUFFIX);
    let renamed = PathBuf::from(renamed);
    std::fs::rename(path, &renamed)?;
    Ok(renamed)
}
