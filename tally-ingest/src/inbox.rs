//! Drop directory for statement exports awaiting import.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Subdirectory of the inbox that receives files after a successful merge.
pub const PROCESSED_DIR: &str = "processed";

/// Every `*.csv` file directly under `dir`, sorted by file name.
/// A missing directory is an empty inbox.
pub fn list_statement_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("csv"));
        if path.is_file() && is_csv {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Move imported files into `dir/processed/`, replacing same-named files there.
pub fn archive_processed(dir: &Path, files: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let target_dir = dir.join(PROCESSED_DIR);
    fs::create_dir_all(&target_dir).with_context(|| format!("create {}", target_dir.display()))?;

    let mut moved = Vec::with_capacity(files.len());
    for file in files {
        let Some(name) = file.file_name() else {
            continue;
        };
        if !file.exists() {
            tracing::warn!(file = %file.display(), "statement file vanished before archiving");
            continue;
        }
        let target = target_dir.join(name);
        fs::rename(file, &target)
            .with_context(|| format!("move {} to {}", file.display(), target.display()))?;
        tracing::info!(file = %file.display(), "archived statement file");
        moved.push(target);
    }
    Ok(moved)
}
