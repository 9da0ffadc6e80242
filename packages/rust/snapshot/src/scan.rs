//! Whole-tree operations: aggregate statistics and orphan cleanup.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};
use walkdir::WalkDir;

use govsnap_shared::{IngestError, Result};

use crate::sidecar::{Sidecar, content_path_for, is_sidecar, sidecar_path};

/// Aggregate figures for a snapshot tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStats {
    /// Content files, sidecars excluded.
    pub total_files: u64,
    /// Bytes across content files.
    pub total_size: u64,
    pub newest_update: Option<DateTime<Utc>>,
    pub oldest_update: Option<DateTime<Utc>>,
}

/// Leftover temp files from an interrupted write.
fn is_temp(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.') && n.ends_with(".tmp"))
}

fn files_under(root: &Path) -> impl Iterator<Item = walkdir::DirEntry> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
}

/// Scan `root` recursively. A missing root yields zeroed stats.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn stats(root: &Path) -> Result<SnapshotStats> {
    let mut stats = SnapshotStats::default();
    if !root.exists() {
        return Ok(stats);
    }

    for entry in files_under(root) {
        let path = entry.path();
        if is_sidecar(path) || is_temp(path) {
            continue;
        }

        let size = entry
            .metadata()
            .map_err(|e| IngestError::io(path, e.into()))?
            .len();
        stats.total_files += 1;
        stats.total_size += size;

        if let Some(sidecar) = Sidecar::load(&sidecar_path(path)) {
            let ts = sidecar.updated_at;
            stats.newest_update = Some(stats.newest_update.map_or(ts, |n| n.max(ts)));
            stats.oldest_update = Some(stats.oldest_update.map_or(ts, |o| o.min(ts)));
        }
    }

    Ok(stats)
}

/// Delete every sidecar whose content file is gone. Content files are never
/// touched. Returns the removed sidecar paths.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn clean_orphaned_metadata(root: &Path) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    if !root.exists() {
        return Ok(removed);
    }

    let orphans: Vec<PathBuf> = files_under(root)
        .map(walkdir::DirEntry::into_path)
        .filter(|path| is_sidecar(path))
        .filter(|path| content_path_for(path).is_some_and(|content| !content.exists()))
        .collect();

    for path in orphans {
        std::fs::remove_file(&path).map_err(|e| IngestError::io(&path, e))?;
        info!(path = %path.display(), "removed orphaned sidecar");
        removed.push(path);
    }

    removed.sort();
    Ok(removed)
}
