//! Idempotent content writer.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info, instrument};

use govsnap_shared::{IngestError, Result, content_hash};

use crate::sidecar::{Sidecar, sidecar_path};

/// Outcome of one [`SnapshotStore::write_if_changed`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    /// Content and sidecar were (re)written.
    pub changed: bool,
    /// No previous snapshot existed at this path.
    pub created: bool,
    pub hash: String,
    /// Hash recorded by the previous sidecar, if any.
    pub previous_hash: Option<String>,
}

/// Writes snapshot files under a root directory, skipping unchanged content.
///
/// The read-compare-write for a path runs under that path's own lock, so two
/// writers never race past the hash comparison. Different paths do not block
/// each other.
pub struct SnapshotStore {
    root: PathBuf,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location for a root-relative path. Absolute paths and `..`
    /// components are rejected.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> Result<PathBuf> {
        let relative = relative.as_ref();
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || relative.as_os_str().is_empty() {
            return Err(IngestError::validation(format!(
                "snapshot path must be relative and stay under the root: {}",
                relative.display()
            )));
        }
        Ok(self.root.join(relative))
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(path.to_path_buf()).or_default().clone()
    }

    /// Write `content` to `relative` unless its hash matches the sidecar.
    pub fn write_if_changed(&self, relative: impl AsRef<Path>, content: &str) -> Result<WriteResult> {
        let hash = content_hash(content);
        self.write_if_changed_with_hash(relative, content, &hash)
    }

    /// Like [`Self::write_if_changed`], with the change-detection hash
    /// supplied by the caller.
    #[instrument(skip_all, fields(path = %relative.as_ref().display()))]
    pub fn write_if_changed_with_hash(
        &self,
        relative: impl AsRef<Path>,
        content: &str,
        hash: &str,
    ) -> Result<WriteResult> {
        let target = self.resolve(&relative)?;
        let meta_path = sidecar_path(&target);

        let lock = self.lock_for(&target);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let previous_hash = Sidecar::load(&meta_path).map(|s| s.hash);
        let content_exists = target.is_file();

        if content_exists && previous_hash.as_deref() == Some(hash) {
            debug!("unchanged, skipping write");
            return Ok(WriteResult {
                changed: false,
                created: false,
                hash: hash.to_string(),
                previous_hash,
            });
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IngestError::io(parent, e))?;
        }
        write_atomic(&target, content)?;
        Sidecar {
            hash: hash.to_string(),
            updated_at: Utc::now(),
        }
        .save(&meta_path)?;

        let created = previous_hash.is_none() || !content_exists;
        info!(created, "snapshot written");

        Ok(WriteResult {
            changed: true,
            created,
            hash: hash.to_string(),
            previous_hash,
        })
    }
}

/// Write through a temp file in the same directory, then rename.
fn write_atomic(target: &Path, content: &str) -> Result<()> {
    let file_name = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| IngestError::validation(format!("bad snapshot path {}", target.display())))?;
    let temp = target.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, content).map_err(|e| IngestError::io(&temp, e))?;
    std::fs::rename(&temp, target).map_err(|e| IngestError::io(target, e))?;
    Ok(())
}
