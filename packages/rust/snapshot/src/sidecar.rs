//! Sidecar change-detection records.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use govsnap_shared::{IngestError, Result};

/// Appended to a content file's name to form its sidecar name.
pub const SIDECAR_SUFFIX: &str = ".meta.json";

/// `{"hash": "...", "updatedAt": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sidecar {
    pub hash: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// Sidecar location for a content file.
pub fn sidecar_path(content_path: &Path) -> PathBuf {
    let mut name = content_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(SIDECAR_SUFFIX);
    content_path.with_file_name(name)
}

pub fn is_sidecar(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(SIDECAR_SUFFIX) && n.len() > SIDECAR_SUFFIX.len())
}

/// Content file a sidecar belongs to.
pub(crate) fn content_path_for(sidecar: &Path) -> Option<PathBuf> {
    let name = sidecar.file_name()?.to_str()?;
    let stem = name.strip_suffix(SIDECAR_SUFFIX)?;
    (!stem.is_empty()).then(|| sidecar.with_file_name(stem))
}

impl Sidecar {
    /// Read a sidecar. A missing or unreadable record is `None`; the caller
    /// then treats the content as new.
    pub fn load(path: &Path) -> Option<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "sidecar unreadable");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(sidecar) => Some(sidecar),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "sidecar corrupt, ignoring");
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| IngestError::parse(format!("failed to serialize sidecar: {e}")))?;
        std::fs::write(path, json).map_err(|e| IngestError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_path_appends_suffix() {
        let p = sidecar_path(Path::new("/snap/council/agenda.md"));
        assert_eq!(p, PathBuf::from("/snap/council/agenda.md.meta.json"));
        assert_eq!(content_path_for(&p), Some(PathBuf::from("/snap/council/agenda.md")));
    }

    #[test]
    fn recognizes_sidecars() {
        assert!(is_sidecar(Path::new("a.md.meta.json")));
        assert!(!is_sidecar(Path::new("a.md")));
        assert!(!is_sidecar(Path::new(".meta.json")));
    }

    #[test]
    fn json_uses_camel_case_timestamp() {
        let sidecar = Sidecar {
            hash: "abc".into(),
            updated_at: "2024-06-01T12:00:00Z".parse().unwrap(),
        };
        let json = serde_json::to_value(&sidecar).unwrap();
        assert_eq!(json["hash"], "abc");
        assert!(json["updatedAt"].as_str().unwrap().starts_with("2024-06-01T12:00:00"));
    }

    #[test]
    fn corrupt_sidecar_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.md.meta.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(Sidecar::load(&path).is_none());
        assert!(Sidecar::load(&dir.path().join("missing.meta.json")).is_none());
    }
}
