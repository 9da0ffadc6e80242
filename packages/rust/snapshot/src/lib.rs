//! Change-detecting snapshot tree.
//!
//! Each content file has a sidecar `<name>.meta.json` holding the hash of the
//! last written content and when it was written. Writing the same content
//! twice touches the filesystem once.

pub mod scan;
pub mod sidecar;
pub mod store;

pub use scan::{SnapshotStats, clean_orphaned_metadata, stats};
pub use sidecar::{SIDECAR_SUFFIX, Sidecar, is_sidecar, sidecar_path};
pub use store::{SnapshotStore, WriteResult};
