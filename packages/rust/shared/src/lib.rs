//! Shared types, error model, and configuration for GovSnap.
//!
//! This crate is the foundation depended on by all other GovSnap crates.
//! It provides:
//! - [`IngestError`]: the unified error type
//! - Domain types ([`SourceDescriptor`], [`SourceType`], [`Sensitivity`])
//! - Configuration ([`AppConfig`], [`HttpConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DEFAULT_USER_AGENT, HttpConfig, OutputConfig, ProvenanceDefaults, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_source,
};
pub use error::{IngestError, Result};
pub use types::{Sensitivity, SourceDescriptor, SourceType, content_hash};
