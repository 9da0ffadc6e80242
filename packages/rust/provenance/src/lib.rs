//! Provenance header codec.
//!
//! Every persisted document starts with a header block recording where, when
//! and under what authority it was retrieved:
//!
//! ```text
//! ---
//! source_url: "https://city.example.gov/notices/1"
//! retrieved_at: "2024-06-01T12:00:00Z"
//! publisher: "City Clerk"
//! source_type: "html"
//! title: "Public Notice"
//! ---
//!
//! Body text...
//! ```

pub mod codec;
pub mod metadata;

pub use codec::{DecodedDocument, MARKER, decode, encode};
pub use metadata::{ProvenanceMetadata, TaggedDocument, effective_sensitivity};
