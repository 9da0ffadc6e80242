//! Ingest orchestration for GovSnap.
//!
//! Ties the fetch, normalize, provenance and snapshot crates together into a
//! single [`Pipeline`] run over a list of source descriptors.

pub mod pipeline;
pub mod report;
pub mod tagging;

pub use pipeline::{Pipeline, ProgressReporter, SilentProgress};
pub use report::{IngestReport, SourceOutcome, SourceReport};
pub use tagging::{FINAL_URL_KEY, tag_document};
