//! Provenance metadata model and the tagged document unit.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use govsnap_normalize::NormalizedDocument;
use govsnap_shared::{IngestError, Result, Sensitivity, SourceType, content_hash};

use crate::codec;

/// Header keys with a fixed meaning, in encoding order.
pub(crate) const FIXED_FIELDS: &[&str] = &[
    "source_url",
    "retrieved_at",
    "publisher",
    "source_type",
    "title",
    "license_notes",
    "department",
    "sensitivity",
    "visibility",
    "knowledge_profile",
];

/// Metadata recorded for one retrieved document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvenanceMetadata {
    pub source_url: String,
    pub retrieved_at: DateTime<Utc>,
    pub publisher: String,
    pub source_type: SourceType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<Sensitivity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_profile: Option<String>,

    /// Keys outside the fixed set. Only reachable through [`Self::insert_extension`]
    /// so every key stays valid.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    extensions: BTreeMap<String, String>,
}

impl ProvenanceMetadata {
    pub fn new(
        source_url: impl Into<String>,
        retrieved_at: DateTime<Utc>,
        publisher: impl Into<String>,
        source_type: SourceType,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            retrieved_at,
            publisher: publisher.into(),
            source_type,
            title: None,
            license_notes: None,
            department: None,
            sensitivity: None,
            visibility: None,
            knowledge_profile: None,
            extensions: BTreeMap::new(),
        }
    }

    /// Extension fields, sorted by key.
    pub fn extensions(&self) -> &BTreeMap<String, String> {
        &self.extensions
    }

    /// Add or replace an extension field.
    ///
    /// Keys must be non-empty, use only `[A-Za-z0-9_.-]`, and must not shadow
    /// a fixed field.
    pub fn insert_extension(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        validate_extension_key(&key)?;
        self.extensions.insert(key, value.into());
        Ok(())
    }
}

pub(crate) fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn validate_extension_key(key: &str) -> Result<()> {
    if !is_valid_key(key) {
        return Err(IngestError::validation(format!(
            "invalid metadata key '{key}': use letters, digits, '_', '.', '-'"
        )));
    }
    if FIXED_FIELDS.contains(&key) {
        return Err(IngestError::validation(format!(
            "metadata key '{key}' is reserved"
        )));
    }
    Ok(())
}

/// Clamp a requested sensitivity to `ceiling`.
///
/// An unrecognized request is read as `internal` before clamping.
pub fn effective_sensitivity(requested: &str, ceiling: Sensitivity) -> Sensitivity {
    let wanted = requested.parse::<Sensitivity>().unwrap_or_else(|_| {
        debug!(requested, "unrecognized sensitivity, using internal");
        Sensitivity::Internal
    });
    wanted.min(ceiling)
}

// ---------------------------------------------------------------------------
// TaggedDocument
// ---------------------------------------------------------------------------

/// A normalized document plus its provenance. The unit that gets persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedDocument {
    pub document: NormalizedDocument,
    pub metadata: ProvenanceMetadata,
}

impl TaggedDocument {
    pub fn new(document: NormalizedDocument, metadata: ProvenanceMetadata) -> Self {
        Self { document, metadata }
    }

    /// Header followed by body, as written to disk.
    pub fn render(&self) -> String {
        let mut out = codec::encode(&self.metadata);
        out.push_str(&self.document.body_text);
        out
    }

    /// Change-detection hash. Covers everything `render` writes except
    /// `retrieved_at`, which differs on every run.
    pub fn fingerprint(&self) -> String {
        let mut out = codec::encode_without_retrieval_time(&self.metadata);
        out.push_str(&self.document.body_text);
        content_hash(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn meta() -> ProvenanceMetadata {
        ProvenanceMetadata::new(
            "https://city.example.gov/a",
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            "City Clerk",
            SourceType::Html,
        )
    }

    fn doc(body: &str) -> NormalizedDocument {
        NormalizedDocument {
            title: "A".into(),
            body_text: body.into(),
            source_url: "https://city.example.gov/a".into(),
        }
    }

    #[test]
    fn extension_keys_are_validated() {
        let mut m = meta();
        m.insert_extension("x-agency.code", "42").unwrap();
        assert_eq!(m.extensions().get("x-agency.code").map(String::as_str), Some("42"));

        assert!(m.insert_extension("", "v").is_err());
        assert!(m.insert_extension("has space", "v").is_err());
        assert!(m.insert_extension("colon:key", "v").is_err());
        assert!(m.insert_extension("publisher", "v").is_err());
    }

    #[test]
    fn sensitivity_is_clamped_to_ceiling() {
        assert_eq!(
            effective_sensitivity("restricted", Sensitivity::Confidential),
            Sensitivity::Confidential
        );
        assert_eq!(
            effective_sensitivity("public", Sensitivity::Confidential),
            Sensitivity::Public
        );
        assert_eq!(
            effective_sensitivity("Privileged", Sensitivity::Privileged),
            Sensitivity::Privileged
        );
    }

    #[test]
    fn unknown_sensitivity_reads_as_internal() {
        assert_eq!(
            effective_sensitivity("top-secret", Sensitivity::Restricted),
            Sensitivity::Internal
        );
        assert_eq!(
            effective_sensitivity("", Sensitivity::Public),
            Sensitivity::Public
        );
    }

    #[test]
    fn render_is_header_then_body() {
        let tagged = TaggedDocument::new(doc("Body text."), meta());
        let rendered = tagged.render();
        assert!(rendered.starts_with("---\nsource_url: "));
        assert!(rendered.ends_with("---\n\nBody text."));
    }

    #[test]
    fn fingerprint_ignores_retrieval_time() {
        let first = TaggedDocument::new(doc("Body"), meta());
        let mut later_meta = meta();
        later_meta.retrieved_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let later = TaggedDocument::new(doc("Body"), later_meta);

        assert_ne!(first.render(), later.render());
        assert_eq!(first.fingerprint(), later.fingerprint());
    }

    #[test]
    fn fingerprint_tracks_body_and_metadata() {
        let base = TaggedDocument::new(doc("Body"), meta());
        let edited = TaggedDocument::new(doc("Body, amended"), meta());
        assert_ne!(base.fingerprint(), edited.fingerprint());

        let mut m = meta();
        m.sensitivity = Some(Sensitivity::Confidential);
        let reclassified = TaggedDocument::new(doc("Body"), m);
        assert_ne!(base.fingerprint(), reclassified.fingerprint());
    }
}
