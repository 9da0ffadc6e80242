//! Build provenance for a normalized document from its source descriptor and
//! the configured defaults.

use chrono::{DateTime, Utc};

use govsnap_normalize::NormalizedDocument;
use govsnap_provenance::{ProvenanceMetadata, TaggedDocument, effective_sensitivity};
use govsnap_shared::{ProvenanceDefaults, Result, SourceDescriptor};

/// Extension key recording where a redirected fetch ended up.
pub const FINAL_URL_KEY: &str = "final_url";

/// Attach provenance to `document`.
///
/// Descriptor fields win over defaults. The requested sensitivity is clamped
/// to the configured ceiling; descriptor overrides become extension fields.
pub fn tag_document(
    source: &SourceDescriptor,
    document: NormalizedDocument,
    defaults: &ProvenanceDefaults,
    retrieved_at: DateTime<Utc>,
    final_url: Option<&str>,
) -> Result<TaggedDocument> {
    let publisher = source
        .publisher
        .clone()
        .unwrap_or_else(|| defaults.publisher.clone());

    let mut meta =
        ProvenanceMetadata::new(&source.url, retrieved_at, publisher, source.source_type);
    meta.title = Some(document.title.clone());
    meta.license_notes = source.license_notes.clone();
    meta.department = source.department.clone();
    meta.visibility = source.visibility.clone().or_else(|| defaults.visibility.clone());
    meta.knowledge_profile = source
        .knowledge_profile
        .clone()
        .or_else(|| defaults.knowledge_profile.clone());

    let requested = source
        .sensitivity
        .as_deref()
        .unwrap_or(defaults.default_sensitivity.as_str());
    meta.sensitivity = Some(effective_sensitivity(
        requested,
        defaults.sensitivity_ceiling,
    ));

    for (key, value) in &source.overrides {
        meta.insert_extension(key, value)?;
    }
    if let Some(final_url) = final_url.filter(|u| *u != source.url) {
        meta.insert_extension(FINAL_URL_KEY, final_url)?;
    }

    Ok(TaggedDocument::new(document, meta))
}
