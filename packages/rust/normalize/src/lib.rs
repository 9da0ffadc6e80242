//! Raw payload → [`NormalizedDocument`] conversion.
//!
//! Each [`SourceType`] has its own [`Normalizer`] implementation:
//! - [`HtmlNormalizer`] strips page chrome and converts the content to Markdown
//! - [`StructuredNormalizer`] maps catalog and legislative JSON records
//! - [`TextNormalizer`] only normalizes whitespace
//!
//! All of them produce the same shape of output, so downstream stages never
//! care which one ran.

pub mod cleanup;
pub mod html;
pub mod structured;
pub mod text;

use govsnap_shared::{Result, SourceType};

pub use html::{HtmlNormalizer, extract_title, to_plain_body};
pub use structured::{RecordKind, StructuredNormalizer};
pub use text::TextNormalizer;

/// Title used when a payload offers nothing better.
pub const UNTITLED: &str = "Untitled";

/// Plain content extracted from a payload, without any provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedDocument {
    pub title: String,
    pub body_text: String,
    pub source_url: String,
}

/// Converts a raw payload into a [`NormalizedDocument`].
///
/// Implementations are deterministic: the same input always yields the same
/// output.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, raw: &str, source_url: &str) -> Result<NormalizedDocument>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

static HTML: HtmlNormalizer = HtmlNormalizer;
static CATALOG: StructuredNormalizer = StructuredNormalizer::new(RecordKind::Catalog);
static LEGISLATIVE: StructuredNormalizer = StructuredNormalizer::new(RecordKind::Legislative);
static TEXT: TextNormalizer = TextNormalizer;

/// Select the normalizer for a source type.
pub fn normalizer_for(source_type: SourceType) -> &'static dyn Normalizer {
    match source_type {
        SourceType::Html => &HTML,
        SourceType::Catalog => &CATALOG,
        SourceType::Legislative => &LEGISLATIVE,
        SourceType::Text => &TEXT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_by_source_type() {
        assert_eq!(normalizer_for(SourceType::Html).name(), "html");
        assert_eq!(normalizer_for(SourceType::Catalog).name(), "catalog");
        assert_eq!(normalizer_for(SourceType::Legislative).name(), "legislative");
        assert_eq!(normalizer_for(SourceType::Text).name(), "text");
    }
}
