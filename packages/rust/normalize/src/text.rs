//! Normalizer for payloads that are already plain text or Markdown.

use tracing::instrument;

use govsnap_shared::Result;

use crate::cleanup::normalize_whitespace;
use crate::{NormalizedDocument, Normalizer, UNTITLED};

#[derive(Debug, Clone, Copy, Default)]
pub struct TextNormalizer;

impl Normalizer for TextNormalizer {
    #[instrument(skip(self, raw), fields(url = %source_url))]
    fn normalize(&self, raw: &str, source_url: &str) -> Result<NormalizedDocument> {
        let body_text = normalize_whitespace(raw);
        let title = body_text
            .lines()
            .find_map(|line| line.strip_prefix("# "))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());

        Ok(NormalizedDocument {
            title,
            body_text,
            source_url: source_url.to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "text"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_from_first_heading() {
        let doc = TextNormalizer
            .normalize("Intro line\n\n# Meeting   Notes\n\nBody", "https://x.test/notes.md")
            .unwrap();
        assert_eq!(doc.title, "Meeting Notes");
        assert_eq!(doc.body_text, "Intro line\n\n# Meeting Notes\n\nBody");
    }

    #[test]
    fn renormalizing_is_a_no_op() {
        let once = TextNormalizer
            .normalize("  Plain \t text\n\n\n\nmore  ", "https://x.test/")
            .unwrap();
        let twice = TextNormalizer
            .normalize(&once.body_text, "https://x.test/")
            .unwrap();
        assert_eq!(once.body_text, "Plain text\n\nmore");
        assert_eq!(once, twice);
        assert_eq!(once.title, "Untitled");
    }
}
