//! Core domain types shared by every GovSnap stage.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::IngestError;

// ---------------------------------------------------------------------------
// SourceType
// ---------------------------------------------------------------------------

/// The kind of payload a source serves. Selects the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// A public web page.
    #[default]
    Html,
    /// An open-data catalog record (dataset metadata as JSON).
    Catalog,
    /// A legislative-matter record (JSON).
    Legislative,
    /// Payload is already plain text or Markdown.
    Text,
}

impl SourceType {
    /// Stable lower-case name, as written in config and provenance headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Catalog => "catalog",
            Self::Legislative => "legislative",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(Self::Html),
            "catalog" => Ok(Self::Catalog),
            "legislative" => Ok(Self::Legislative),
            "text" => Ok(Self::Text),
            other => Err(IngestError::validation(format!(
                "unknown source type '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Sensitivity
// ---------------------------------------------------------------------------

/// Ordered sensitivity classification: `public < internal < confidential < restricted < privileged`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    #[default]
    Public,
    Internal,
    Confidential,
    Restricted,
    Privileged,
}

impl Sensitivity {
    /// All levels, lowest first.
    pub const ALL: [Sensitivity; 5] = [
        Self::Public,
        Self::Internal,
        Self::Confidential,
        Self::Restricted,
        Self::Privileged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Internal => "internal",
            Self::Confidential => "confidential",
            Self::Restricted => "restricted",
            Self::Privileged => "privileged",
        }
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sensitivity {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == wanted)
            .ok_or_else(|| IngestError::validation(format!("unknown sensitivity '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// SourceDescriptor
// ---------------------------------------------------------------------------

/// One fetch target and its destination in the snapshot tree.
///
/// Created by the config/catalog layer and consumed once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Absolute http(s) URL to fetch.
    pub url: String,
    /// Destination, relative to the snapshot root.
    pub output_path: String,
    /// Payload kind.
    #[serde(default)]
    pub source_type: SourceType,
    /// Publishing authority. Falls back to the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    /// Requested sensitivity name; clamped to the configured ceiling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_notes: Option<String>,
    /// Free-form fields passed through to the provenance extension bag.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, String>,
}

impl SourceDescriptor {
    /// Minimal descriptor with every optional field unset.
    pub fn new(url: impl Into<String>, output_path: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            url: url.into(),
            output_path: output_path.into(),
            source_type,
            publisher: None,
            department: None,
            sensitivity: None,
            visibility: None,
            knowledge_profile: None,
            license_notes: None,
            overrides: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// Compute the lowercase hex SHA-256 of `content`.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensitivity_is_ordered() {
        assert!(Sensitivity::Public < Sensitivity::Internal);
        assert!(Sensitivity::Internal < Sensitivity::Confidential);
        assert!(Sensitivity::Confidential < Sensitivity::Restricted);
        assert!(Sensitivity::Restricted < Sensitivity::Privileged);
    }

    #[test]
    fn sensitivity_parses_case_insensitively() {
        assert_eq!("Confidential".parse::<Sensitivity>().unwrap(), Sensitivity::Confidential);
        assert_eq!(" public ".parse::<Sensitivity>().unwrap(), Sensitivity::Public);
        assert!("secret".parse::<Sensitivity>().is_err());
    }

    #[test]
    fn source_type_roundtrip() {
        for ty in [
            SourceType::Html,
            SourceType::Catalog,
            SourceType::Legislative,
            SourceType::Text,
        ] {
            assert_eq!(ty.as_str().parse::<SourceType>().unwrap(), ty);
        }
    }

    #[test]
    fn descriptor_deserializes_with_defaults() {
        let json = r#"{"url": "https://city.example.gov/a", "output_path": "city/a.md"}"#;
        let desc: SourceDescriptor = serde_json::from_str(json).expect("deserialize");
        assert_eq!(desc.source_type, SourceType::Html);
        assert!(desc.publisher.is_none());
        assert!(desc.overrides.is_empty());
    }

    #[test]
    fn test_content_hash() {
        let hash = content_hash("hello world");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }
}
