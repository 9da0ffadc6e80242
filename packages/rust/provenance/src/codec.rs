//! Header encoding and decoding.
//!
//! Values are always double-quoted with `\\`, `\"`, `\n`, `\r` and `\t`
//! escaped, so no value can produce a bare marker line.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::trace;

use govsnap_shared::{IngestError, Result, Sensitivity, SourceType};

use crate::metadata::{FIXED_FIELDS, ProvenanceMetadata, is_valid_key};

/// Start and end delimiter line.
pub const MARKER: &str = "---";

/// Result of [`decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedDocument {
    /// `None` when the input carries no header.
    pub metadata: Option<ProvenanceMetadata>,
    pub body: String,
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Serialize `meta` as a header block, including the trailing blank line.
pub fn encode(meta: &ProvenanceMetadata) -> String {
    encode_fields(meta, true)
}

/// Header as [`encode`] writes it, minus the `retrieved_at` line.
pub(crate) fn encode_without_retrieval_time(meta: &ProvenanceMetadata) -> String {
    encode_fields(meta, false)
}

fn encode_fields(meta: &ProvenanceMetadata, with_retrieved_at: bool) -> String {
    let mut lines = vec![MARKER.to_string()];
    let mut push = |key: &str, value: &str| lines.push(format!("{key}: \"{}\"", escape(value)));

    push("source_url", &meta.source_url);
    if with_retrieved_at {
        push("retrieved_at", &format_timestamp(&meta.retrieved_at));
    }
    push("publisher", &meta.publisher);
    push("source_type", meta.source_type.as_str());

    let optional = [
        ("title", meta.title.as_deref()),
        ("license_notes", meta.license_notes.as_deref()),
        ("department", meta.department.as_deref()),
        ("sensitivity", meta.sensitivity.as_ref().map(Sensitivity::as_str)),
        ("visibility", meta.visibility.as_deref()),
        ("knowledge_profile", meta.knowledge_profile.as_deref()),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            push(key, value);
        }
    }

    for (key, value) in meta.extensions() {
        push(key, value);
    }

    lines.push(MARKER.to_string());
    format!("{}\n\n", lines.join("\n"))
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Split a document into its provenance header and body.
///
/// Input that does not start with a marker line passes through untouched as
/// the body. A header that is opened but never closed, lacks a required field,
/// or holds an invalid value is a parse error.
pub fn decode(document: &str) -> Result<DecodedDocument> {
    let Some(mut remaining) = document
        .strip_prefix("---\n")
        .or_else(|| document.strip_prefix("---\r\n"))
    else {
        return Ok(DecodedDocument {
            metadata: None,
            body: document.to_string(),
        });
    };

    let mut fields: Vec<(String, String)> = Vec::new();
    loop {
        if remaining.is_empty() {
            return Err(IngestError::parse("provenance header is not terminated"));
        }
        let (line, next) = remaining.split_once('\n').unwrap_or((remaining, ""));
        remaining = next;
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line == MARKER {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        fields.push(parse_line(line)?);
    }

    let body = remaining
        .strip_prefix("\r\n")
        .or_else(|| remaining.strip_prefix('\n'))
        .unwrap_or(remaining);

    trace!(fields = fields.len(), "provenance header parsed");

    Ok(DecodedDocument {
        metadata: Some(build_metadata(fields)?),
        body: body.to_string(),
    })
}

fn parse_line(line: &str) -> Result<(String, String)> {
    let (key, raw) = line
        .split_once(':')
        .ok_or_else(|| IngestError::parse(format!("malformed header line '{line}'")))?;
    let key = key.trim();
    if !is_valid_key(key) {
        return Err(IngestError::parse(format!("invalid header key '{key}'")));
    }

    let raw = raw.trim();
    let value = match raw
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
    {
        Some(inner) => unescape(inner)
            .ok_or_else(|| IngestError::parse(format!("bad escape in value of '{key}'")))?,
        None => raw.to_string(),
    };

    Ok((key.to_string(), value))
}

fn unescape(value: &str) -> Option<String> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            _ => return None,
        }
    }
    Some(out)
}

fn build_metadata(fields: Vec<(String, String)>) -> Result<ProvenanceMetadata> {
    let mut fixed: BTreeMap<&'static str, String> = BTreeMap::new();
    let mut extensions: Vec<(String, String)> = Vec::new();

    for (key, value) in fields {
        match FIXED_FIELDS.iter().find(|f| **f == key) {
            Some(name) => {
                fixed.insert(*name, value);
            }
            None => extensions.push((key, value)),
        }
    }

    let mut required = |name: &str| {
        fixed
            .remove(name)
            .ok_or_else(|| IngestError::parse(format!("provenance header is missing '{name}'")))
    };

    let source_url = required("source_url")?;
    let retrieved_raw = required("retrieved_at")?;
    let publisher = required("publisher")?;
    let source_type_raw = required("source_type")?;

    let retrieved_at = DateTime::parse_from_rfc3339(&retrieved_raw)
        .map_err(|e| IngestError::parse(format!("invalid retrieved_at '{retrieved_raw}': {e}")))?
        .with_timezone(&Utc);
    let source_type = source_type_raw
        .parse::<SourceType>()
        .map_err(|e| IngestError::parse(e.to_string()))?;

    let mut meta = ProvenanceMetadata::new(source_url, retrieved_at, publisher, source_type);
    meta.title = fixed.remove("title");
    meta.license_notes = fixed.remove("license_notes");
    meta.department = fixed.remove("department");
    meta.visibility = fixed.remove("visibility");
    meta.knowledge_profile = fixed.remove("knowledge_profile");
    meta.sensitivity = fixed
        .remove("sensitivity")
        .map(|s| s.parse::<Sensitivity>())
        .transpose()
        .map_err(|e| IngestError::parse(e.to_string()))?;

    for (key, value) in extensions {
        meta.insert_extension(key, value)?;
    }

    Ok(meta)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn full_meta() -> ProvenanceMetadata {
        let mut m = ProvenanceMetadata::new(
            "https://city.example.gov/notices/1?ref=home",
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 5).unwrap(),
            "City Clerk",
            SourceType::Legislative,
        );
        m.title = Some("Public Notice".into());
        m.license_notes = Some("Public domain".into());
        m.department = Some("Planning".into());
        m.sensitivity = Some(Sensitivity::Internal);
        m.visibility = Some("staff".into());
        m.knowledge_profile = Some("land-use".into());
        m.insert_extension("x-batch", "7").unwrap();
        m.insert_extension("agency.code", "PLN").unwrap();
        m
    }

    #[test]
    fn encode_orders_required_then_optional_then_extensions() {
        let encoded = encode(&full_meta());
        let keys: Vec<&str> = encoded
            .lines()
            .filter_map(|l| l.split_once(':').map(|(k, _)| k))
            .collect();
        assert_eq!(
            keys,
            vec![
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
                "agency.code",
                "x-batch",
            ]
        );
        assert!(encoded.starts_with("---\n"));
        assert!(encoded.ends_with("\n---\n\n"));
        assert!(encoded.contains("retrieved_at: \"2024-06-01T12:30:05Z\""));
    }

    #[test]
    fn round_trip_full_metadata() {
        let meta = full_meta();
        let body = "# Notice\n\nHearing on Monday.\n";
        let decoded = decode(&(encode(&meta) + body)).unwrap();
        assert_eq!(decoded.metadata, Some(meta));
        assert_eq!(decoded.body, body);
    }

    #[test]
    fn round_trip_minimal_metadata_and_empty_body() {
        let meta = ProvenanceMetadata::new(
            "https://x.test/",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            "",
            SourceType::Html,
        );
        let decoded = decode(&encode(&meta)).unwrap();
        assert_eq!(decoded.metadata, Some(meta));
        assert_eq!(decoded.body, "");
    }

    #[test]
    fn title_with_quotes_and_newline_round_trips() {
        let mut meta = full_meta();
        meta.title = Some("Document with \"quotes\" and newlines\nhere".into());
        let encoded = encode(&meta);
        assert!(encoded.contains(r#"title: "Document with \"quotes\" and newlines\nhere""#));

        let decoded = decode(&(encoded + "body")).unwrap();
        assert_eq!(
            decoded.metadata.unwrap().title.as_deref(),
            Some("Document with \"quotes\" and newlines\nhere")
        );
    }

    #[test]
    fn escapes_backslash_tab_and_marker_like_values() {
        let mut meta = full_meta();
        meta.license_notes = Some("C:\\data\tsheet\r\n---\nnot a marker".into());
        let encoded = encode(&meta);
        assert_eq!(encoded.lines().filter(|l| *l == MARKER).count(), 2);

        let decoded = decode(&(encoded + "b")).unwrap();
        assert_eq!(decoded.metadata, Some(meta));
    }

    #[test]
    fn sub_second_timestamps_are_lossless() {
        let mut meta = full_meta();
        meta.retrieved_at = Utc.timestamp_opt(1_717_245_005, 123_456_789).unwrap();
        let decoded = decode(&encode(&meta)).unwrap();
        assert_eq!(decoded.metadata.unwrap().retrieved_at, meta.retrieved_at);
    }

    #[test]
    fn document_without_header_passes_through() {
        let text = "# Plain\n\nNo header here.";
        let decoded = decode(text).unwrap();
        assert!(decoded.metadata.is_none());
        assert_eq!(decoded.body, text);
    }

    #[test]
    fn unknown_keys_go_to_extensions() {
        let doc = "---\nsource_url: \"https://x.test/\"\nretrieved_at: \"2024-01-01T00:00:00Z\"\npublisher: \"P\"\nsource_type: \"text\"\ncustom_tag: \"kept\"\n---\n\nbody";
        let meta = decode(doc).unwrap().metadata.unwrap();
        assert_eq!(meta.extensions().get("custom_tag").map(String::as_str), Some("kept"));
        assert_eq!(meta.source_type, SourceType::Text);
    }

    #[test]
    fn unquoted_values_and_crlf_are_accepted() {
        let doc = "---\r\nsource_url: https://x.test/\r\nretrieved_at: 2024-01-01T00:00:00Z\r\npublisher: P\r\nsource_type: html\r\n---\r\n\r\nbody";
        let decoded = decode(doc).unwrap();
        let meta = decoded.metadata.unwrap();
        assert_eq!(meta.source_url, "https://x.test/");
        assert_eq!(decoded.body, "body");
    }

    #[test]
    fn unterminated_header_is_parse_error() {
        let err = decode("---\nsource_url: \"https://x.test/\"\nbody without end").unwrap_err();
        assert!(matches!(err, IngestError::Parse { .. }));
    }

    #[test]
    fn missing_required_field_is_parse_error() {
        let doc = "---\nsource_url: \"https://x.test/\"\npublisher: \"P\"\nsource_type: \"html\"\n---\n\n";
        let err = decode(doc).unwrap_err();
        assert!(err.to_string().contains("retrieved_at"));
    }

    #[test]
    fn invalid_values_are_parse_errors() {
        let base = "source_url: \"u\"\nretrieved_at: \"2024-01-01T00:00:00Z\"\npublisher: \"P\"\n";
        let bad_type = format!("---\n{base}source_type: \"pdf\"\n---\n\n");
        let bad_sensitivity = format!("---\n{base}source_type: \"html\"\nsensitivity: \"secret\"\n---\n\n");
        let bad_time = "---\nsource_url: \"u\"\nretrieved_at: \"yesterday\"\npublisher: \"P\"\nsource_type: \"html\"\n---\n\n";
        let bad_escape = format!("---\n{base}source_type: \"html\"\ntitle: \"a\\qb\"\n---\n\n");

        for doc in [bad_type.as_str(), bad_sensitivity.as_str(), bad_time, bad_escape.as_str()] {
            assert!(matches!(decode(doc).unwrap_err(), IngestError::Parse { .. }), "{doc}");
        }
    }
}
