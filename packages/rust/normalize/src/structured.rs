//! Normalizer for structured portal records.
//!
//! Catalog (open-data dataset) and legislative-matter records arrive as JSON.
//! Known fields are mapped straight into a title and a Markdown body; nothing
//! goes through DOM stripping except individual field values that carry markup.

use serde_json::Value;
use tracing::{debug, instrument};

use govsnap_shared::{IngestError, Result};

use crate::cleanup::{decode_entities, normalize_whitespace};
use crate::html::{has_markup, to_plain_body};
use crate::{NormalizedDocument, Normalizer, UNTITLED};

/// Which field map to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Catalog,
    Legislative,
}

/// Field-map normalizer for JSON records.
#[derive(Debug, Clone, Copy)]
pub struct StructuredNormalizer {
    kind: RecordKind,
}

impl StructuredNormalizer {
    pub const fn new(kind: RecordKind) -> Self {
        Self { kind }
    }
}

impl Normalizer for StructuredNormalizer {
    #[instrument(skip(self, raw), fields(url = %source_url, kind = self.name()))]
    fn normalize(&self, raw: &str, source_url: &str) -> Result<NormalizedDocument> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| IngestError::parse(format!("invalid JSON record: {e}")))?;
        let record = unwrap_record(&value)?;

        let (title, body) = match self.kind {
            RecordKind::Catalog => catalog_fields(record),
            RecordKind::Legislative => legislative_fields(record),
        };

        let title = title.unwrap_or_else(|| UNTITLED.to_string());
        let body_text = normalize_whitespace(&body);
        debug!(title = %title, body_len = body_text.len(), "record normalized");

        Ok(NormalizedDocument {
            title,
            body_text,
            source_url: source_url.to_string(),
        })
    }

    fn name(&self) -> &'static str {
        match self.kind {
            RecordKind::Catalog => "catalog",
            RecordKind::Legislative => "legislative",
        }
    }
}

/// Peel a `{"result": ...}` envelope and take the first element of a list.
fn unwrap_record(value: &Value) -> Result<&Value> {
    let mut current = value;
    if let Some(inner) = current.get("result") {
        current = inner;
    }
    if let Value::Array(items) = current {
        current = items
            .first()
            .ok_or_else(|| IngestError::parse("record list is empty"))?;
    }
    if current.is_object() {
        Ok(current)
    } else {
        Err(IngestError::parse("record is not a JSON object"))
    }
}

// ---------------------------------------------------------------------------
// Field maps
// ---------------------------------------------------------------------------

fn catalog_fields(record: &Value) -> (Option<String>, String) {
    let title = first_text(record, &["title", "name"]).map(|t| one_line(&t));
    let mut body = Body::default();

    if let Some(desc) = first_text(record, &["notes", "description"]) {
        body.paragraph(&desc);
    }
    body.field(
        "Publisher",
        first_text(record, &["organization.title", "publisher.name", "publisher"]),
    );
    body.field("License", first_text(record, &["license_title", "license"]));

    let tags = string_list(record, &["tags", "keyword"], &["display_name", "name"]);
    if !tags.is_empty() {
        body.field("Tags", Some(tags.join(", ")));
    }
    body.field(
        "Last modified",
        first_text(record, &["metadata_modified", "modified"]),
    );
    body.field(
        "Landing page",
        first_text(record, &["landingPage", "landing_page", "url"]),
    );

    let resources: Vec<String> = first_array(record, &["resources", "distribution"])
        .iter()
        .filter_map(|res| {
            let name = first_text(res, &["name", "title"]);
            let url = first_text(res, &["url", "downloadURL", "accessURL"]);
            let format = first_text(res, &["format", "mediaType"]);
            let label = match (name, &url) {
                (Some(name), Some(url)) => format!("[{}]({url})", one_line(&name)),
                (Some(name), None) => one_line(&name),
                (None, Some(url)) => format!("<{url}>"),
                (None, None) => return None,
            };
            Some(match format {
                Some(format) => format!("{label} ({})", one_line(&format)),
                None => label,
            })
        })
        .collect();
    body.list("Resources", &resources);

    (title, body.finish())
}

fn legislative_fields(record: &Value) -> (Option<String>, String) {
    let title =
        first_text(record, &["MatterTitle", "MatterName", "title", "name"]).map(|t| one_line(&t));
    let mut body = Body::default();

    body.field("File number", first_text(record, &["MatterFile", "file_number"]));
    body.field("Type", first_text(record, &["MatterTypeName", "type"]));
    body.field("Status", first_text(record, &["MatterStatusName", "status"]));
    body.field("Body", first_text(record, &["MatterBodyName", "body"]));
    body.field("Introduced", first_text(record, &["MatterIntroDate", "intro_date"]));
    body.field(
        "Agenda date",
        first_text(record, &["MatterAgendaDate", "agenda_date"]),
    );

    let sponsors = string_list(
        record,
        &["MatterSponsors", "sponsors"],
        &["MatterSponsorName", "name"],
    );
    body.list("Sponsors", &sponsors);

    let attachments: Vec<String> = first_array(record, &["MatterAttachments", "attachments"])
        .iter()
        .filter_map(|att| {
            let name = first_text(att, &["MatterAttachmentName", "name"]).map(|n| one_line(&n));
            let link = first_text(att, &["MatterAttachmentHyperlink", "hyperlink", "url"]);
            match (name, link) {
                (Some(name), Some(link)) => Some(format!("[{name}]({link})")),
                (Some(name), None) => Some(name),
                (None, Some(link)) => Some(format!("<{link}>")),
                (None, None) => None,
            }
        })
        .collect();
    body.list("Attachments", &attachments);

    (title, body.finish())
}

// ---------------------------------------------------------------------------
// Body builder
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Body {
    blocks: Vec<String>,
    fields: Vec<String>,
}

impl Body {
    fn flush_fields(&mut self) {
        if !self.fields.is_empty() {
            self.blocks.push(std::mem::take(&mut self.fields).join("\n"));
        }
    }

    fn paragraph(&mut self, text: &str) {
        self.flush_fields();
        self.blocks.push(text.to_string());
    }

    fn field(&mut self, label: &str, value: Option<String>) {
        if let Some(value) = value {
            self.fields.push(format!("- **{label}:** {}", one_line(&value)));
        }
    }

    fn list(&mut self, heading: &str, items: &[String]) {
        if items.is_empty() {
            return;
        }
        self.flush_fields();
        let lines: Vec<String> = items.iter().map(|i| format!("- {i}")).collect();
        self.blocks.push(format!("## {heading}\n\n{}", lines.join("\n")));
    }

    fn finish(mut self) -> String {
        self.flush_fields();
        self.blocks.join("\n\n")
    }
}

// ---------------------------------------------------------------------------
// Value helpers
// ---------------------------------------------------------------------------

/// Follow a dotted path (`organization.title`) into nested objects.
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |v, key| v.get(key))
}

/// Scalar value as display text, markup stripped.
fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => clean_value(s),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// First non-empty scalar found among `paths`.
fn first_text(value: &Value, paths: &[&str]) -> Option<String> {
    paths
        .iter()
        .filter_map(|p| lookup(value, p))
        .find_map(scalar_text)
}

fn first_array<'a>(value: &'a Value, paths: &[&str]) -> &'a [Value] {
    paths
        .iter()
        .filter_map(|p| lookup(value, p))
        .find_map(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Strings from an array whose items are either strings or objects carrying
/// one of `name_keys`.
fn string_list(value: &Value, paths: &[&str], name_keys: &[&str]) -> Vec<String> {
    first_array(value, paths)
        .iter()
        .filter_map(|item| scalar_text(item).or_else(|| first_text(item, name_keys)))
        .map(|s| one_line(&s))
        .collect()
}

/// Field values sometimes embed HTML; run those through the page converter.
fn clean_value(raw: &str) -> String {
    let trimmed = raw.trim();
    if has_markup(trimmed) {
        if let Ok(body) = to_plain_body(trimmed, None) {
            return body;
        }
    }
    normalize_whitespace(&decode_entities(trimmed))
}

fn one_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
