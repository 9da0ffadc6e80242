//! HTML page normalizer.
//!
//! Converts a raw page to Markdown-flavoured plain text:
//! 1. Detach non-content regions from the DOM (chrome tags, comments, deny-listed class/id)
//! 2. Pick the content container (`main`, `article`, `[role=main]`, `body`)
//! 3. Render tables separately and leave placeholders
//! 4. Convert HTML → Markdown via `htmd`
//! 5. Splice tables back and run the cleanup pipeline
//!
//! Input without any elements (including this normalizer's own output) only
//! has its whitespace normalized.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use govsnap_shared::{IngestError, Result};

use crate::cleanup;
use crate::{NormalizedDocument, Normalizer, UNTITLED};

/// Tags that never carry page content.
const STRUCTURAL_TAGS: &[&str] = &[
    "nav", "header", "footer", "aside", "script", "style", "noscript", "iframe", "svg", "form",
    "template",
];

/// Containers that are never detached, even when their class/id looks like chrome.
const PROTECTED_TAGS: &[&str] = &["html", "head", "body", "main", "article"];

/// Tags `htmd` should drop outright if any survive.
const SKIP_TAGS: &[&str] = &["script", "style", "nav", "iframe", "noscript", "svg"];

/// Placeholder prefix for pre-rendered tables.
const TABLE_TOKEN: &str = "GOVSNAPTABLE";

/// Class/id tokens that mark navigation, advertising and other page chrome.
static DENY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:.*[-_])?(?:nav|navbar|navigation|menu|sidebar|breadcrumbs?|footer|masthead|banner|cookies?|consent|ads?|advert|adverts|advertisement|sponsored?|promo|social|share|sharing|skip|skiplink|pagination|pager|related|newsletter|popup|modal)(?:[-_].*)?$",
    )
    .expect("valid regex")
});

/// Normalizer for HTML pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlNormalizer;

impl Normalizer for HtmlNormalizer {
    #[instrument(skip(self, raw), fields(url = %source_url))]
    fn normalize(&self, raw: &str, source_url: &str) -> Result<NormalizedDocument> {
        let title = extract_title(raw);
        let base_url = Url::parse(source_url).ok();
        let body_text = to_plain_body(raw, base_url.as_ref())?;

        debug!(title = %title, body_len = body_text.len(), "html normalized");

        Ok(NormalizedDocument {
            title,
            body_text,
            source_url: source_url.to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "html"
    }
}

// ---------------------------------------------------------------------------
// Title extraction
// ---------------------------------------------------------------------------

/// Extract a page title: `<title>`, then the first content `<h1>`, then
/// `og:title`, else "Untitled". Headings inside page chrome are ignored.
pub fn extract_title(raw: &str) -> String {
    let mut doc = Html::parse_document(raw);
    strip_non_content(&mut doc);
    title_from_document(&doc).unwrap_or_else(|| UNTITLED.to_string())
}

fn title_from_document(doc: &Html) -> Option<String> {
    static TITLE_SEL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("title").expect("valid selector"));
    static H1_SEL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("h1").expect("valid selector"));
    static OG_SEL: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(r#"meta[property="og:title"]"#).expect("valid selector")
    });

    let text_of = |sel: &Selector| {
        doc.select(sel)
            .next()
            .map(|el| collapse(&el.text().collect::<String>()))
            .filter(|t| !t.is_empty())
    };

    text_of(&TITLE_SEL).or_else(|| text_of(&H1_SEL)).or_else(|| {
        doc.select(&OG_SEL)
            .next()
            .and_then(|el| el.value().attr("content"))
            .map(collapse)
            .filter(|t| !t.is_empty())
    })
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Body conversion
// ---------------------------------------------------------------------------

/// Convert raw HTML into normalized Markdown-flavoured text.
pub fn to_plain_body(raw: &str, base_url: Option<&Url>) -> Result<String> {
    if !has_markup(raw) {
        return Ok(cleanup::normalize_whitespace(raw));
    }

    let mut doc = Html::parse_document(raw);
    let removed = strip_non_content(&mut doc);
    debug!(removed, "non-content nodes detached");

    let content_html = content_container_html(&doc);
    let (content_html, tables) = extract_tables(&content_html);

    let skip_tags: Vec<&str> = SKIP_TAGS.to_vec();
    let converter = htmd::HtmlToMarkdown::builder().skip_tags(skip_tags).build();

    let mut markdown = converter
        .convert(&content_html)
        .map_err(|e| IngestError::Conversion(format!("htmd conversion failed: {e}")))?;

    // Highest index first so `..1Z` never clobbers `..11Z`.
    for (i, table) in tables.iter().enumerate().rev() {
        markdown = markdown.replace(&table_token(i), &format!("\n\n{table}\n\n"));
    }

    Ok(cleanup::run_pipeline(&markdown, base_url))
}

/// Whether `raw` parses to at least one element.
pub(crate) fn has_markup(raw: &str) -> bool {
    let fragment = Html::parse_fragment(raw);
    fragment
        .root_element()
        .descendants()
        .skip(1)
        .any(|node| node.value().is_element())
}

/// Detach comments, chrome tags and deny-listed elements. Returns how many were removed.
fn strip_non_content(doc: &mut Html) -> usize {
    let doomed: Vec<_> = doc
        .tree
        .nodes()
        .filter(|node| {
            let value = node.value();
            if value.is_comment() {
                return true;
            }
            let Some(el) = value.as_element() else {
                return false;
            };
            let name = el.name();
            if PROTECTED_TAGS.contains(&name) {
                return false;
            }
            STRUCTURAL_TAGS.contains(&name)
                || el.classes().any(|c| DENY_RE.is_match(c))
                || el.id().is_some_and(|id| DENY_RE.is_match(id))
        })
        .map(|node| node.id())
        .collect();

    for id in &doomed {
        if let Some(mut node) = doc.tree.get_mut(*id) {
            node.detach();
        }
    }
    doomed.len()
}

/// Inner HTML of the main content container, falling back to `<body>`.
fn content_container_html(doc: &Html) -> String {
    let selectors = ["main", "article", r#"[role="main"]"#, "body"];

    for sel_str in selectors {
        if let Ok(sel) = Selector::parse(sel_str) {
            if let Some(el) = doc.select(&sel).next() {
                return el.inner_html();
            }
        }
    }

    doc.root_element().inner_html()
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

fn table_token(index: usize) -> String {
    format!("{TABLE_TOKEN}{index}Z")
}

/// Replace each top-level `<table>` with a placeholder paragraph, returning the
/// rendered tables in placeholder order.
fn extract_tables(html: &str) -> (String, Vec<String>) {
    static TABLE_SEL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("table").expect("valid selector"));

    let fragment = Html::parse_fragment(html);
    let mut result = html.to_string();
    let mut tables = Vec::new();

    for table in fragment.select(&TABLE_SEL) {
        let outer = table.html();
        if !result.contains(&outer) {
            // Nested inside a table we already replaced.
            continue;
        }
        let token = table_token(tables.len());
        result = result.replacen(&outer, &format!("<p>{token}</p>"), 1);
        tables.push(table_to_markdown(&table));
    }

    (result, tables)
}

/// Render a table as pipe rows: header row, separator row, data rows.
fn table_to_markdown(table: &ElementRef) -> String {
    static TR_SEL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
    static CELL_SEL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("th, td").expect("valid selector"));

    let rows: Vec<Vec<String>> = table
        .select(&TR_SEL)
        .map(|tr| {
            tr.select(&CELL_SEL)
                .map(|cell| collapse(&cell.text().collect::<String>()).replace('|', "\\|"))
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect();

    let col_count = rows.iter().map(Vec::len).max().unwrap_or(0);
    if col_count == 0 {
        return String::new();
    }

    let render = |cells: &[String]| {
        let mut padded: Vec<&str> = cells.iter().map(String::as_str).collect();
        padded.resize(col_count, "");
        format!("| {} |", padded.join(" | "))
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(render(&rows[0]));
    lines.push(format!("| {} |", vec!["---"; col_count].join(" | ")));
    for row in &rows[1..] {
        lines.push(render(row));
    }
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
