//! Post-conversion cleanup pipeline for Markdown output.
//!
//! Each cleanup pass is a function `&str -> String` applied in sequence over
//! `htmd` output. Character references are already decoded by the HTML
//! parser at that point, so the pipeline never decodes them again.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Run the full cleanup pipeline on converted Markdown text.
pub fn run_pipeline(md: &str, base_url: Option<&Url>) -> String {
    let mut result = md.replace("\r\n", "\n");

    result = fix_code_block_languages(&result);
    result = strip_leftover_html(&result);
    result = resolve_links(&result, base_url);
    result = normalize_whitespace(&result);

    result
}

/// Whitespace-only normalization for text that is already plain.
pub fn normalize_whitespace(md: &str) -> String {
    let collapsed = collapse_horizontal_whitespace(&md.replace("\r\n", "\n"));
    let collapsed = clean_blank_lines(&collapsed);
    collapsed.trim().to_string()
}

/// Apply `f` to every line that is not inside a fenced code block.
fn map_prose_lines(md: &str, mut f: impl FnMut(&str) -> String) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut in_code_block = false;

    for line in md.lines() {
        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
            out.push(line.trim_end().to_string());
            continue;
        }
        if in_code_block {
            out.push(line.to_string());
        } else {
            out.push(f(line));
        }
    }

    out.join("\n")
}

// ---------------------------------------------------------------------------
// Pass 1: Fix code block language hints
// ---------------------------------------------------------------------------

/// Strip class-like prefixes (`language-js`, `lang-python`) from code fences.
fn fix_code_block_languages(md: &str) -> String {
    static LANG_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^```(?:language-|lang-|highlight-)(\w+)").expect("valid regex")
    });

    LANG_PREFIX_RE.replace_all(md, "```$1").to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: Strip leftover HTML tags
// ---------------------------------------------------------------------------

/// Remove stray layout tags that survived the conversion, keeping their text.
fn strip_leftover_html(md: &str) -> String {
    static HTML_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"</?(?:div|span|section|article|aside|header|footer|figure|figcaption|details|summary|font|center)(?:\s[^>]*)?>").expect("valid regex")
    });

    map_prose_lines(md, |line| HTML_TAG_RE.replace_all(line, "").to_string())
}

// ---------------------------------------------------------------------------
// Character references in raw record fields
// ---------------------------------------------------------------------------

/// Named references we decode in structured-record values, which reach us
/// without an HTML parser in front.
const NAMED_ENTITIES: &[(&str, &str)] = &[
    ("amp", "&"),
    ("lt", "<"),
    ("gt", ">"),
    ("quot", "\""),
    ("apos", "'"),
    ("nbsp", " "),
    ("ndash", "\u{2013}"),
    ("mdash", "\u{2014}"),
    ("hellip", "\u{2026}"),
    ("lsquo", "\u{2018}"),
    ("rsquo", "\u{2019}"),
    ("ldquo", "\u{201C}"),
    ("rdquo", "\u{201D}"),
    ("bull", "\u{2022}"),
    ("middot", "\u{00B7}"),
    ("sect", "\u{00A7}"),
    ("para", "\u{00B6}"),
    ("copy", "\u{00A9}"),
    ("reg", "\u{00AE}"),
    ("trade", "\u{2122}"),
    ("deg", "\u{00B0}"),
    ("eacute", "\u{00E9}"),
    ("ntilde", "\u{00F1}"),
];

/// Decode numeric (`&#39;`, `&#x27;`) and common named character references.
pub fn decode_entities(md: &str) -> String {
    static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"&(?:#(\d{1,7})|#[xX]([0-9a-fA-F]{1,6})|([a-zA-Z]{2,8}));")
            .expect("valid regex")
    });

    map_prose_lines(md, |line| {
        ENTITY_RE
            .replace_all(line, |caps: &regex::Captures| {
                let decoded = if let Some(dec) = caps.get(1) {
                    dec.as_str().parse::<u32>().ok().and_then(char::from_u32).map(String::from)
                } else if let Some(hex) = caps.get(2) {
                    u32::from_str_radix(hex.as_str(), 16)
                        .ok()
                        .and_then(char::from_u32)
                        .map(String::from)
                } else {
                    let name = &caps[3];
                    NAMED_ENTITIES
                        .iter()
                        .find(|(n, _)| *n == name)
                        .map(|(_, v)| (*v).to_string())
                };
                decoded.unwrap_or_else(|| caps[0].to_string())
            })
            .to_string()
    })
}

// ---------------------------------------------------------------------------
// Pass 3: Resolve relative links
// ---------------------------------------------------------------------------

/// Resolve relative URLs in Markdown links against a base URL.
fn resolve_links(md: &str, base_url: Option<&Url>) -> String {
    let Some(base) = base_url else {
        return md.to_string();
    };

    static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\[([^\]]*)\]\(([^)\s]+)\)").expect("valid regex")
    });

    map_prose_lines(md, |line| {
        LINK_RE
            .replace_all(line, |caps: &regex::Captures| {
                let text = &caps[1];
                let href = &caps[2];

                if href.starts_with("http://")
                    || href.starts_with("https://")
                    || href.starts_with('#')
                    || href.starts_with("mailto:")
                    || href.starts_with("tel:")
                {
                    return caps[0].to_string();
                }

                match base.join(href) {
                    Ok(resolved) => format!("[{text}]({resolved})"),
                    Err(_) => caps[0].to_string(),
                }
            })
            .to_string()
    })
}

// ---------------------------------------------------------------------------
// Pass 4: Whitespace
// ---------------------------------------------------------------------------

/// Collapse runs of spaces/tabs to one space. Leading indentation is kept so
/// nested list items stay nested.
fn collapse_horizontal_whitespace(md: &str) -> String {
    static RUN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").expect("valid regex"));

    map_prose_lines(md, |line| {
        let body = line.trim_start_matches([' ', '\t']);
        let indent = &line[..line.len() - body.len()];
        let body = RUN_RE.replace_all(body, " ");
        let body = body.trim_end();
        if body.is_empty() {
            String::new()
        } else {
            format!("{indent}{body}")
        }
    })
}

/// Collapse 3+ consecutive newlines (2+ blank lines) into a single blank line.
fn clean_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(md, "\n\n").to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
