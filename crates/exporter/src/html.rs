//! Minimal HTML handling for instruction markup and embedded page data.
//!
//! The pipeline needs exactly two things from HTML: the plain text of an
//! entitlement's instruction snippet, and the JSON body of one well-known
//! `<script id=…>` element on a fetched page. A full DOM parser buys nothing
//! here.

use std::sync::OnceLock;

use regex::Regex;

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("static regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

/// Decode the handful of entities that occur in instruction snippets.
fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Strip markup down to plain text with collapsed whitespace.
#[must_use]
pub fn strip_to_text(html: &str) -> String {
    let without_tags = tag_re().replace_all(html, "");
    let decoded = decode_entities(&without_tags);
    whitespace_re().replace_all(&decoded, " ").trim().to_string()
}

/// Extract the text content of the `<script>` element with the given id.
///
/// Returns `None` when no such element exists in the document.
#[must_use]
pub fn script_content(html: &str, id: &str) -> Option<String> {
    let pattern = format!(
        r#"(?is)<script[^>]*\bid\s*=\s*["']{}["'][^>]*>(.*?)</script>"#,
        regex::escape(id)
    );
    let re = Regex::new(&pattern).ok()?;
    re.captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}
