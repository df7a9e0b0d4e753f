// src/text.rs
//! Text normalization and term matching shared by the anonymizer and the
//! signal detector.

use once_cell::sync::OnceCell;
use regex::Regex;

/// Max chars kept from any single free-text field.
pub const MAX_TEXT_CHARS: usize = 5000;

/// Normalize inbound free text: decode entities, strip tags, unify quotes,
/// collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[a-z][^>]*>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Curly quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    let chars = out.chars().count();
    if chars > MAX_TEXT_CHARS {
        tracing::debug!(target: "anonymize", chars, kept = MAX_TEXT_CHARS, "free text truncated");
        out = out.chars().take(MAX_TEXT_CHARS).collect();
    }
    out
}

/// Lowercased alphanumeric tokens (apostrophes kept so "can't" survives).
pub fn tokenize(s: &str) -> Vec<String> {
    s.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Count whole-word occurrences of `term` in `haystack`.
/// Both sides are expected lowercased; `term` may contain spaces or dashes.
pub fn count_term(haystack: &str, term: &str) -> usize {
    if term.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(term) {
        let start = from + pos;
        let end = start + term.len();
        let before_ok = haystack[..start].chars().next_back().map_or(true, |c| !is_word_char(c));
        let after_ok = haystack[end..].chars().next().map_or(true, |c| !is_word_char(c));
        if before_ok && after_ok {
            count += 1;
        }
        from = start + term.chars().next().map_or(1, char::len_utf8);
    }
    count
}

pub fn contains_term(haystack: &str, term: &str) -> bool {
    count_term(haystack, term) > 0
}
