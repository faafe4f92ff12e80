//! Pure HTML/text helpers: tag stripping, normalization, term counting, and
//! link extraction. No I/O; everything here is deterministic and unit
//! tested directly.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};

const MIN_WORD_LEN: usize = 3;
const MAX_WORD_LEN: usize = 32;

lazy_static! {
    static ref TAG_RE: Regex = Regex::new(r"<[^>]*>").expect("static tag regex is valid");
}

/// Removes substrings matching `<...>` (non-greedy, angle-bracket
/// delimited). Entity references are left unexpanded.
pub fn strip_tags(html: &str) -> String {
    TAG_RE.replace_all(html, "").into_owned()
}

/// Maps every character: ASCII alphanumeric -> lowercase, whitespace -> kept
/// as a single space, everything else (including non-ASCII letters/digits)
/// -> dropped. Output contains only `[a-z0-9]` and space. Idempotent on its
/// own output.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if c.is_whitespace() {
            out.push(' ');
        }
    }
    out
}

/// Splits on whitespace runs, keeps tokens of length `[3, 32]`, and counts
/// occurrences.
pub fn count_terms(text: &str) -> HashMap<String, u32> {
    let mut freq = HashMap::new();
    for token in text.split_whitespace() {
        if token.len() >= MIN_WORD_LEN && token.len() <= MAX_WORD_LEN {
            *freq.entry(token.to_string()).or_insert(0) += 1;
        }
    }
    freq
}

/// Parses `html` leniently and resolves every `<a href>` against `base_url`:
/// drop empty/`#`/`javascript:`/`mailto:`/`tel:` hrefs, keep absolute URLs
/// verbatim, resolve `/`-rooted hrefs against `base_url`'s scheme+authority,
/// append other relatives to `base_url`, and keep only `http(s)://` results.
/// Duplicates are not removed here.
pub fn extract_links(html: &str, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").expect("static selector is valid");

    document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| resolve_href(href, base_url))
        .collect()
}

fn resolve_href(href: &str, base_url: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
    {
        return None;
    }

    let resolved = if href.contains("://") {
        href.to_string()
    } else if let Some(rest) = href.strip_prefix('/') {
        let authority_end = base_url.find("://").map(|i| i + 3);
        match authority_end {
            Some(start) => {
                let path_start = base_url[start..]
                    .find('/')
                    .map(|i| start + i)
                    .unwrap_or(base_url.len());
                format!("{}/{}", &base_url[..path_start], rest)
            }
            None => format!("{base_url}/{rest}"),
        }
    } else if base_url.ends_with('/') {
        format!("{base_url}{href}")
    } else {
        format!("{base_url}/{href}")
    };

    if resolved.starts_with("http://") || resolved.starts_with("https://") {
        Some(resolved)
    } else {
        None
    }
}
