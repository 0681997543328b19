use std::sync::LazyLock;

use regex::Regex;

static WIKI_PAGE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/wiki/([^/]+)$").unwrap());
static LIST_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+and\s+|\s*,\s*").unwrap());

/// Name used to find the "Facts about …" heading: the last path segment of the
/// source, with underscores read as spaces.
pub fn subject_name(source: &str) -> String {
    source
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .replace('_', " ")
        .trim()
        .to_string()
}

/// Page identity used as the botanical name.
///
/// Accepts a wiki URL (`…/wiki/Malus_domestica`) or a bare page name
/// (`Malus domestica`). Any other URL shape does not resolve.
pub fn page_name(source: &str) -> Option<String> {
    let source = source.trim();
    let segment = match WIKI_PAGE_RE.captures(source) {
        Some(caps) => caps.get(1)?.as_str(),
        None if !source.contains('/') => source,
        None => return None,
    };
    let name = segment.replace('_', " ").trim().to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Split a list-ish value on `and` / comma separators, dropping empty pieces.
pub fn split_list(value: &str) -> impl Iterator<Item = &str> {
    LIST_SPLIT_RE
        .split(value)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Uppercase the first character and lowercase the rest ("heavy clay" → "Heavy clay").
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
