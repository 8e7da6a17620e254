//! Link scanning over asset bodies.
//!
//! An internal link is a markdown link whose target is `{prefix}/{slug}`
//! (optionally with a trailing slash). Image links are never counted.

use std::sync::LazyLock;

use regex::Regex;

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(!?)\[([^\]\n]*)\]\(\s*([^)\s]+)(?:\s+[^)]*)?\)").expect("valid regex")
});

static SLUG_TARGET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-z0-9]+(?:-[a-z0-9]+)*)/?$").expect("valid regex"));

/// Non-image link targets, in document order.
fn link_targets(body: &str) -> impl Iterator<Item = &str> {
    LINK_RE
        .captures_iter(body)
        .filter(|c| c[1].is_empty())
        .filter_map(|c| c.get(3).map(|m| m.as_str()))
}

/// Slugs of internal links in document order (duplicates kept).
pub fn internal_link_targets(body: &str, prefix: &str) -> Vec<String> {
    let prefix = prefix.trim_end_matches('/');
    link_targets(body)
        .filter_map(|target| target.strip_prefix(prefix)?.strip_prefix('/'))
        .filter_map(|rest| SLUG_TARGET_RE.captures(rest).map(|c| c[1].to_string()))
        .collect()
}

/// Number of internal `[text]({prefix}/{slug})` links.
pub fn count_internal_links(body: &str, prefix: &str) -> usize {
    internal_link_targets(body, prefix).len()
}

/// Number of links pointing off-site (`http://`, `https://`, protocol-relative).
pub fn count_external_links(body: &str) -> usize {
    link_targets(body)
        .filter(|t| t.starts_with("http://") || t.starts_with("https://") || t.starts_with("//"))
        .count()
}
