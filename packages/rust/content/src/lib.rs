//! Content asset model for the blog corpus.
//!
//! Assets are `.mdx` files with a YAML frontmatter block and a markdown body.
//! Malformed assets are rejected at load time; the inventory loader skips
//! them with a warning so one bad file never hides the rest of the corpus.

pub mod cleanup;
mod frontmatter;
mod links;

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use seoagent_shared::{Result, SeoAgentError};

pub use frontmatter::{
    DraftOverrides, Frontmatter, MAX_DESCRIPTION_CHARS, parse_document, parse_draft,
    serialize_document,
};
pub use links::{count_external_links, count_internal_links, internal_link_targets};

/// File extension of content assets.
pub const ASSET_EXTENSION: &str = "mdx";

// ---------------------------------------------------------------------------
// ContentAsset
// ---------------------------------------------------------------------------

/// One long-form content asset on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentAsset {
    pub path: PathBuf,
    pub frontmatter: Frontmatter,
    pub body: String,
}

impl ContentAsset {
    /// Load and validate one asset file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| SeoAgentError::io(path, e))?;
        let (frontmatter, body) = parse_document(&raw).map_err(|e| {
            SeoAgentError::validation(format!("{}: {e}", path.display()))
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            frontmatter,
            body,
        })
    }

    pub fn slug(&self) -> &str {
        &self.frontmatter.slug
    }

    pub fn title(&self) -> &str {
        &self.frontmatter.title
    }

    pub fn target_keyword(&self) -> &str {
        &self.frontmatter.target_keyword
    }

    /// File name without directories, e.g. `2026-03-alloy-wheel-repair-exeter.mdx`.
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Days since the asset was last written (refresh date, else publish date).
    pub fn age_days(&self, today: NaiveDate) -> i64 {
        (today - self.frontmatter.last_touched()).num_days()
    }

    pub fn word_count(&self) -> usize {
        count_words(&self.body)
    }

    /// Serialized document (frontmatter + body).
    pub fn to_document(&self) -> Result<String> {
        serialize_document(&self.frontmatter, &self.body)
    }

    /// Write the asset to its path, creating the parent directory if needed.
    pub fn write(&self) -> Result<()> {
        let doc = self.to_document()?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SeoAgentError::io(parent, e))?;
        }
        std::fs::write(&self.path, doc).map_err(|e| SeoAgentError::io(&self.path, e))
    }
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// Load every asset in `dir`, sorted by file name.
///
/// A missing directory is an empty corpus. Files that fail to parse or
/// validate are skipped with a warning.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub fn load_inventory(dir: &Path) -> Result<Vec<ContentAsset>> {
    if !dir.exists() {
        debug!("content directory does not exist, empty inventory");
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| SeoAgentError::io(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .is_some_and(|ext| ext == ASSET_EXTENSION || ext == "md")
        })
        .collect();
    paths.sort();

    let mut assets = Vec::with_capacity(paths.len());
    for path in paths {
        match ContentAsset::load(&path) {
            Ok(asset) => assets.push(asset),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping malformed asset"),
        }
    }

    debug!(count = assets.len(), "inventory loaded");
    Ok(assets)
}

/// Content file name for a slug published in a given month: `{YYYY-MM}-{slug}.mdx`.
pub fn asset_filename(published_at: NaiveDate, slug: &str) -> String {
    format!("{}-{slug}.{ASSET_EXTENSION}", published_at.format("%Y-%m"))
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

/// Count words in a markdown body (excluding code blocks and bare heading markers).
pub fn count_words(md: &str) -> usize {
    static CODE_BLOCK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("valid regex"));

    let without_code = CODE_BLOCK_RE.replace_all(md, "");
    without_code
        .split_whitespace()
        .filter(|w| !w.chars().all(|c| c == '#' || c == '-' || c == '*' || c == '|'))
        .count()
}

/// Lowercase kebab-case slug from free text.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else if c != '\'' {
            pending_dash = true;
        }
    }
    slug
}

/// SHA-256 hex digest of some content.
pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// SHA-256 hex digest of a file.
pub fn hash_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| SeoAgentError::io(path, e))?;
    Ok(content_hash(&bytes))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use seoagent_shared::Pillar;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("seoagent_content_{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn asset(dir: &Path, slug: &str, published: NaiveDate) -> ContentAsset {
        ContentAsset {
            path: dir.join(asset_filename(published, slug)),
            frontmatter: Frontmatter {
                title: format!("About {slug}"),
                slug: slug.into(),
                description: "A short description.".into(),
                keywords: vec![slug.replace('-', " ")],
                published_at: published,
                updated_at: None,
                target_keyword: slug.replace('-', " "),
                author: "Team".into(),
                pillar: Pillar::General,
                hero_image: "/images/blog/general-1.jpg".into(),
            },
            body: "Some body text with [a link](/blog/other).\n".into(),
        }
    }

    #[test]
    fn filename_uses_publish_month() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 4).unwrap();
        assert_eq!(
            asset_filename(date, "smart-repair-cost"),
            "2026-03-smart-repair-cost.mdx"
        );
    }

    #[test]
    fn write_then_load_roundtrip() {
        let dir = temp_dir();
        let a = asset(&dir, "kerb-damage", NaiveDate::from_ymd_opt(2026, 1, 10).unwrap());
        a.write().unwrap();

        let loaded = ContentAsset::load(&a.path).unwrap();
        assert_eq!(loaded, a);
        assert_eq!(loaded.filename(), "2026-01-kerb-damage.mdx");
    }

    #[test]
    fn inventory_sorted_and_skips_malformed() {
        let dir = temp_dir();
        asset(&dir, "zeta", NaiveDate::from_ymd_opt(2026, 5, 1).unwrap())
            .write()
            .unwrap();
        asset(&dir, "alpha", NaiveDate::from_ymd_opt(2026, 2, 1).unwrap())
            .write()
            .unwrap();
        std::fs::write(dir.join("2026-04-broken.mdx"), "---\ntitle: nope\n---\nBody").unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let inventory = load_inventory(&dir).unwrap();
        let slugs: Vec<&str> = inventory.iter().map(|a| a.slug()).collect();
        assert_eq!(slugs, vec!["alpha", "zeta"]);
    }

    #[test]
    fn missing_dir_is_empty() {
        let dir = std::env::temp_dir().join(format!("seoagent_missing_{}", Uuid::now_v7()));
        assert!(load_inventory(&dir).unwrap().is_empty());
    }

    #[test]
    fn age_counts_from_last_touch() {
        let dir = temp_dir();
        let mut a = asset(&dir, "age", NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        let today = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert_eq!(a.age_days(today), 60);
        a.frontmatter.updated_at = NaiveDate::from_ymd_opt(2026, 3, 1);
        assert_eq!(a.age_days(today), 1);
    }

    #[test]
    fn count_words_skips_code_and_markers() {
        let md = "## Heading here\n\nOne two three.\n\n```rust\nfn main() {}\n```\n\n- item";
        assert_eq!(count_words(md), 6);
    }

    #[test]
    fn slugify_variants() {
        assert_eq!(slugify("Alloy Wheel Repair: Exeter"), "alloy-wheel-repair-exeter");
        assert_eq!(slugify("  What's a SMART repair?  "), "whats-a-smart-repair");
        assert_eq!(slugify("kerb--damage"), "kerb-damage");
    }

    #[test]
    fn hashes_differ_on_change() {
        assert_eq!(content_hash(b"abc"), content_hash(b"abc"));
        assert_ne!(content_hash(b"abc"), content_hash(b"abd"));
        assert_eq!(content_hash(b"").len(), 64);
    }
}
