//! Sitemap XML parsing.
//!
//! Handles both `<urlset>` documents and `<sitemapindex>` documents with a
//! streaming `quick_xml` reader. Comments, processing instructions and unknown
//! elements are ignored; `<loc>` text is unescaped and may be wrapped in CDATA.

use chrono::{DateTime, NaiveDate};
use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::debug;

/// One `<url>` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: Option<NaiveDate>,
}

/// A parsed sitemap document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDocument {
    /// `<sitemapindex>`: child sitemap URLs in document order.
    Index(Vec<String>),
    /// `<urlset>`: page entries.
    UrlSet(Vec<SitemapEntry>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Root {
    UrlSet,
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Loc,
    Lastmod,
}

/// Text collected for the `<url>` or `<sitemap>` element being read.
#[derive(Default)]
struct PendingEntry {
    loc: String,
    lastmod: String,
    /// Set when a text node could not be unescaped.
    broken: bool,
}

impl PendingEntry {
    fn push(&mut self, field: Field, text: &str) {
        match field {
            Field::Loc => self.loc.push_str(text),
            Field::Lastmod => self.lastmod.push_str(text),
        }
    }
}

/// Parse a sitemap body. Returns `None` if it is neither a urlset nor an index.
///
/// A document that turns malformed after its root element keeps the entries
/// read up to that point.
pub fn parse_sitemap(xml: &str) -> Option<SitemapDocument> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut root: Option<Root> = None;
    let mut pending: Option<PendingEntry> = None;
    let mut field: Option<Field> = None;
    let mut children = Vec::new();
    let mut entries = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match (root, e.local_name().as_ref()) {
                (None, b"urlset") => root = Some(Root::UrlSet),
                (None, b"sitemapindex") => root = Some(Root::Index),
                (None, _) => return None,
                (Some(Root::UrlSet), b"url") | (Some(Root::Index), b"sitemap") => {
                    pending = Some(PendingEntry::default());
                }
                (Some(_), b"loc") if pending.is_some() => field = Some(Field::Loc),
                (Some(_), b"lastmod") if pending.is_some() => field = Some(Field::Lastmod),
                _ => {}
            },
            Ok(Event::Empty(e)) if root.is_none() => match e.local_name().as_ref() {
                b"urlset" => root = Some(Root::UrlSet),
                b"sitemapindex" => root = Some(Root::Index),
                _ => return None,
            },
            Ok(Event::Text(t)) => {
                if let (Some(f), Some(entry)) = (field, pending.as_mut()) {
                    match t.unescape() {
                        Ok(text) => entry.push(f, &text),
                        Err(_) => entry.broken = true,
                    }
                }
            }
            Ok(Event::CData(c)) => {
                if let (Some(f), Some(entry)) = (field, pending.as_mut()) {
                    entry.push(f, &String::from_utf8_lossy(c.as_ref()));
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"loc" | b"lastmod" => field = None,
                b"url" | b"sitemap" => {
                    field = None;
                    let Some(entry) = pending.take() else {
                        continue;
                    };
                    let loc = entry.loc.trim();
                    if entry.broken || loc.is_empty() {
                        continue;
                    }
                    match root {
                        Some(Root::Index) => children.push(loc.to_string()),
                        Some(Root::UrlSet) => entries.push(SitemapEntry {
                            loc: loc.to_string(),
                            lastmod: parse_lastmod(&entry.lastmod),
                        }),
                        None => {}
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                root?;
                debug!(
                    error = %e,
                    position = reader.buffer_position(),
                    "sitemap truncated at malformed XML"
                );
                break;
            }
            _ => {}
        }
    }

    match root? {
        Root::Index => Some(SitemapDocument::Index(children)),
        Root::UrlSet => Some(SitemapDocument::UrlSet(entries)),
    }
}

/// Parse a W3C datetime (`2026-10-01`, `2026-10-01T09:30:00+01:00`).
pub fn parse_lastmod(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    raw.get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}
