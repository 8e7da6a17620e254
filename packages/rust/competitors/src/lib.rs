//! Competitor intelligence from public sitemaps.
//!
//! For each competitor on the roster the collector fetches the primary
//! sitemap (falling back to two well-known alternate paths), flattens one
//! level of sitemap index, and keeps the most recently modified pages.
//! Competitors are processed one at a time; a failing competitor is recorded
//! with its error and never aborts the collector.

mod sitemap;

use std::collections::HashMap;
use std::time::Duration;

use chrono::{Months, NaiveDate};
use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use url::Url;

use seoagent_shared::{
    CompetitorConfig, CompetitorPage, CompetitorProfile, CompetitorScanConfig, CompetitorStatus,
    Result, SeoAgentError,
};

pub use sitemap::{SitemapDocument, SitemapEntry, parse_lastmod, parse_sitemap};

/// Well-known sitemap locations tried when the primary URL fails.
pub const ALTERNATE_SITEMAP_PATHS: [&str; 2] = ["/sitemap_index.xml", "/wp-sitemap.xml"];

/// Maximum number of redirects to follow per sitemap request.
const MAX_REDIRECTS: usize = 5;

/// Maximum response size we accept for one sitemap (50 MB, the protocol limit).
const MAX_RESPONSE_SIZE: u64 = 50 * 1024 * 1024;

/// User-Agent string for sitemap requests.
const USER_AGENT: &str = concat!("seo-agent/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

/// Sequential sitemap collector with a bounded per-request timeout.
pub struct CompetitorCollector {
    client: Client,
    opts: CompetitorScanConfig,
}

impl CompetitorCollector {
    pub fn new(opts: &CompetitorScanConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(opts.timeout_secs))
            .build()
            .map_err(|e| SeoAgentError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            opts: opts.clone(),
        })
    }

    /// Collect a profile for every competitor on the roster, in roster order.
    #[instrument(skip_all, fields(competitors = roster.len()))]
    pub async fn collect(
        &self,
        roster: &[CompetitorConfig],
        today: NaiveDate,
    ) -> Vec<CompetitorProfile> {
        let mut profiles = Vec::with_capacity(roster.len());
        for competitor in roster {
            profiles.push(self.fetch_competitor(competitor, today).await);
        }

        let failed = profiles
            .iter()
            .filter(|p| matches!(p.status, CompetitorStatus::Error { .. }))
            .count();
        info!(total = profiles.len(), failed, "competitor scan complete");
        profiles
    }

    /// Build one competitor's profile. Errors are folded into the profile status.
    #[instrument(skip_all, fields(competitor = %competitor.name))]
    pub async fn fetch_competitor(
        &self,
        competitor: &CompetitorConfig,
        today: NaiveDate,
    ) -> CompetitorProfile {
        let mut failures = Vec::new();

        for url in candidate_urls(competitor) {
            match self.fetch_entries(&url).await {
                Ok(entries) => {
                    let total_urls = entries.len();
                    let recent_pages = recent_pages(
                        &entries,
                        today,
                        self.opts.recent_months,
                        self.opts.top_pages,
                    );
                    info!(
                        %url,
                        total_urls,
                        recent = recent_pages.len(),
                        "sitemap collected"
                    );
                    return CompetitorProfile {
                        name: competitor.name.clone(),
                        domain: competitor.domain.clone(),
                        sitemap_url: url,
                        status: CompetitorStatus::Ok,
                        total_urls,
                        recent_pages,
                    };
                }
                Err(e) => {
                    debug!(%url, error = %e, "sitemap candidate failed");
                    failures.push(e.to_string());
                }
            }
        }

        let reason = failures.join("; ");
        warn!(%reason, "competitor sitemap unavailable");
        CompetitorProfile {
            name: competitor.name.clone(),
            domain: competitor.domain.clone(),
            sitemap_url: competitor.sitemap_url.clone(),
            status: CompetitorStatus::Error { reason },
            total_urls: 0,
            recent_pages: Vec::new(),
        }
    }

    /// Fetch a sitemap and flatten at most one level of index.
    async fn fetch_entries(&self, url: &str) -> Result<Vec<SitemapEntry>> {
        let body = self.fetch_text(url).await?;
        let children = match parse_sitemap(&body) {
            Some(SitemapDocument::UrlSet(entries)) => return Ok(entries),
            Some(SitemapDocument::Index(children)) => children,
            None => {
                return Err(SeoAgentError::parse(format!("{url}: not a sitemap document")));
            }
        };

        let listed = children.len();
        if listed > self.opts.max_child_sitemaps {
            debug!(
                listed,
                limit = self.opts.max_child_sitemaps,
                "sitemap index truncated"
            );
        }

        let mut entries = Vec::new();
        let mut fetched = 0usize;
        for child in children.iter().take(self.opts.max_child_sitemaps) {
            let child_body = match self.fetch_text(child).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(%child, error = %e, "child sitemap failed");
                    continue;
                }
            };
            match parse_sitemap(&child_body) {
                Some(SitemapDocument::UrlSet(child_entries)) => {
                    fetched += 1;
                    entries.extend(child_entries);
                }
                Some(SitemapDocument::Index(_)) => {
                    debug!(%child, "nested sitemap index not followed");
                }
                None => warn!(%child, "child is not a sitemap document"),
            }
        }

        if fetched == 0 {
            return Err(SeoAgentError::Network(format!(
                "{url}: none of {listed} child sitemaps could be read"
            )));
        }
        Ok(entries)
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SeoAgentError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SeoAgentError::Network(format!("{url}: HTTP {status}")));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_RESPONSE_SIZE {
                return Err(SeoAgentError::validation(format!(
                    "{url}: response too large ({len} bytes, max {MAX_RESPONSE_SIZE})"
                )));
            }
        }

        response
            .text()
            .await
            .map_err(|e| SeoAgentError::Network(format!("{url}: failed to read body: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Primary sitemap URL followed by the alternates on the same origin.
pub fn candidate_urls(competitor: &CompetitorConfig) -> Vec<String> {
    let origin = Url::parse(&competitor.sitemap_url)
        .ok()
        .and_then(|u| {
            let host = u.host_str()?.to_string();
            Some(match u.port() {
                Some(port) => format!("{}://{host}:{port}", u.scheme()),
                None => format!("{}://{host}", u.scheme()),
            })
        })
        .unwrap_or_else(|| format!("https://{}", competitor.domain.trim_end_matches('/')));

    let mut urls = vec![competitor.sitemap_url.clone()];
    for path in ALTERNATE_SITEMAP_PATHS {
        let alternate = format!("{origin}{path}");
        if !urls.contains(&alternate) {
            urls.push(alternate);
        }
    }
    urls
}

/// Pages modified within the last `months` calendar months, newest first, at most `top`.
///
/// Entries without a `lastmod` are excluded.
pub fn recent_pages(
    entries: &[SitemapEntry],
    today: NaiveDate,
    months: u32,
    top: usize,
) -> Vec<CompetitorPage> {
    let cutoff = today
        .checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN);

    // A URL listed more than once keeps its newest lastmod.
    let mut latest: HashMap<&str, NaiveDate> = HashMap::new();
    for entry in entries {
        let Some(last_modified) = entry.lastmod else {
            continue;
        };
        if last_modified < cutoff {
            continue;
        }
        latest
            .entry(entry.loc.as_str())
            .and_modify(|d| *d = (*d).max(last_modified))
            .or_insert(last_modified);
    }

    let mut pages: Vec<CompetitorPage> = latest
        .into_iter()
        .map(|(url, last_modified)| CompetitorPage {
            url: url.to_string(),
            last_modified,
        })
        .collect();

    pages.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| a.url.cmp(&b.url))
    });
    pages.truncate(top);
    pages
}
