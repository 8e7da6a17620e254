//! Core domain types for the content-operations pipeline.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Label used when a keyword has no indexed position.
pub const NOT_INDEXED: &str = "not indexed yet";

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

static POSITION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)").expect("position regex"));

/// Extract a numeric position from a human-readable snapshot such as
/// `"Position 8"`, `"#12"` or `"~15.4"`. Anything without a number
/// (`"not indexed"`, `"—"`) yields `None`.
pub fn parse_position(snapshot: &str) -> Option<f64> {
    POSITION_RE
        .captures(snapshot)
        .and_then(|c| c[1].parse::<f64>().ok())
        .filter(|p| *p > 0.0)
}

/// Format a position with at most one decimal (`8`, `12.4`).
pub fn format_position(position: f64) -> String {
    let rounded = (position * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{rounded:.0}")
    } else {
        format!("{rounded:.1}")
    }
}

/// Human-readable snapshot for a position: `"Position 8"` or `"not indexed yet"`.
pub fn position_label(position: Option<f64>) -> String {
    match position {
        Some(p) => format!("Position {}", format_position(p)),
        None => NOT_INDEXED.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Rankings
// ---------------------------------------------------------------------------

/// Search performance of one tracked keyword over the trailing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRanking {
    /// The tracked keyword (unique key).
    pub keyword: String,
    /// Average position this run, `None` when not indexed or degraded.
    pub position: Option<f64>,
    /// Snapshot of the previously recorded position (`"Position 8"`, `"not indexed yet"`).
    pub previous: String,
    pub clicks: u64,
    pub impressions: u64,
}

impl KeywordRanking {
    /// Numeric value of the previous snapshot, if it was ranked.
    pub fn previous_position(&self) -> Option<f64> {
        parse_position(&self.previous)
    }

    /// Position change versus the previous snapshot (positive = worse).
    pub fn delta(&self) -> Option<f64> {
        Some(self.position? - self.previous_position()?)
    }
}

// ---------------------------------------------------------------------------
// Strategy document
// ---------------------------------------------------------------------------

/// Durable ranking state of one keyword in the strategy store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordState {
    pub keyword: String,
    #[serde(default)]
    pub current: Option<f64>,
    #[serde(default)]
    pub previous: Option<f64>,
    #[serde(default)]
    pub last_checked: Option<NaiveDate>,
}

impl KeywordState {
    /// A freshly tracked keyword with no history.
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            current: None,
            previous: None,
            last_checked: None,
        }
    }
}

/// A planned-but-unwritten topic in the strategy backlog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacklogTopic {
    pub keyword: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Slug of the asset written for this topic, once done.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_slug: Option<String>,
}

/// One dated entry in the append-only session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub date: NaiveDate,
    pub summary: String,
}

/// The single mutable strategy document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyDocument {
    /// Free-form business context, rendered above the tables.
    #[serde(default)]
    pub context: String,
    /// Keyword tracking table, exactly one row per keyword.
    #[serde(default)]
    pub keywords: Vec<KeywordState>,
    /// Prioritised backlog of topics to write.
    #[serde(default)]
    pub backlog: Vec<BacklogTopic>,
    /// Append-only session log.
    #[serde(default)]
    pub session_log: Vec<SessionEntry>,
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

/// Topical category of a content asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pillar {
    AlloyWheels,
    SmartRepair,
    General,
}

impl Pillar {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlloyWheels => "alloy-wheels",
            Self::SmartRepair => "smart-repair",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for Pillar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the content stage did this run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ContentOutcome {
    Created {
        slug: String,
        title: String,
        keyword: String,
        path: String,
        word_count: usize,
        within_length: bool,
    },
    Refreshed {
        slug: String,
        title: String,
        reason: String,
        path: String,
        word_count: usize,
        within_length: bool,
    },
    /// The generative service returned unusable output.
    Rejected { topic: String, reason: String },
    /// No refresh due, backlog empty, and no topic suggested.
    NoAction,
    /// Stage disabled for this run.
    Skipped,
}

impl ContentOutcome {
    /// Path of the written asset, if one was written.
    pub fn written_path(&self) -> Option<&str> {
        match self {
            Self::Created { path, .. } | Self::Refreshed { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Result of the linking engine for one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkOutcome {
    pub slug: String,
    pub links_before: usize,
    pub links_after: usize,
    pub links_added: usize,
}

// ---------------------------------------------------------------------------
// Competitors
// ---------------------------------------------------------------------------

/// A recently modified page discovered in a competitor sitemap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorPage {
    pub url: String,
    pub last_modified: NaiveDate,
}

/// Whether a competitor's sitemap could be read this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompetitorStatus {
    Ok,
    Error { reason: String },
}

/// Competitor snapshot collected this run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorProfile {
    pub name: String,
    pub domain: String,
    pub sitemap_url: String,
    #[serde(flatten)]
    pub status: CompetitorStatus,
    /// URLs found across all fetched sitemaps, before the recency filter.
    pub total_urls: usize,
    /// Most recently modified pages, newest first.
    pub recent_pages: Vec<CompetitorPage>,
}

// ---------------------------------------------------------------------------
// Recommendations
// ---------------------------------------------------------------------------

/// Recommendation priority; declaration order is sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub category: String,
    pub title: String,
    pub description: String,
}

// ---------------------------------------------------------------------------
// Run records
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Scheduled,
    Manual,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// Aggregate ranking metrics of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Mean position over indexed keywords only.
    pub avg_position: Option<f64>,
    pub total_clicks: u64,
    pub total_impressions: u64,
    pub keywords_tracked: usize,
    pub keywords_indexed: usize,
}

/// One immutable row per pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub created_at: DateTime<Utc>,
    pub trigger: Trigger,
    pub status: RunStatus,
    pub duration_ms: u64,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Stage that failed, when `status` is `error`.
    #[serde(default)]
    pub failed_stage: Option<String>,
    pub rankings: Vec<KeywordRanking>,
    #[serde(default)]
    pub content: Option<ContentOutcome>,
    pub linking: Vec<LinkOutcome>,
    pub competitors: Vec<CompetitorProfile>,
    pub recommendations: Vec<Recommendation>,
    pub metrics: RunMetrics,
    pub summary: String,
    #[serde(default)]
    pub note_for_next_run: Option<String>,
}
