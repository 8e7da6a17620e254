//! Shared types, error model, and configuration for seo-agent.
//!
//! This crate is the foundation depended on by all other seo-agent crates.
//! It provides:
//! - [`SeoAgentError`] — the unified error type
//! - Domain types ([`KeywordRanking`], [`StrategyDocument`], [`RunRecord`], ...)
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CompetitorConfig, CompetitorScanConfig, ContentConfig, EmailConfig, ImagePool,
    OpenRouterConfig, PublishConfig, SearchConsoleConfig, SiteConfig, TelemetryConfig,
    config_dir, init_config, load_config, load_config_from, resolve_config_path,
    validate_api_key,
};
pub use error::{Result, SeoAgentError};
pub use types::{
    BacklogTopic, CompetitorPage, CompetitorProfile, CompetitorStatus, ContentOutcome,
    KeywordRanking, KeywordState, LinkOutcome, NOT_INDEXED, Pillar, Priority, Recommendation, RunId,
    RunMetrics, RunRecord, RunStatus, SessionEntry, StrategyDocument, Trigger, format_position,
    parse_position, position_label,
};
