//! Topic/refresh selector: decides the single content action of a run.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use seoagent_content::ContentAsset;
use seoagent_shared::{ContentConfig, KeywordRanking, Result, format_position};
use seoagent_storage::{StrategyRepository, keyword_key, render_markdown};

use crate::generative::{GenerationRequest, TextGenerator, extract_json};

/// The content action chosen for this run.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Regenerate an existing asset in place.
    Refresh { asset: Box<ContentAsset>, reason: String },
    /// Write a new asset for a keyword.
    Create {
        keyword: String,
        context: String,
        /// The keyword came from the strategy backlog.
        from_backlog: bool,
    },
}

impl Decision {
    /// Short label for logs and progress output.
    pub fn describe(&self) -> String {
        match self {
            Self::Refresh { asset, reason } => format!("refresh {} ({reason})", asset.slug()),
            Self::Create { keyword, .. } => format!("create \"{keyword}\""),
        }
    }
}

/// Inputs the selector reads.
pub struct SelectorInput<'a, S: StrategyRepository> {
    pub inventory: &'a [ContentAsset],
    pub rankings: &'a [KeywordRanking],
    /// Rankings are degraded; ranking-based triggers are suspended.
    pub degraded: bool,
    pub strategy: &'a S,
    pub config: &'a ContentConfig,
    pub today: NaiveDate,
}

// ---------------------------------------------------------------------------
// Refresh triggers
// ---------------------------------------------------------------------------

/// Why `asset` should be refreshed, if it should.
///
/// Assets not older than `refresh_min_age_days` are never refreshed. Older
/// assets are refreshed when their target keyword regressed by at least
/// `regression_threshold` positions, dropped out of the index, or has never
/// ranked and the asset is older than `stale_unranked_days`.
pub fn refresh_reason(
    asset: &ContentAsset,
    ranking: Option<&KeywordRanking>,
    config: &ContentConfig,
    today: NaiveDate,
) -> Option<String> {
    let age = asset.age_days(today);
    if age <= config.refresh_min_age_days {
        return None;
    }

    let current = ranking.and_then(|r| r.position);
    let previous = ranking.and_then(|r| r.previous_position());

    match (previous, current) {
        (Some(prev), Some(now)) if now - prev >= config.regression_threshold => Some(format!(
            "position dropped from #{} to #{}",
            format_position(prev),
            format_position(now)
        )),
        (Some(prev), None) => Some(format!(
            "dropped out of the index (was #{})",
            format_position(prev)
        )),
        (None, None) if age > config.stale_unranked_days => {
            Some(format!("not ranking after {age} days"))
        }
        _ => None,
    }
}

fn ranking_for<'a>(rankings: &'a [KeywordRanking], keyword: &str) -> Option<&'a KeywordRanking> {
    let key = keyword_key(keyword);
    rankings.iter().find(|r| keyword_key(&r.keyword) == key)
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Choose this run's content action: refresh, then backlog, then a
/// generated topic. `Ok(None)` is a valid outcome.
///
/// Only transport failures of the generative service are errors; an
/// unparseable topic suggestion yields `None`.
#[instrument(skip_all, fields(assets = input.inventory.len()))]
pub async fn select<S: StrategyRepository + Sync>(
    input: &SelectorInput<'_, S>,
    generator: &dyn TextGenerator,
) -> Result<Option<Decision>> {
    if input.degraded {
        debug!("rankings degraded, skipping refresh triggers");
    } else {
        for asset in input.inventory {
            let ranking = ranking_for(input.rankings, asset.target_keyword());
            if let Some(reason) = refresh_reason(asset, ranking, input.config, input.today) {
                info!(slug = asset.slug(), %reason, "refresh selected");
                return Ok(Some(Decision::Refresh {
                    asset: Box::new(asset.clone()),
                    reason,
                }));
            }
        }
    }

    let covered: HashSet<String> = input
        .inventory
        .iter()
        .map(|a| keyword_key(a.target_keyword()))
        .collect();

    if let Some(topic) = input
        .strategy
        .open_backlog()
        .into_iter()
        .find(|t| !covered.contains(&keyword_key(&t.keyword)))
    {
        info!(keyword = %topic.keyword, "backlog topic selected");
        return Ok(Some(Decision::Create {
            keyword: topic.keyword.clone(),
            context: topic.notes.clone().unwrap_or_default(),
            from_backlog: true,
        }));
    }

    let request = topic_request(input);
    let reply = generator.complete(&request).await?;
    match parse_topic_suggestion(&reply) {
        Some(suggestion) if !covered.contains(&keyword_key(&suggestion.keyword)) => {
            info!(keyword = %suggestion.keyword, "generated topic selected");
            Ok(Some(Decision::Create {
                keyword: suggestion.keyword,
                context: suggestion.rationale,
                from_backlog: false,
            }))
        }
        Some(suggestion) => {
            warn!(keyword = %suggestion.keyword, "suggested topic already covered");
            Ok(None)
        }
        None => {
            warn!("topic suggestion was not usable");
            Ok(None)
        }
    }
}

fn topic_request<S: StrategyRepository>(input: &SelectorInput<'_, S>) -> GenerationRequest {
    let titles = input
        .inventory
        .iter()
        .map(|a| format!("- {} (keyword: {})", a.title(), a.target_keyword()))
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        "Here is our SEO strategy:\n\n{strategy}\n\n\
         Existing articles (do not duplicate these):\n{titles}\n\n\
         Suggest ONE new blog topic that targets a search keyword we are not yet covering. \
         Respond with JSON only, in the form \
         {{\"keyword\": \"...\", \"rationale\": \"...\"}}.",
        strategy = render_markdown(input.strategy.document()),
        titles = if titles.is_empty() { "(none yet)".to_string() } else { titles },
    );

    GenerationRequest::new(
        "topic",
        "You are an SEO strategist for a local business. You answer with strict JSON.",
        prompt,
    )
    .max_tokens(400)
}

/// A topic proposed by the generative service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TopicSuggestion {
    pub keyword: String,
    #[serde(default)]
    pub rationale: String,
}

/// Parse a `{"keyword", "rationale"}` reply. Blank keywords are rejected.
pub fn parse_topic_suggestion(reply: &str) -> Option<TopicSuggestion> {
    let json = extract_json(reply)?;
    let mut suggestion: TopicSuggestion = serde_json::from_str(json).ok()?;
    suggestion.keyword = suggestion.keyword.trim().to_string();
    (!suggestion.keyword.is_empty()).then_some(suggestion)
}
