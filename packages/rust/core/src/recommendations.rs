//! Recommendation engine: advisory next steps from one generative call.
//!
//! Recommendations never fail a run. Transport errors and malformed replies
//! both yield an empty list.

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use seoagent_content::ContentAsset;
use seoagent_shared::{
    CompetitorProfile, CompetitorStatus, KeywordRanking, Priority, Recommendation, position_label,
};

use crate::generative::{GenerationRequest, TextGenerator, extract_json};

/// File stems that mark an app-router page.
const PAGE_FILES: [&str; 6] = ["page.tsx", "page.mdx", "page.jsx", "page.ts", "page.js", "page.md"];

/// Route groups `(group)`, private folders `_x`, hidden folders and API
/// handlers are not public pages.
fn is_internal_segment(name: &str) -> bool {
    name.starts_with('(') || name.starts_with('_') || name.starts_with('.') || name == "api"
}

/// List public page routes under an app-router `pages_dir`, sorted.
///
/// A missing directory yields an empty list. Route groups and private
/// folders are skipped entirely.
pub fn scan_site_pages(pages_dir: &Path) -> Vec<String> {
    let mut routes = Vec::new();
    walk(pages_dir, pages_dir, &mut routes);
    routes.sort();
    routes.dedup();
    routes
}

fn walk(root: &Path, dir: &Path, routes: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if path.is_dir() {
            if !is_internal_segment(&name) {
                walk(root, &path, routes);
            }
        } else if PAGE_FILES.contains(&name.as_str()) {
            let route = dir
                .strip_prefix(root)
                .map(|rel| {
                    rel.components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join("/")
                })
                .unwrap_or_default();
            routes.push(format!("/{route}"));
        }
    }
}

/// Everything the engine summarises for the model.
pub struct RecommendationInput<'a> {
    pub site_name: &'a str,
    pub strategy_markdown: &'a str,
    pub rankings: &'a [KeywordRanking],
    pub inventory: &'a [ContentAsset],
    pub site_pages: &'a [String],
    pub competitors: &'a [CompetitorProfile],
}

/// Ask for prioritised recommendations. Never fails.
#[instrument(skip_all, fields(pages = input.site_pages.len()))]
pub async fn recommend(
    input: &RecommendationInput<'_>,
    generator: &dyn TextGenerator,
) -> Vec<Recommendation> {
    let request = recommendation_request(input);
    let reply = match generator.complete(&request).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "recommendation request failed");
            return Vec::new();
        }
    };

    let recommendations = parse_recommendations(&reply);
    info!(count = recommendations.len(), "recommendations ready");
    recommendations
}

fn recommendation_request(input: &RecommendationInput<'_>) -> GenerationRequest {
    let rankings = input
        .rankings
        .iter()
        .map(|r| {
            format!(
                "- {}: {} (previously {}), {} clicks, {} impressions",
                r.keyword,
                position_label(r.position),
                r.previous,
                r.clicks,
                r.impressions
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let titles = input
        .inventory
        .iter()
        .map(|a| format!("- {}", a.title()))
        .collect::<Vec<_>>()
        .join("\n");
    let competitors = input
        .competitors
        .iter()
        .map(|c| match &c.status {
            CompetitorStatus::Ok => format!(
                "- {} ({}): {} recently updated pages",
                c.name,
                c.domain,
                c.recent_pages.len()
            ),
            CompetitorStatus::Error { .. } => format!("- {} ({}): unavailable", c.name, c.domain),
        })
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        "Business: {site}\n\n\
         SEO strategy:\n\n{strategy}\n\n\
         Keyword rankings this month:\n{rankings}\n\n\
         Published articles:\n{titles}\n\n\
         Site pages:\n{pages}\n\n\
         Competitor activity:\n{competitors}\n\n\
         Give 3 to 6 prioritised, concrete SEO recommendations. Respond with a JSON array \
         only. Each element: {{\"priority\": \"high\"|\"medium\"|\"low\", \"category\": \"...\", \
         \"title\": \"...\", \"description\": \"...\"}}.",
        site = input.site_name,
        strategy = input.strategy_markdown,
        rankings = or_none(rankings),
        titles = or_none(titles),
        pages = or_none(input.site_pages.join("\n")),
        competitors = or_none(competitors),
    );

    GenerationRequest::new(
        "recommendations",
        "You are a senior SEO consultant. You answer with a strict JSON array and nothing else.",
        prompt,
    )
    .max_tokens(1500)
}

fn or_none(text: String) -> String {
    if text.is_empty() { "(none)".into() } else { text }
}

#[derive(Debug, Deserialize)]
struct RawRecommendation {
    priority: String,
    #[serde(default)]
    category: String,
    title: String,
    #[serde(default)]
    description: String,
}

/// Parse a JSON array reply, sorted high to low. Unusable replies yield
/// an empty list; entries with an unknown priority are dropped.
pub fn parse_recommendations(reply: &str) -> Vec<Recommendation> {
    let Some(json) = extract_json(reply) else {
        warn!("recommendation reply contained no JSON");
        return Vec::new();
    };
    let raw: Vec<RawRecommendation> = match serde_json::from_str(json) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "recommendation reply was not a JSON array");
            return Vec::new();
        }
    };

    let mut recommendations: Vec<Recommendation> = raw
        .into_iter()
        .filter_map(|r| {
            let priority = match r.priority.trim().to_lowercase().as_str() {
                "high" => Priority::High,
                "medium" => Priority::Medium,
                "low" => Priority::Low,
                other => {
                    debug!(priority = other, "dropping recommendation with unknown priority");
                    return None;
                }
            };
            Some(Recommendation {
                priority,
                category: r.category,
                title: r.title,
                description: r.description,
            })
        })
        .collect();
    recommendations.sort_by_key(|r| r.priority);
    recommendations
}
