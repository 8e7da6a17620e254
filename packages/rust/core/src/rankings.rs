//! Ranking collector: keyword performance from the search-analytics provider.
//!
//! Rankings are best-effort telemetry. Any provider failure degrades the
//! whole snapshot to "not indexed, no traffic" instead of failing the run.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use seoagent_shared::{
    KeywordRanking, KeywordState, Result, SearchConsoleConfig, SeoAgentError, position_label,
};
use seoagent_storage::StrategyRepository;

/// Aggregated performance of one query over a date range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeywordPerformance {
    pub position: f64,
    pub clicks: u64,
    pub impressions: u64,
}

/// Search-analytics provider.
#[async_trait]
pub trait SearchAnalytics: Send + Sync {
    /// Performance of `keyword` between `start` and `end` (inclusive).
    /// `Ok(None)` means the keyword has no impressions in the window.
    async fn keyword_performance(
        &self,
        keyword: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<KeywordPerformance>>;
}

// ---------------------------------------------------------------------------
// Search Console client
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    rows: Vec<QueryRow>,
}

#[derive(Debug, Deserialize)]
struct QueryRow {
    #[serde(default)]
    clicks: f64,
    #[serde(default)]
    impressions: f64,
    position: f64,
}

/// Client for the Search Console `searchAnalytics/query` endpoint.
pub struct SearchConsoleClient {
    client: Client,
    endpoint: String,
    access_token: Option<String>,
}

impl SearchConsoleClient {
    /// Build a client. A missing access token is not an error here; every
    /// query will fail instead, which the collector turns into degraded data.
    pub fn from_config(config: &SearchConsoleConfig) -> Result<Self> {
        let access_token = std::env::var(&config.access_token_env)
            .ok()
            .filter(|t| !t.is_empty());
        Self::new(config, access_token)
    }

    pub fn new(config: &SearchConsoleConfig, access_token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("seo-agent/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SeoAgentError::Network(format!("failed to build HTTP client: {e}")))?;

        let site: String = url::form_urlencoded::byte_serialize(config.site_url.as_bytes()).collect();
        let endpoint = format!(
            "{}/sites/{site}/searchAnalytics/query",
            config.base_url.trim_end_matches('/')
        );

        Ok(Self {
            client,
            endpoint,
            access_token,
        })
    }
}

#[async_trait]
impl SearchAnalytics for SearchConsoleClient {
    async fn keyword_performance(
        &self,
        keyword: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<KeywordPerformance>> {
        let token = self
            .access_token
            .as_deref()
            .ok_or_else(|| SeoAgentError::Analytics("no access token configured".into()))?;

        let body = json!({
            "startDate": start.to_string(),
            "endDate": end.to_string(),
            "dimensions": ["query"],
            "dimensionFilterGroups": [{
                "filters": [{
                    "dimension": "query",
                    "operator": "equals",
                    "expression": keyword,
                }]
            }],
            "rowLimit": 1,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SeoAgentError::Analytics(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SeoAgentError::Analytics(format!("HTTP {status}")));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| SeoAgentError::Analytics(format!("invalid response body: {e}")))?;

        Ok(parsed.rows.into_iter().next().map(|row| KeywordPerformance {
            position: row.position,
            clicks: row.clicks.max(0.0).round() as u64,
            impressions: row.impressions.max(0.0).round() as u64,
        }))
    }
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

/// Rankings collected this run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankingSnapshot {
    pub rankings: Vec<KeywordRanking>,
    /// The provider failed and every keyword was recorded as unranked.
    pub degraded: bool,
}

/// Tracked keywords in table order.
pub fn tracked_keywords(strategy: &impl StrategyRepository) -> Vec<String> {
    strategy.keywords()
}

/// Query the provider for every tracked keyword over the trailing window.
#[instrument(skip_all, fields(window_days = window_days))]
pub async fn collect_rankings(
    analytics: &dyn SearchAnalytics,
    strategy: &impl StrategyRepository,
    today: NaiveDate,
    window_days: u32,
) -> RankingSnapshot {
    let keywords = tracked_keywords(strategy);
    // Both ends are inclusive.
    let start = today
        .checked_sub_days(Days::new(u64::from(window_days.saturating_sub(1))))
        .unwrap_or(today);

    let mut rankings = Vec::with_capacity(keywords.len());
    for keyword in &keywords {
        let previous = position_label(strategy.get_keyword_state(keyword).and_then(|s| s.current));

        match analytics.keyword_performance(keyword, start, today).await {
            Ok(perf) => {
                debug!(%keyword, position = ?perf.map(|p| p.position), "keyword checked");
                rankings.push(KeywordRanking {
                    keyword: keyword.clone(),
                    position: perf.map(|p| p.position),
                    previous,
                    clicks: perf.map_or(0, |p| p.clicks),
                    impressions: perf.map_or(0, |p| p.impressions),
                });
            }
            Err(e) => {
                warn!(%keyword, error = %e, "ranking provider failed, degrading all keywords");
                return degraded_snapshot(strategy, &keywords);
            }
        }
    }

    let indexed = rankings.iter().filter(|r| r.position.is_some()).count();
    info!(tracked = rankings.len(), indexed, "rankings collected");
    RankingSnapshot {
        rankings,
        degraded: false,
    }
}

fn degraded_snapshot(strategy: &impl StrategyRepository, keywords: &[String]) -> RankingSnapshot {
    let rankings = keywords
        .iter()
        .map(|keyword| KeywordRanking {
            keyword: keyword.clone(),
            position: None,
            previous: position_label(strategy.get_keyword_state(keyword).and_then(|s| s.current)),
            clicks: 0,
            impressions: 0,
        })
        .collect();
    RankingSnapshot {
        rankings,
        degraded: true,
    }
}

/// Write a snapshot into the strategy store.
///
/// Each row becomes `previous = old current, current = new position` with
/// `last_checked = today`. A degraded snapshot only stamps `last_checked`,
/// so one provider outage does not erase ranking history.
pub fn apply_rankings(
    strategy: &mut impl StrategyRepository,
    snapshot: &RankingSnapshot,
    today: NaiveDate,
) {
    for ranking in &snapshot.rankings {
        let mut state = strategy
            .get_keyword_state(&ranking.keyword)
            .cloned()
            .unwrap_or_else(|| KeywordState::new(&ranking.keyword));

        if !snapshot.degraded {
            state.previous = state.current;
            state.current = ranking.position;
        }
        state.last_checked = Some(today);
        strategy.upsert_keyword_state(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;

    use seoagent_shared::{NOT_INDEXED, StrategyDocument};
    use seoagent_storage::StrategyStore;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FakeAnalytics {
        positions: Vec<(&'static str, Option<f64>)>,
        fail_on: Option<&'static str>,
        calls: Mutex<Vec<(String, NaiveDate, NaiveDate)>>,
    }

    #[async_trait]
    impl SearchAnalytics for FakeAnalytics {
        async fn keyword_performance(
            &self,
            keyword: &str,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<Option<KeywordPerformance>> {
            self.calls.lock().unwrap().push((keyword.to_string(), start, end));
            if self.fail_on == Some(keyword) {
                return Err(SeoAgentError::Analytics("403 Forbidden".into()));
            }
            Ok(self
                .positions
                .iter()
                .find(|(k, _)| *k == keyword)
                .and_then(|(_, p)| *p)
                .map(|position| KeywordPerformance {
                    position,
                    clicks: 4,
                    impressions: 100,
                }))
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn store() -> StrategyStore {
        let doc = StrategyDocument {
            keywords: vec![
                KeywordState {
                    keyword: "alloy wheel repair exeter".into(),
                    current: Some(8.0),
                    previous: Some(9.0),
                    last_checked: NaiveDate::from_ymd_opt(2026, 9, 16),
                },
                KeywordState::new("smart repair cost"),
            ],
            ..Default::default()
        };
        StrategyStore::from_document(doc, Path::new("s.json"), Path::new("s.md"))
    }

    #[tokio::test]
    async fn collects_and_applies() {
        let analytics = FakeAnalytics {
            positions: vec![("alloy wheel repair exeter", Some(12.0))],
            fail_on: None,
            calls: Mutex::new(vec![]),
        };
        let mut strategy = store();

        let snapshot = collect_rankings(&analytics, &strategy, today(), 28).await;
        assert!(!snapshot.degraded);
        assert_eq!(snapshot.rankings.len(), 2);
        assert_eq!(snapshot.rankings[0].previous, "Position 8");
        assert_eq!(snapshot.rankings[0].position, Some(12.0));
        assert_eq!(snapshot.rankings[1].previous, NOT_INDEXED);
        assert_eq!(snapshot.rankings[1].position, None);

        apply_rankings(&mut strategy, &snapshot, today());
        let row = strategy.get_keyword_state("alloy wheel repair exeter").unwrap();
        assert_eq!(row.current, Some(12.0));
        assert_eq!(row.previous, Some(8.0));
        assert_eq!(row.last_checked, Some(today()));
    }

    #[tokio::test]
    async fn provider_failure_degrades_every_keyword() {
        let analytics = FakeAnalytics {
            positions: vec![("alloy wheel repair exeter", Some(3.0))],
            fail_on: Some("smart repair cost"),
            calls: Mutex::new(vec![]),
        };
        let mut strategy = store();

        let snapshot = collect_rankings(&analytics, &strategy, today(), 28).await;
        assert!(snapshot.degraded);
        assert!(snapshot.rankings.iter().all(|r| r.position.is_none()));
        assert!(snapshot.rankings.iter().all(|r| r.clicks == 0 && r.impressions == 0));

        apply_rankings(&mut strategy, &snapshot, today());
        let row = strategy.get_keyword_state("alloy wheel repair exeter").unwrap();
        assert_eq!(row.current, Some(8.0));
        assert_eq!(row.last_checked, Some(today()));
    }

    #[tokio::test]
    async fn every_row_checked_exactly_once() {
        let analytics = FakeAnalytics {
            positions: vec![],
            fail_on: None,
            calls: Mutex::new(vec![]),
        };
        let mut strategy = store();
        for _ in 0..2 {
            let snapshot = collect_rankings(&analytics, &strategy, today(), 28).await;
            apply_rankings(&mut strategy, &snapshot, today());
        }

        let doc = strategy.document();
        assert_eq!(doc.keywords.len(), 2);
        assert!(doc.keywords.iter().all(|k| k.last_checked == Some(today())));
        assert_eq!(analytics.calls.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn window_spans_exactly_window_days() {
        let analytics = FakeAnalytics {
            positions: vec![],
            fail_on: None,
            calls: Mutex::new(vec![]),
        };
        collect_rankings(&analytics, &store(), today(), 28).await;

        let calls = analytics.calls.lock().unwrap();
        let (_, start, end) = calls[0].clone();
        assert_eq!(start, NaiveDate::from_ymd_opt(2026, 9, 19).unwrap());
        assert_eq!(end, today());
        assert_eq!((end - start).num_days() + 1, 28);
    }

    #[tokio::test]
    async fn search_console_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sites/sc-domain%3Aexample.co.uk/searchAnalytics/query"))
            .and(header("authorization", "Bearer token"))
            .and(body_partial_json(serde_json::json!({
                "startDate": "2026-09-18",
                "endDate": "2026-10-16",
                "rowLimit": 1,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "rows": [{"keys": ["kerb damage"], "clicks": 3.0, "impressions": 120.0, "ctr": 0.025, "position": 7.6}]
            })))
            .mount(&server)
            .await;

        let config = SearchConsoleConfig {
            site_url: "sc-domain:example.co.uk".into(),
            base_url: server.uri(),
            ..Default::default()
        };
        let client = SearchConsoleClient::new(&config, Some("token".into())).unwrap();
        let start = today().checked_sub_days(Days::new(28)).unwrap();
        let perf = client
            .keyword_performance("kerb damage", start, today())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(perf.position, 7.6);
        assert_eq!(perf.clicks, 3);
        assert_eq!(perf.impressions, 120);
    }

    #[tokio::test]
    async fn search_console_no_rows_and_no_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let config = SearchConsoleConfig {
            site_url: "https://www.example.co.uk/".into(),
            base_url: server.uri(),
            ..Default::default()
        };
        let client = SearchConsoleClient::new(&config, Some("token".into())).unwrap();
        assert_eq!(
            client
                .keyword_performance("x", today(), today())
                .await
                .unwrap(),
            None
        );

        let anonymous = SearchConsoleClient::new(&config, None).unwrap();
        assert!(matches!(
            anonymous.keyword_performance("x", today(), today()).await,
            Err(SeoAgentError::Analytics(_))
        ));
    }
}
