//! Persistence for the SEO agent.
//!
//! Two stores live here:
//! - [`Storage`]: libSQL run-record database (local file or remote Turso),
//!   append-only, one row per pipeline run.
//! - [`StrategyStore`]: the typed strategy document kept as JSON in the site
//!   repository, with a rendered markdown view for humans.

mod import;
mod migrations;
mod render;
mod strategy;

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use libsql::{Connection, Database, params};
use seoagent_shared::{
    CompetitorProfile, ContentOutcome, KeywordRanking, LinkOutcome, Recommendation, Result,
    RunId, RunMetrics, RunRecord, RunStatus, SeoAgentError, TelemetryConfig, Trigger,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

pub use import::import_legacy_markdown;
pub use render::render_markdown;
pub use strategy::{StrategyRepository, StrategyStore, keyword_key};

/// Append-only sink for run records.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persist one run record. Records are never updated afterwards.
    async fn insert_run_record(&self, record: &RunRecord) -> Result<()>;

    /// `note_for_next_run` of the most recent record that has one.
    async fn latest_run_note(&self) -> Result<Option<String>>;
}

/// Await `fut`, failing with a storage error if it outlives `timeout`.
pub async fn with_deadline<T>(
    timeout: Duration,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| SeoAgentError::Storage(format!("{what} timed out after {timeout:?}")))?
}

/// A [`RunStore`] whose every call is bounded by a deadline.
pub struct DeadlineRunStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: RunStore> DeadlineRunStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<S: RunStore> RunStore for DeadlineRunStore<S> {
    async fn insert_run_record(&self, record: &RunRecord) -> Result<()> {
        with_deadline(
            self.timeout,
            "storing run record",
            self.inner.insert_run_record(record),
        )
        .await
    }

    async fn latest_run_note(&self) -> Result<Option<String>> {
        with_deadline(
            self.timeout,
            "reading previous run note",
            self.inner.latest_run_note(),
        )
        .await
    }
}

/// Run-record database handle wrapping libSQL.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a local database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SeoAgentError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| SeoAgentError::Storage(e.to_string()))?;

        Self::from_database(db).await
    }

    /// Connect to a remote libSQL / Turso database.
    pub async fn open_remote(url: &str, auth_token: &str) -> Result<Self> {
        let db = libsql::Builder::new_remote(url.to_string(), auth_token.to_string())
            .build()
            .await
            .map_err(|e| SeoAgentError::Storage(e.to_string()))?;

        Self::from_database(db).await
    }

    /// Open the database described by the telemetry section of the config.
    ///
    /// Connecting and migrating together must finish within `timeout_secs`.
    pub async fn open_from_config(config: &TelemetryConfig, base_dir: &Path) -> Result<Self> {
        with_deadline(
            Duration::from_secs(config.timeout_secs),
            "opening run database",
            Self::open_configured(config, base_dir),
        )
        .await
    }

    async fn open_configured(config: &TelemetryConfig, base_dir: &Path) -> Result<Self> {
        if config.is_remote() {
            let token = std::env::var(&config.auth_token_env).map_err(|_| {
                SeoAgentError::config(format!(
                    "remote telemetry database requires {} to be set",
                    config.auth_token_env
                ))
            })?;
            info!(url = %config.database, "connecting to remote run database");
            Self::open_remote(&config.database, &token).await
        } else {
            let path = base_dir.join(&config.database);
            debug!(path = %path.display(), "opening local run database");
            Self::open(&path).await
        }
    }

    async fn from_database(db: Database) -> Result<Self> {
        let conn = db
            .connect()
            .map_err(|e| SeoAgentError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        SeoAgentError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Run records
    // -----------------------------------------------------------------------

    /// Insert one run record.
    pub async fn insert_run_record(&self, record: &RunRecord) -> Result<()> {
        let content_json = match &record.content {
            Some(c) => Some(to_json(c)?),
            None => None,
        };

        self.conn
            .execute(
                "INSERT INTO run_records (
                    id, created_at, trigger_kind, status, duration_ms, error_message,
                    failed_stage, rankings_json, content_json, linking_json, competitors_json,
                    recommendations_json, metrics_json, summary, note_for_next_run
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    record.id.to_string(),
                    record
                        .created_at
                        .to_rfc3339_opts(SecondsFormat::Micros, true),
                    record.trigger.as_str(),
                    record.status.as_str(),
                    record.duration_ms as i64,
                    record.error_message.clone(),
                    record.failed_stage.clone(),
                    to_json(&record.rankings)?,
                    content_json,
                    to_json(&record.linking)?,
                    to_json(&record.competitors)?,
                    to_json(&record.recommendations)?,
                    to_json(&record.metrics)?,
                    record.summary.as_str(),
                    record.note_for_next_run.clone(),
                ],
            )
            .await
            .map_err(|e| SeoAgentError::Storage(e.to_string()))?;

        info!(run_id = %record.id, status = record.status.as_str(), "run record stored");
        Ok(())
    }

    /// Most recent `note_for_next_run`, if any run left one.
    pub async fn latest_run_note(&self) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT note_for_next_run FROM run_records
                 WHERE note_for_next_run IS NOT NULL AND note_for_next_run != ''
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                params![],
            )
            .await
            .map_err(|e| SeoAgentError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<String>(0).ok()),
            Ok(None) => Ok(None),
            Err(e) => Err(SeoAgentError::Storage(e.to_string())),
        }
    }

    /// Most recent run records, newest first.
    pub async fn list_runs(&self, limit: u32) -> Result<Vec<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, created_at, trigger_kind, status, duration_ms, error_message,
                        failed_stage, rankings_json, content_json, linking_json, competitors_json,
                        recommendations_json, metrics_json, summary, note_for_next_run
                 FROM run_records ORDER BY created_at DESC, id DESC LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(|e| SeoAgentError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_run_record(&row)?);
        }
        Ok(results)
    }
}

#[async_trait]
impl RunStore for Storage {
    async fn insert_run_record(&self, record: &RunRecord) -> Result<()> {
        Storage::insert_run_record(self, record).await
    }

    async fn latest_run_note(&self) -> Result<Option<String>> {
        Storage::latest_run_note(self).await
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| SeoAgentError::Storage(e.to_string()))
}

fn from_json<T: DeserializeOwned>(column: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| SeoAgentError::Storage(format!("invalid {column}: {e}")))
}

fn get_string(row: &libsql::Row, idx: i32) -> Result<String> {
    row.get::<String>(idx)
        .map_err(|e| SeoAgentError::Storage(e.to_string()))
}

/// Convert a database row to a [`RunRecord`].
fn row_to_run_record(row: &libsql::Row) -> Result<RunRecord> {
    let id = get_string(row, 0)?;
    let id = uuid::Uuid::parse_str(&id)
        .map(RunId)
        .map_err(|e| SeoAgentError::Storage(format!("invalid run id: {e}")))?;

    let created_at = {
        let s = get_string(row, 1)?;
        chrono::DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .map_err(|e| SeoAgentError::Storage(format!("invalid date: {e}")))?
    };

    let trigger = match get_string(row, 2)?.as_str() {
        "scheduled" => Trigger::Scheduled,
        _ => Trigger::Manual,
    };
    let status = match get_string(row, 3)?.as_str() {
        "success" => RunStatus::Success,
        _ => RunStatus::Error,
    };

    let content: Option<ContentOutcome> = match row.get::<String>(8).ok() {
        Some(raw) => Some(from_json("content_json", &raw)?),
        None => None,
    };
    let rankings: Vec<KeywordRanking> = from_json("rankings_json", &get_string(row, 7)?)?;
    let linking: Vec<LinkOutcome> = from_json("linking_json", &get_string(row, 9)?)?;
    let competitors: Vec<CompetitorProfile> =
        from_json("competitors_json", &get_string(row, 10)?)?;
    let recommendations: Vec<Recommendation> =
        from_json("recommendations_json", &get_string(row, 11)?)?;
    let metrics: RunMetrics = from_json("metrics_json", &get_string(row, 12)?)?;

    Ok(RunRecord {
        id,
        created_at,
        trigger,
        status,
        duration_ms: row.get::<i64>(4).map(|v| v.max(0) as u64).unwrap_or(0),
        error_message: row.get::<String>(5).ok(),
        failed_stage: row.get::<String>(6).ok(),
        rankings,
        content,
        linking,
        competitors,
        recommendations,
        metrics,
        summary: get_string(row, 13)?,
        note_for_next_run: row.get::<String>(14).ok(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("seoagent_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn record(note: Option<&str>, minutes_ago: i64) -> RunRecord {
        RunRecord {
            id: RunId::new(),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
            trigger: Trigger::Scheduled,
            status: RunStatus::Success,
            duration_ms: 4200,
            error_message: None,
            failed_stage: None,
            rankings: vec![KeywordRanking {
                keyword: "alloy wheel repair exeter".into(),
                position: Some(8.0),
                previous: "Position 9".into(),
                clicks: 4,
                impressions: 210,
            }],
            content: Some(ContentOutcome::NoAction),
            linking: vec![],
            competitors: vec![],
            recommendations: vec![],
            metrics: RunMetrics {
                avg_position: Some(8.0),
                total_clicks: 4,
                total_impressions: 210,
                keywords_tracked: 1,
                keywords_indexed: 1,
            },
            summary: "Rankings checked.".into(),
            note_for_next_run: note.map(str::to_string),
        }
    }

    struct Stalled;

    #[async_trait]
    impl RunStore for Stalled {
        async fn insert_run_record(&self, _record: &RunRecord) -> Result<()> {
            std::future::pending().await
        }

        async fn latest_run_note(&self) -> Result<Option<String>> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn stalled_store_times_out() {
        let store = DeadlineRunStore::new(Stalled, std::time::Duration::from_millis(50));

        let err = store.latest_run_note().await.unwrap_err();
        assert!(matches!(err, SeoAgentError::Storage(_)));
        assert!(err.to_string().contains("timed out"));
        assert!(store.insert_run_record(&record(None, 0)).await.is_err());
    }

    #[tokio::test]
    async fn deadline_store_passes_through() {
        let store = DeadlineRunStore::new(test_storage().await, std::time::Duration::from_secs(5));
        store.insert_run_record(&record(Some("keep going"), 0)).await.unwrap();
        assert_eq!(store.latest_run_note().await.unwrap().as_deref(), Some("keep going"));
    }

    #[tokio::test]
    async fn open_from_config_uses_base_dir() {
        let base = std::env::temp_dir().join(format!("seoagent_test_{}", Uuid::now_v7()));
        let config = TelemetryConfig {
            database: "runs.db".into(),
            ..Default::default()
        };
        let storage = Storage::open_from_config(&config, &base).await.unwrap();
        assert_eq!(storage.get_schema_version().await, 1);
        assert!(base.join("runs.db").exists());
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("seoagent_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.unwrap();
        drop(s1);
        let s2 = Storage::open(&tmp).await.unwrap();
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn insert_and_list_roundtrip() {
        let storage = test_storage().await;
        let rec = record(Some("Watch the smart repair keyword."), 0);
        storage.insert_run_record(&rec).await.expect("insert");

        let runs = storage.list_runs(10).await.expect("list");
        assert_eq!(runs.len(), 1);
        let got = &runs[0];
        assert_eq!(got.id, rec.id);
        assert_eq!(got.rankings, rec.rankings);
        assert_eq!(got.content, Some(ContentOutcome::NoAction));
        assert_eq!(got.metrics, rec.metrics);
        assert_eq!(got.note_for_next_run, rec.note_for_next_run);
        assert!(got.error_message.is_none());
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let storage = test_storage().await;
        let rec = record(None, 0);
        storage.insert_run_record(&rec).await.unwrap();
        assert!(storage.insert_run_record(&rec).await.is_err());
    }

    #[tokio::test]
    async fn latest_note_skips_runs_without_one() {
        let storage = test_storage().await;
        assert_eq!(storage.latest_run_note().await.unwrap(), None);

        storage
            .insert_run_record(&record(Some("older note"), 60))
            .await
            .unwrap();
        storage
            .insert_run_record(&record(Some("newer note"), 30))
            .await
            .unwrap();
        storage.insert_run_record(&record(None, 0)).await.unwrap();

        assert_eq!(
            storage.latest_run_note().await.unwrap().as_deref(),
            Some("newer note")
        );
    }

    #[tokio::test]
    async fn list_runs_newest_first_with_limit() {
        let storage = test_storage().await;
        for minutes in [30, 10, 20] {
            storage
                .insert_run_record(&record(None, minutes))
                .await
                .unwrap();
        }
        let runs = storage.list_runs(2).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs[0].created_at > runs[1].created_at);
    }

    #[tokio::test]
    async fn error_record_keeps_failure_details() {
        let storage = test_storage().await;
        let mut rec = record(None, 0);
        rec.status = RunStatus::Error;
        rec.content = None;
        rec.error_message = Some("generation failed: HTTP 502".into());
        rec.failed_stage = Some("content".into());
        storage.insert_run_record(&rec).await.unwrap();

        let got = storage.list_runs(1).await.unwrap().remove(0);
        assert_eq!(got.status, RunStatus::Error);
        assert_eq!(got.failed_stage.as_deref(), Some("content"));
        assert!(got.content.is_none());
    }
}
