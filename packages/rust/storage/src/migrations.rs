//! SQL migration definitions for the run-record database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as one batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: run_records",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One immutable row per pipeline run
CREATE TABLE IF NOT EXISTS run_records (
    id                   TEXT PRIMARY KEY,
    created_at           TEXT NOT NULL,
    trigger_kind         TEXT NOT NULL,
    status               TEXT NOT NULL,
    duration_ms          INTEGER NOT NULL,
    error_message        TEXT,
    failed_stage         TEXT,
    rankings_json        TEXT NOT NULL,
    content_json         TEXT,
    linking_json         TEXT NOT NULL,
    competitors_json     TEXT NOT NULL,
    recommendations_json TEXT NOT NULL,
    metrics_json         TEXT NOT NULL,
    summary              TEXT NOT NULL,
    note_for_next_run    TEXT
);

CREATE INDEX IF NOT EXISTS idx_run_records_created_at ON run_records(created_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
    ]
}
