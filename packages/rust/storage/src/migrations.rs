//! SQL migration definitions for the bookkeeping schema.
//!
//! Migrations are applied in order on database open. Spatial tables are not
//! part of the schema: they are created on demand per staging/target name.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: schema_migrations, enrichment_runs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per enrichment run against a target table
CREATE TABLE IF NOT EXISTS enrichment_runs (
    id              TEXT PRIMARY KEY,
    target_table    TEXT NOT NULL,
    staging_table   TEXT NOT NULL,
    started_at      TEXT NOT NULL,
    finished_at     TEXT,
    rows_inserted   INTEGER,
    rows_updated    INTEGER,
    rows_unchanged  INTEGER
);

CREATE INDEX IF NOT EXISTS idx_enrichment_runs_target ON enrichment_runs(target_table);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
