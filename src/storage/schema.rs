//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS job_runs (
            id TEXT PRIMARY KEY,
            job_name TEXT NOT NULL,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            duration_ms INTEGER,
            status TEXT NOT NULL,
            summary TEXT,
            error_message TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_job_runs_started ON job_runs(started_at);
        CREATE INDEX IF NOT EXISTS idx_job_runs_job_name ON job_runs(job_name);

        CREATE TABLE IF NOT EXISTS scheduled_keys (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_scheduled_keys_expires ON scheduled_keys(expires_at);

        CREATE TABLE IF NOT EXISTS scheduled_set_members (
            set_key TEXT NOT NULL,
            member TEXT NOT NULL,
            PRIMARY KEY (set_key, member)
        );",
    )?;

    Ok(())
}
