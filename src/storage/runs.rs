//! SQLite-backed [`RunStore`].

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::params;

use super::Pool;
use crate::scheduler::history::{
    format_timestamp, parse_timestamp, RunCompletion, RunRecord, RunStatus, RunStore, Summary,
};

#[derive(Clone)]
pub struct SqliteRunStore {
    pool: Pool,
}

impl SqliteRunStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRecord> {
        let started_at: String = row.get(2)?;
        let completed_at: Option<String> = row.get(3)?;
        let status: String = row.get(5)?;
        let summary: Option<String> = row.get(6)?;
        let created_at: String = row.get(8)?;

        let started_at = parse_timestamp(&started_at).unwrap_or_default();

        Ok(RunRecord {
            id: row.get(0)?,
            job_name: row.get(1)?,
            started_at,
            completed_at: completed_at.as_deref().and_then(parse_timestamp),
            duration_ms: row.get(4)?,
            // Unknown statuses from a newer writer are treated as still running.
            status: RunStatus::parse(&status).unwrap_or(RunStatus::Running),
            summary: summary.and_then(|s| serde_json::from_str::<Summary>(&s).ok()),
            error_message: row.get(7)?,
            created_at: parse_timestamp(&created_at).unwrap_or(started_at),
        })
    }
}

#[async_trait::async_trait]
impl RunStore for SqliteRunStore {
    async fn insert_running(
        &self,
        id: &str,
        job_name: &str,
        started_at: DateTime<Utc>,
    ) -> Result<()> {
        let pool = self.pool.clone();
        let id = id.to_string();
        let job_name = job_name.to_string();
        let started = format_timestamp(&started_at);

        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = pool.get()?;
            conn.execute(
                "INSERT INTO job_runs (id, job_name, started_at, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, job_name, started, RunStatus::Running.as_str(), started],
            )
            .context("Failed to insert job run")?;
            Ok(())
        })
        .await?
    }

    async fn finish(&self, id: &str, completion: RunCompletion) -> Result<bool> {
        let summary = completion
            .summary
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let pool = self.pool.clone();
        let id = id.to_string();

        tokio::task::spawn_blocking(move || -> Result<bool> {
            let conn = pool.get()?;
            let changed = conn
                .execute(
                    "UPDATE job_runs
                     SET status = ?1, completed_at = ?2, duration_ms = ?3, summary = ?4, error_message = ?5
                     WHERE id = ?6 AND status = ?7",
                    params![
                        completion.status.as_str(),
                        format_timestamp(&completion.completed_at),
                        completion.duration_ms,
                        summary,
                        completion.error_message,
                        id,
                        RunStatus::Running.as_str(),
                    ],
                )
                .context("Failed to finish job run")?;
            Ok(changed > 0)
        })
        .await?
    }

    async fn recent(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let pool = self.pool.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<RunRecord>> {
            let conn = pool.get()?;
            let mut stmt = conn.prepare(
                "SELECT id, job_name, started_at, completed_at, duration_ms, status, summary, error_message, created_at
                 FROM job_runs ORDER BY started_at DESC, rowid DESC LIMIT ?1",
            )?;

            let rows = stmt.query_map(params![limit as i64], Self::row_to_record)?;

            let mut records = Vec::new();
            for r in rows {
                records.push(r?);
            }
            Ok(records)
        })
        .await?
    }
}
