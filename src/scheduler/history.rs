//! Execution history: one [`RunRecord`] per job invocation.

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Opaque key/value summary a job reports on completion.
pub type Summary = serde_json::Map<String, serde_json::Value>;

/// Lifecycle state of a run record.
///
/// `Timeout` is part of the persisted vocabulary, but nothing in this crate
/// writes it. A run killed by the host stays `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
    Timeout,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Timeout => "timeout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "success" => Some(RunStatus::Success),
            "failed" => Some(RunStatus::Failed),
            "timeout" => Some(RunStatus::Timeout),
            _ => None,
        }
    }

    /// Whether this status counts against a job's health.
    pub fn is_failure(&self) -> bool {
        matches!(self, RunStatus::Failed | RunStatus::Timeout)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record of one job execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub status: RunStatus,
    pub summary: Option<Summary>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The terminal write applied to a running record.
#[derive(Debug, Clone)]
pub struct RunCompletion {
    pub status: RunStatus,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub summary: Option<Summary>,
    pub error_message: Option<String>,
}

/// Persistence for run records.
///
/// Implementations must only apply a [`RunCompletion`] to a record that is
/// still `running`; later completions for the same id are ignored.
#[async_trait::async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a new record in the `running` state.
    async fn insert_running(
        &self,
        id: &str,
        job_name: &str,
        started_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Move a running record to its terminal state.
    ///
    /// Returns `false` when no running record with that id exists.
    async fn finish(&self, id: &str, completion: RunCompletion) -> Result<bool>;

    /// Most recent records first, at most `limit`.
    async fn recent(&self, limit: usize) -> Result<Vec<RunRecord>>;
}

/// Timestamp format used for every persisted time. Fixed width so that
/// lexical order matches chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_roundtrip_through_str() {
        for status in [
            RunStatus::Running,
            RunStatus::Success,
            RunStatus::Failed,
            RunStatus::Timeout,
        ] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse("exploded"), None);
    }

    #[test]
    fn test_failure_statuses() {
        assert!(RunStatus::Failed.is_failure());
        assert!(RunStatus::Timeout.is_failure());
        assert!(!RunStatus::Success.is_failure());
        assert!(!RunStatus::Running.is_failure());
        assert!(!RunStatus::Running.is_terminal());
    }

    #[test]
    fn test_timestamps_sort_lexically() {
        let a = Utc.with_ymd_and_hms(2025, 1, 9, 23, 59, 59).unwrap();
        let b = Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap();
        assert!(format_timestamp(&a) < format_timestamp(&b));
        assert_eq!(parse_timestamp(&format_timestamp(&a)), Some(a));
    }
}
