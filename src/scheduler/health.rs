//! Job health aggregation for the dashboard.
//!
//! Takes a window of run records (newest first) plus the static registry and
//! derives a per-job summary and an overall status. An isolated flaky job is
//! `degraded`; two independently failing jobs, or three failures overall, is
//! `failing`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::warn;

use super::history::{RunRecord, RunStatus, RunStore};
use super::registry::JobRegistry;
use crate::clock::Clock;

/// Number of most recent records considered.
pub const DEFAULT_RECORD_WINDOW: usize = 100;
/// Number of raw records included in the report.
pub const DEFAULT_RECENT_RUNS: usize = 20;
/// Rolling window for counting failures.
pub const DEFAULT_FAILURE_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Failing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHealth {
    pub job_name: String,
    pub label: String,
    pub schedule: String,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_status: Option<RunStatus>,
    pub last_duration_ms: Option<i64>,
    pub recent_failure_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub jobs: Vec<JobHealth>,
    pub recent_runs: Vec<RunRecord>,
    pub has_recent_failures: bool,
    pub overall: OverallStatus,
}

#[derive(Debug, Clone)]
pub struct HealthAggregator {
    registry: JobRegistry,
    record_window: usize,
    recent_runs: usize,
    failure_window: Duration,
}

impl HealthAggregator {
    pub fn new(registry: JobRegistry) -> Self {
        Self {
            registry,
            record_window: DEFAULT_RECORD_WINDOW,
            recent_runs: DEFAULT_RECENT_RUNS,
            failure_window: Duration::days(DEFAULT_FAILURE_WINDOW_DAYS),
        }
    }

    pub fn with_record_window(mut self, window: usize) -> Self {
        self.record_window = window;
        self
    }

    pub fn with_recent_runs(mut self, count: usize) -> Self {
        self.recent_runs = count;
        self
    }

    pub fn with_failure_window(mut self, window: Duration) -> Self {
        self.failure_window = window;
        self
    }

    pub fn record_window(&self) -> usize {
        self.record_window
    }

    /// Summarize `records`, which must be ordered most recent first.
    pub fn summarize(&self, records: &[RunRecord], now: DateTime<Utc>) -> HealthReport {
        let records = &records[..records.len().min(self.record_window)];
        let cutoff = now
            .checked_sub_signed(self.failure_window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut by_job: HashMap<&str, Vec<&RunRecord>> = HashMap::new();
        for record in records {
            by_job.entry(record.job_name.as_str()).or_default().push(record);
        }

        let jobs: Vec<JobHealth> = self
            .registry
            .entries()
            .iter()
            .map(|entry| {
                let group = by_job
                    .get(entry.job_name.as_str())
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let latest = group.first();
                let recent_failure_count = group
                    .iter()
                    .filter(|r| r.status.is_failure() && r.started_at >= cutoff)
                    .count();

                JobHealth {
                    job_name: entry.job_name.clone(),
                    label: entry.label.clone(),
                    schedule: entry.schedule.clone(),
                    last_run_at: latest.map(|r| r.started_at),
                    last_status: latest.map(|r| r.status),
                    last_duration_ms: latest.and_then(|r| r.duration_ms),
                    recent_failure_count,
                }
            })
            .collect();

        let total_failures: usize = jobs.iter().map(|j| j.recent_failure_count).sum();
        let failing_jobs = jobs.iter().filter(|j| j.recent_failure_count > 0).count();

        let overall = if failing_jobs >= 2 || total_failures >= 3 {
            OverallStatus::Failing
        } else if total_failures > 0 {
            OverallStatus::Degraded
        } else {
            OverallStatus::Healthy
        };

        HealthReport {
            jobs,
            recent_runs: records.iter().take(self.recent_runs).cloned().collect(),
            has_recent_failures: total_failures > 0,
            overall,
        }
    }

    /// Read the latest window from `store` and summarize it.
    ///
    /// A read failure degrades to the empty report; the dashboard always renders.
    pub async fn report(&self, store: &dyn RunStore, clock: &dyn Clock) -> HealthReport {
        let records = match store.recent(self.record_window).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "failed to read run history; reporting empty health");
                Vec::new()
            }
        };
        self.summarize(&records, clock.now())
    }
}

/// Health aggregation bound to its store and clock, as served by the API.
#[derive(Clone)]
pub struct HealthService {
    aggregator: Arc<HealthAggregator>,
    store: Arc<dyn RunStore>,
    clock: Arc<dyn Clock>,
}

impl HealthService {
    pub fn new(
        aggregator: HealthAggregator,
        store: Arc<dyn RunStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            aggregator: Arc::new(aggregator),
            store,
            clock,
        }
    }

    pub async fn report(&self) -> HealthReport {
        self.aggregator
            .report(self.store.as_ref(), self.clock.as_ref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::scheduler::registry::{self, JobRegistryEntry};
    use crate::scheduler::runlog::test_support::BrokenRunStore;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 15, 12, 0, 0).unwrap()
    }

    fn registry3() -> JobRegistry {
        JobRegistry::new(vec![
            JobRegistryEntry::new("weekly-digest", "Digest", "0 0 13 * * Mon"),
            JobRegistryEntry::new("token-refresh", "Tokens", "0 0 */6 * * *"),
            JobRegistryEntry::new("content-automation", "Content", "0 0 9 * * *"),
        ])
        .unwrap()
    }

    fn record(job: &str, status: RunStatus, hours_ago: i64) -> RunRecord {
        let started_at = now() - Duration::hours(hours_ago);
        RunRecord {
            id: format!("{job}-{hours_ago}"),
            job_name: job.to_string(),
            started_at,
            completed_at: status.is_terminal().then_some(started_at + Duration::seconds(3)),
            duration_ms: status.is_terminal().then_some(3000),
            status,
            summary: None,
            error_message: status.is_failure().then(|| "boom".to_string()),
            created_at: started_at,
        }
    }

    /// Build newest-first input from unordered records.
    fn sorted(mut records: Vec<RunRecord>) -> Vec<RunRecord> {
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        records
    }

    #[test]
    fn test_empty_input_is_healthy_with_all_jobs() {
        let agg = HealthAggregator::new(registry3());
        let report = agg.summarize(&[], now());

        assert_eq!(report.jobs.len(), 3);
        for job in &report.jobs {
            assert!(job.last_run_at.is_none());
            assert!(job.last_status.is_none());
            assert!(job.last_duration_ms.is_none());
            assert_eq!(job.recent_failure_count, 0);
        }
        assert!(report.recent_runs.is_empty());
        assert!(!report.has_recent_failures);
        assert_eq!(report.overall, OverallStatus::Healthy);
    }

    #[test]
    fn test_latest_is_first_record_of_group() {
        let agg = HealthAggregator::new(registry3());
        let records = sorted(vec![
            record("weekly-digest", RunStatus::Failed, 30),
            record("weekly-digest", RunStatus::Success, 2),
        ]);
        let report = agg.summarize(&records, now());

        let digest = &report.jobs[0];
        assert_eq!(digest.last_status, Some(RunStatus::Success));
        assert_eq!(digest.last_run_at, Some(now() - Duration::hours(2)));
        assert_eq!(digest.last_duration_ms, Some(3000));
        assert_eq!(digest.recent_failure_count, 1);
    }

    #[test]
    fn test_single_failure_is_degraded() {
        let agg = HealthAggregator::new(registry3());
        let records = vec![record("token-refresh", RunStatus::Failed, 1)];
        let report = agg.summarize(&records, now());
        assert_eq!(report.overall, OverallStatus::Degraded);
        assert!(report.has_recent_failures);
    }

    #[test]
    fn test_two_failures_in_one_job_is_degraded() {
        let agg = HealthAggregator::new(registry3());
        let records = sorted(vec![
            record("token-refresh", RunStatus::Failed, 1),
            record("token-refresh", RunStatus::Failed, 7),
        ]);
        let report = agg.summarize(&records, now());
        assert_eq!(report.overall, OverallStatus::Degraded);
    }

    #[test]
    fn test_three_failures_in_one_job_is_failing() {
        let agg = HealthAggregator::new(registry3());
        let records = sorted(vec![
            record("token-refresh", RunStatus::Failed, 1),
            record("token-refresh", RunStatus::Failed, 7),
            record("token-refresh", RunStatus::Timeout, 13),
        ]);
        let report = agg.summarize(&records, now());
        assert_eq!(report.jobs[1].recent_failure_count, 3);
        assert_eq!(report.overall, OverallStatus::Failing);
    }

    #[test]
    fn test_two_failing_jobs_is_failing() {
        let agg = HealthAggregator::new(registry3());
        let records = sorted(vec![
            record("token-refresh", RunStatus::Failed, 1),
            record("weekly-digest", RunStatus::Failed, 5),
        ]);
        let report = agg.summarize(&records, now());
        assert_eq!(report.overall, OverallStatus::Failing);
    }

    #[test]
    fn test_old_failures_fall_out_of_window() {
        let agg = HealthAggregator::new(registry3());
        let records = sorted(vec![
            record("token-refresh", RunStatus::Failed, 24 * 8),
            record("weekly-digest", RunStatus::Failed, 24 * 9),
            record("weekly-digest", RunStatus::Success, 1),
        ]);
        let report = agg.summarize(&records, now());
        assert_eq!(report.overall, OverallStatus::Healthy);
        assert!(!report.has_recent_failures);
        // The stale failure still shows as the latest run for token-refresh.
        assert_eq!(report.jobs[1].last_status, Some(RunStatus::Failed));
    }

    #[test]
    fn test_running_records_are_not_failures() {
        let agg = HealthAggregator::new(registry3());
        let records = vec![record("content-automation", RunStatus::Running, 0)];
        let report = agg.summarize(&records, now());
        assert_eq!(report.overall, OverallStatus::Healthy);
        assert_eq!(report.jobs[2].last_status, Some(RunStatus::Running));
        assert!(report.jobs[2].last_duration_ms.is_none());
    }

    #[test]
    fn test_unregistered_jobs_only_appear_in_recent_runs() {
        let agg = HealthAggregator::new(registry3());
        let records = vec![record("legacy-export", RunStatus::Failed, 1)];
        let report = agg.summarize(&records, now());
        assert_eq!(report.jobs.len(), 3);
        assert_eq!(report.recent_runs.len(), 1);
        assert_eq!(report.overall, OverallStatus::Healthy);
    }

    #[test]
    fn test_windows_are_bounded() {
        let agg = HealthAggregator::new(registry3())
            .with_record_window(10)
            .with_recent_runs(4);
        let records = sorted(
            (0..30)
                .map(|i| record("token-refresh", RunStatus::Failed, i))
                .collect(),
        );
        let report = agg.summarize(&records, now());
        assert_eq!(report.recent_runs.len(), 4);
        assert_eq!(report.jobs[1].recent_failure_count, 10);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let agg = HealthAggregator::new(registry3());
        let report = agg.summarize(&[], now());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["overall"], "healthy");
        assert_eq!(json["hasRecentFailures"], false);
        assert!(json["jobs"][0]["lastRunAt"].is_null());
        assert_eq!(json["jobs"][0]["recentFailureCount"], 0);
    }

    #[tokio::test]
    async fn test_store_failure_degrades_to_empty_report() {
        let agg = HealthAggregator::new(registry::defaults());
        let store = BrokenRunStore::default();
        let clock = ManualClock::new(now());

        let report = agg.report(&store, &clock).await;
        assert_eq!(report.jobs.len(), registry::defaults().len());
        assert!(report.jobs.iter().all(|j| j.last_run_at.is_none()));
        assert_eq!(report.overall, OverallStatus::Healthy);
    }
}
