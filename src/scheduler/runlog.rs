//! Fail-open run logging.
//!
//! The logger records one [`RunRecord`](super::history::RunRecord) per job
//! invocation. Every store interaction is wrapped: a logging outage is
//! reported through `tracing` and never reaches the job's control flow.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use super::history::{RunCompletion, RunStatus, RunStore, Summary};
use crate::clock::Clock;

/// Handle returned by [`RunLogger::start`].
///
/// `log_id` is `None` when the running record could not be written; later
/// calls with such a handle do nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct RunHandle {
    pub log_id: Option<String>,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct RunLogger {
    store: Arc<dyn RunStore>,
    clock: Arc<dyn Clock>,
}

impl RunLogger {
    pub fn new(store: Arc<dyn RunStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Write a `running` record for `job_name`.
    pub async fn start(&self, job_name: &str) -> RunHandle {
        let started_at = self.clock.now();
        let id = Uuid::new_v4().to_string();

        let log_id = match self.store.insert_running(&id, job_name, started_at).await {
            Ok(()) => {
                debug!(job = %job_name, run_id = %id, "run started");
                Some(id)
            }
            Err(e) => {
                warn!(job = %job_name, error = %e, "failed to record run start; continuing unlogged");
                None
            }
        };

        RunHandle {
            log_id,
            job_name: job_name.to_string(),
            started_at,
        }
    }

    /// Mark the run successful with the job's summary.
    pub async fn complete(&self, handle: &RunHandle, summary: Summary) {
        self.finish(handle, RunStatus::Success, Some(summary), None)
            .await;
    }

    /// Mark the run failed.
    pub async fn failed(&self, handle: &RunHandle, error_message: &str) {
        self.finish(
            handle,
            RunStatus::Failed,
            None,
            Some(error_message.to_string()),
        )
        .await;
    }

    async fn finish(
        &self,
        handle: &RunHandle,
        status: RunStatus,
        summary: Option<Summary>,
        error_message: Option<String>,
    ) {
        let Some(id) = handle.log_id.as_deref() else {
            return;
        };

        let completed_at = self.clock.now();
        let duration_ms = (completed_at - handle.started_at).num_milliseconds();
        let completion = RunCompletion {
            status,
            completed_at,
            duration_ms,
            summary,
            error_message,
        };

        match self.store.finish(id, completion).await {
            Ok(true) => {
                debug!(job = %handle.job_name, run_id = %id, %status, duration_ms, "run finished")
            }
            Ok(false) => {
                warn!(job = %handle.job_name, run_id = %id, %status, "run already terminal or missing; not updated")
            }
            Err(e) => {
                warn!(job = %handle.job_name, run_id = %id, %status, error = %e, "failed to record run outcome")
            }
        }
    }
}
