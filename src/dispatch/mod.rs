//! Dual-path job dispatch.
//!
//! Each invocation runs the same sequence:
//!
//! 1. verify the caller's bearer credential (fail closed),
//! 2. honour the job's kill switch,
//! 3. open a run record,
//! 4. hand the job's event to the durable bus,
//! 5. if the hand-off fails for any reason, run the job inline instead,
//! 6. close the run record as success or failure.
//!
//! Exactly one full attempt happens per invocation that gets past steps 1
//! and 2. Nothing here makes a job idempotent or mutually exclusive; jobs
//! that need that guarantee provide it themselves.

pub mod bus;
pub mod job;
pub mod killswitch;
pub mod path;

pub use self::bus::{BusError, EventBus, HttpEventBus};
pub use self::job::Job;
pub use self::killswitch::{ConfiguredKillSwitches, KillSwitch};
pub use self::path::{DurableHandoff, ExecutionPath, InlineExecution, PathOutcome};

use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::auth::CronAuth;
use crate::scheduler::{RunLogger, Summary};

/// Keys the dispatcher owns in a response body. A job summary never
/// overrides them.
pub const RESERVED_KEYS: [&str; 3] = ["ok", "dispatched", "skipped"];

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Execution(String),
}

/// Successful result of one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Skipped { reason: String },
    Dispatched,
    Completed(Summary),
}

impl DispatchOutcome {
    /// JSON response body for the trigger endpoint.
    pub fn to_body(&self) -> Value {
        match self {
            DispatchOutcome::Skipped { reason } => {
                json!({ "ok": true, "skipped": true, "reason": reason })
            }
            DispatchOutcome::Dispatched => json!({ "ok": true, "dispatched": true }),
            DispatchOutcome::Completed(summary) => {
                let mut body = Summary::new();
                body.insert("ok".into(), Value::Bool(true));
                for (k, v) in summary {
                    if !RESERVED_KEYS.contains(&k.as_str()) {
                        body.insert(k.clone(), v.clone());
                    }
                }
                Value::Object(body)
            }
        }
    }
}

pub struct Dispatcher {
    auth: CronAuth,
    kill_switches: Arc<dyn KillSwitch>,
    logger: RunLogger,
    primary: Box<dyn ExecutionPath>,
    fallback: Box<dyn ExecutionPath>,
}

impl Dispatcher {
    /// Durable hand-off through `bus`, with inline execution as the fallback.
    pub fn new(
        auth: CronAuth,
        kill_switches: Arc<dyn KillSwitch>,
        logger: RunLogger,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self::with_paths(
            auth,
            kill_switches,
            logger,
            Box::new(DurableHandoff::new(bus)),
            Box::new(InlineExecution),
        )
    }

    pub fn with_paths(
        auth: CronAuth,
        kill_switches: Arc<dyn KillSwitch>,
        logger: RunLogger,
        primary: Box<dyn ExecutionPath>,
        fallback: Box<dyn ExecutionPath>,
    ) -> Self {
        Self {
            auth,
            kill_switches,
            logger,
            primary,
            fallback,
        }
    }

    pub fn is_authorized(&self, credential: Option<&str>) -> bool {
        self.auth.verify(credential)
    }

    pub async fn dispatch(
        &self,
        job: &dyn Job,
        credential: Option<&str>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let job_name = job.name();

        if !self.is_authorized(credential) {
            warn!(job = %job_name, configured = self.auth.is_configured(), "rejected job trigger");
            return Err(DispatchError::Unauthorized);
        }

        if let Some(reason) = self.kill_switches.engaged(job_name) {
            info!(job = %job_name, %reason, "job skipped by kill switch");
            return Ok(DispatchOutcome::Skipped { reason });
        }

        let handle = self.logger.start(job_name).await;

        let attempt = match self.primary.execute(job).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(
                    job = %job_name,
                    path = self.primary.name(),
                    error = %e,
                    "primary dispatch failed; falling back to {}",
                    self.fallback.name()
                );
                self.fallback.execute(job).await
            }
        };

        match attempt {
            Ok(PathOutcome::HandedOff) => {
                let mut summary = Summary::new();
                summary.insert("dispatched".into(), Value::Bool(true));
                self.logger.complete(&handle, summary).await;
                info!(job = %job_name, "job handed off to event bus");
                Ok(DispatchOutcome::Dispatched)
            }
            Ok(PathOutcome::Completed(summary)) => {
                self.logger.complete(&handle, summary.clone()).await;
                info!(job = %job_name, "job completed inline");
                Ok(DispatchOutcome::Completed(summary))
            }
            Err(e) => {
                let message = format!("{e:#}");
                self.logger.failed(&handle, &message).await;
                error!(job = %job_name, error = %message, "job execution failed");
                Err(DispatchError::Execution(message))
            }
        }
    }
}
