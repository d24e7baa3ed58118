//! The two interchangeable ways of running a job.

use std::sync::Arc;

use anyhow::Result;

use super::bus::EventBus;
use super::job::Job;
use crate::scheduler::Summary;

#[derive(Debug, Clone, PartialEq)]
pub enum PathOutcome {
    /// Accepted by the event bus; the work happens elsewhere.
    HandedOff,
    /// Ran to completion in-process.
    Completed(Summary),
}

#[async_trait::async_trait]
pub trait ExecutionPath: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, job: &dyn Job) -> Result<PathOutcome>;
}

/// Hands the job's event to the durable bus.
pub struct DurableHandoff {
    bus: Arc<dyn EventBus>,
}

impl DurableHandoff {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }
}

#[async_trait::async_trait]
impl ExecutionPath for DurableHandoff {
    fn name(&self) -> &'static str {
        "durable"
    }

    async fn execute(&self, job: &dyn Job) -> Result<PathOutcome> {
        self.bus
            .send(&job.event_name(), job.event_payload())
            .await?;
        Ok(PathOutcome::HandedOff)
    }
}

/// Runs the job body in the current invocation.
pub struct InlineExecution;

#[async_trait::async_trait]
impl ExecutionPath for InlineExecution {
    fn name(&self) -> &'static str {
        "inline"
    }

    async fn execute(&self, job: &dyn Job) -> Result<PathOutcome> {
        Ok(PathOutcome::Completed(job.run_inline().await?))
    }
}
