use anyhow::Result;
use serde_json::Value;

use crate::scheduler::Summary;

/// A named, independently schedulable unit of work.
///
/// Every job can be handed off to the event bus as `event_name()` or run
/// in-process through `run_inline()`. The dispatcher picks between the two.
#[async_trait::async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    /// Event handed to the durable bus, conventionally `cron/<job>.<cadence>`.
    fn event_name(&self) -> String;

    fn event_payload(&self) -> Value {
        Value::Object(Summary::new())
    }

    /// Execute the job body synchronously and return its summary.
    async fn run_inline(&self) -> Result<Summary>;
}
