//! Periodic sweep that claims due delayed tasks.

use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::delayed::{DelayedTask, DelayedTaskStore};
use crate::dispatch::{EventBus, Job};
use crate::scheduler::Summary;

pub const SWEEP_JOB_NAME: &str = "delayed-task-sweep";
pub const SWEEP_EVENT_NAME: &str = "cron/delayed-task-sweep.hourly";

/// Processes one due task on behalf of the sweep.
#[async_trait::async_trait]
pub trait DueTaskHandler: Send + Sync {
    async fn handle(&self, task: &DelayedTask) -> Result<()>;
}

/// Forwards each due task to the event bus as `tasks/<task_type>.due`.
pub struct EventForwardingHandler {
    bus: Arc<dyn EventBus>,
}

impl EventForwardingHandler {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }

    pub fn event_name(task_type: &str) -> String {
        format!("tasks/{task_type}.due")
    }
}

#[async_trait::async_trait]
impl DueTaskHandler for EventForwardingHandler {
    async fn handle(&self, task: &DelayedTask) -> Result<()> {
        let data = json!({
            "taskKey": task.task_key,
            "taskType": task.task_type,
            "targetDate": task.target_date,
            "scheduledAt": task.scheduled_at,
            "payload": Value::Object(task.payload.clone()),
        });
        self.bus
            .send(&Self::event_name(&task.task_type), data)
            .await?;
        Ok(())
    }
}

/// Built-in job: list due tasks, hand each to the handler, complete it.
///
/// A task is completed whether or not its handler succeeded, so a poisoned
/// task cannot wedge the sweep. A crash before `complete` leaves the task
/// due for the next run.
pub struct DelayedTaskSweep {
    tasks: Arc<DelayedTaskStore>,
    handler: Arc<dyn DueTaskHandler>,
}

impl DelayedTaskSweep {
    pub fn new(tasks: Arc<DelayedTaskStore>, handler: Arc<dyn DueTaskHandler>) -> Self {
        Self { tasks, handler }
    }
}

#[async_trait::async_trait]
impl Job for DelayedTaskSweep {
    fn name(&self) -> &str {
        SWEEP_JOB_NAME
    }

    fn event_name(&self) -> String {
        SWEEP_EVENT_NAME.to_string()
    }

    async fn run_inline(&self) -> Result<Summary> {
        let due = self.tasks.list_due().await?;
        let mut processed = 0usize;
        let mut failed = 0usize;

        for task in &due {
            match self.handler.handle(task).await {
                Ok(()) => processed += 1,
                Err(e) => {
                    failed += 1;
                    warn!(task_key = %task.task_key, task_type = %task.task_type, error = %e, "due task handler failed");
                }
            }
            self.tasks.complete(&task.task_key).await?;
        }

        info!(due = due.len(), processed, failed, "delayed task sweep finished");

        let mut summary = Summary::new();
        summary.insert("due".into(), json!(due.len()));
        summary.insert("processed".into(), json!(processed));
        summary.insert("failed".into(), json!(failed));
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::delayed::InMemoryKeyedStore;
    use crate::dispatch::test_support::RecordingBus;
    use anyhow::bail;
    use chrono::{Duration, Utc};
    use std::sync::Mutex;

    fn store() -> (Arc<DelayedTaskStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let kv = Arc::new(InMemoryKeyedStore::new(clock.clone()));
        (Arc::new(DelayedTaskStore::new(kv, clock.clone())), clock)
    }

    /// Records handled keys and fails for any key listed in `fail_on`.
    #[derive(Default)]
    struct ScriptedHandler {
        fail_on: Vec<String>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl DueTaskHandler for ScriptedHandler {
        async fn handle(&self, task: &DelayedTask) -> Result<()> {
            self.seen.lock().unwrap().push(task.task_key.clone());
            if self.fail_on.contains(&task.task_key) {
                bail!("downstream rejected {}", task.task_key);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sweep_processes_and_completes_due_tasks() {
        let (tasks, clock) = store();
        tasks.schedule("a", "visibility-recheck", 1, Summary::new()).await.unwrap();
        tasks.schedule("b", "visibility-recheck", 1, Summary::new()).await.unwrap();
        tasks.schedule("later", "visibility-recheck", 30, Summary::new()).await.unwrap();
        clock.advance(Duration::days(2));

        let handler = Arc::new(ScriptedHandler {
            fail_on: vec!["b".into()],
            ..Default::default()
        });
        let sweep = DelayedTaskSweep::new(tasks.clone(), handler.clone());

        let summary = sweep.run_inline().await.unwrap();
        assert_eq!(summary["due"], 2);
        assert_eq!(summary["processed"], 1);
        assert_eq!(summary["failed"], 1);
        assert_eq!(*handler.seen.lock().unwrap(), vec!["a", "b"]);

        // Failed tasks are completed too; the future task is untouched.
        assert!(tasks.list_due().await.unwrap().is_empty());
        clock.advance(Duration::days(30));
        assert_eq!(tasks.list_due().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_sweep() {
        let (tasks, _) = store();
        let sweep = DelayedTaskSweep::new(tasks, Arc::new(ScriptedHandler::default()));
        let summary = sweep.run_inline().await.unwrap();
        assert_eq!(summary["due"], 0);
        assert_eq!(summary["processed"], 0);
        assert_eq!(summary["failed"], 0);
    }

    #[tokio::test]
    async fn test_forwarding_handler_emits_due_event() {
        let (tasks, clock) = store();
        let mut payload = Summary::new();
        payload.insert("draftId".into(), json!("draft-7"));
        tasks.schedule("draft-7", "visibility-recheck", 0, payload).await.unwrap();
        clock.advance(Duration::seconds(1));

        let bus = Arc::new(RecordingBus::default());
        let sweep = DelayedTaskSweep::new(
            tasks,
            Arc::new(EventForwardingHandler::new(bus.clone())),
        );
        let summary = sweep.run_inline().await.unwrap();
        assert_eq!(summary["processed"], 1);

        let sent = bus.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "tasks/visibility-recheck.due");
        assert_eq!(sent[0].1["taskKey"], "draft-7");
        assert_eq!(sent[0].1["payload"]["draftId"], "draft-7");
    }

    #[tokio::test]
    async fn test_forwarding_failure_counts_as_failed() {
        let (tasks, clock) = store();
        tasks.schedule("x", "visibility-recheck", 0, Summary::new()).await.unwrap();
        clock.advance(Duration::seconds(1));

        let sweep = DelayedTaskSweep::new(
            tasks.clone(),
            Arc::new(EventForwardingHandler::new(Arc::new(RecordingBus::refusing()))),
        );
        let summary = sweep.run_inline().await.unwrap();
        assert_eq!(summary["failed"], 1);
        assert!(tasks.list_due().await.unwrap().is_empty());
    }
}
