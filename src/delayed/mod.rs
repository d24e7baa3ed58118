//! Delayed one-shot tasks.
//!
//! A task is scheduled N days after a triggering event (for example,
//! re-checking visibility 14 days after content is published) and is later
//! picked up by a periodic sweep. Records live in a [`KeyedStore`] under a
//! namespaced key with a TTL somewhat longer than the delay, so unclaimed
//! tasks garbage-collect themselves. A discovery set indexes pending keys;
//! members whose record has expired are pruned lazily by [`DelayedTaskStore::list_due`].
//!
//! Delivery is at-least-once: a sweep that dies between `list_due` and
//! `complete` leaves the task due for the next sweep.

pub mod keyed;

pub use self::keyed::{InMemoryKeyedStore, KeyedStore};

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::scheduler::Summary;

pub const DEFAULT_NAMESPACE: &str = "jobrelay:delayed";
/// Extra lifetime past the target date before an unclaimed task expires.
pub const DEFAULT_TTL_BUFFER_DAYS: u32 = 1;

const SECONDS_PER_DAY: u64 = 86_400;

/// A unit of work deferred to `target_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayedTask {
    pub task_key: String,
    pub task_type: String,
    pub target_date: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
    pub payload: Summary,
}

impl DelayedTask {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.target_date <= now
    }
}

pub struct DelayedTaskStore {
    store: Arc<dyn KeyedStore>,
    clock: Arc<dyn Clock>,
    namespace: String,
    ttl_buffer_days: u32,
}

impl DelayedTaskStore {
    pub fn new(store: Arc<dyn KeyedStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            namespace: DEFAULT_NAMESPACE.to_string(),
            ttl_buffer_days: DEFAULT_TTL_BUFFER_DAYS,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// The buffer is at least one day, so a task outlives its target date.
    pub fn with_ttl_buffer_days(mut self, days: u32) -> Self {
        self.ttl_buffer_days = days.max(1);
        self
    }

    fn record_key(&self, task_key: &str) -> String {
        format!("{}:task:{}", self.namespace, task_key)
    }

    fn pending_set_key(&self) -> String {
        format!("{}:pending", self.namespace)
    }

    /// TTL in seconds for a task delayed by `delay_days`.
    pub fn ttl_seconds(&self, delay_days: u32) -> u64 {
        (u64::from(delay_days) + u64::from(self.ttl_buffer_days)) * SECONDS_PER_DAY
    }

    /// Schedule `task_key` to become due `delay_days` from now.
    ///
    /// Re-scheduling an existing key replaces it. If the store is unreachable
    /// the call is a logged no-op returning `None`; the caller's own action
    /// must not fail because measurement could not be scheduled.
    pub async fn schedule(
        &self,
        task_key: &str,
        task_type: &str,
        delay_days: u32,
        payload: Summary,
    ) -> Option<DelayedTask> {
        let now = self.clock.now();
        let Some(target_date) = Duration::try_days(i64::from(delay_days))
            .and_then(|delay| now.checked_add_signed(delay))
        else {
            warn!(task_key = %task_key, task_type = %task_type, delay_days, "delay out of range; skipping");
            return None;
        };
        let task = DelayedTask {
            task_key: task_key.to_string(),
            task_type: task_type.to_string(),
            target_date,
            scheduled_at: now,
            payload,
        };

        match self.write(&task, delay_days).await {
            Ok(()) => {
                info!(
                    task_key = %task_key,
                    task_type = %task_type,
                    target_date = %task.target_date,
                    "delayed task scheduled"
                );
                Some(task)
            }
            Err(e) => {
                warn!(task_key = %task_key, task_type = %task_type, error = %e, "failed to schedule delayed task; skipping");
                None
            }
        }
    }

    async fn write(&self, task: &DelayedTask, delay_days: u32) -> Result<()> {
        let value = serde_json::to_string(task)?;
        self.store
            .set(
                &self.record_key(&task.task_key),
                &value,
                self.ttl_seconds(delay_days),
            )
            .await?;
        self.store
            .set_add(&self.pending_set_key(), &task.task_key)
            .await?;
        Ok(())
    }

    /// Every pending task whose target date has passed.
    ///
    /// Keys whose record has expired (or cannot be decoded) are removed from
    /// the discovery set as they are found.
    pub async fn list_due(&self) -> Result<Vec<DelayedTask>> {
        let now = self.clock.now();
        let set_key = self.pending_set_key();
        let members = self.store.set_members(&set_key).await?;

        let mut due = Vec::new();
        for task_key in members {
            let record_key = self.record_key(&task_key);
            let Some(raw) = self.store.get(&record_key).await? else {
                debug!(task_key = %task_key, "pruning expired delayed task");
                self.store.set_remove(&set_key, &task_key).await?;
                continue;
            };

            let task: DelayedTask = match serde_json::from_str(&raw) {
                Ok(task) => task,
                Err(e) => {
                    warn!(task_key = %task_key, error = %e, "discarding undecodable delayed task");
                    self.store.del(&record_key).await?;
                    self.store.set_remove(&set_key, &task_key).await?;
                    continue;
                }
            };

            if task.is_due(now) {
                due.push(task);
            }
        }

        due.sort_by(|a, b| a.target_date.cmp(&b.target_date));
        Ok(due)
    }

    /// Remove a processed task. Call this whether processing succeeded or not.
    pub async fn complete(&self, task_key: &str) -> Result<()> {
        self.store.del(&self.record_key(task_key)).await?;
        self.store
            .set_remove(&self.pending_set_key(), task_key)
            .await?;
        debug!(task_key = %task_key, "delayed task completed");
        Ok(())
    }
}
