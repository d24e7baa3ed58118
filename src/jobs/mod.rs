//! Concrete jobs and the catalog that maps registry names to them.

pub mod recheck;
pub mod sweep;

pub use self::recheck::{schedule_visibility_recheck, VISIBILITY_RECHECK_DELAY_DAYS};
pub use self::sweep::{DelayedTaskSweep, DueTaskHandler, EventForwardingHandler, SWEEP_JOB_NAME};

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::delayed::DelayedTaskStore;
use crate::dispatch::{EventBus, Job};
use crate::scheduler::{JobRegistry, Summary};

/// Bus event names for the catalog jobs whose bodies live in event consumers.
const EXTERNAL_EVENTS: [(&str, &str); 4] = [
    ("weekly-digest", "cron/weekly-digest.weekly"),
    ("token-refresh", "cron/token-refresh.every-6h"),
    ("content-automation", "cron/content-automation.daily"),
    ("benchmark-aggregation", "cron/benchmark-aggregation.weekly"),
];

/// A job executed only by event consumers outside this process.
///
/// The hand-off is its only path: when the bus refuses the event the inline
/// fallback fails and the run is recorded as failed.
pub struct ExternalJob {
    name: String,
    event_name: String,
}

impl ExternalJob {
    pub fn new(name: &str, event_name: &str) -> Self {
        Self {
            name: name.to_string(),
            event_name: event_name.to_string(),
        }
    }

    fn for_registry_name(name: &str) -> Self {
        let event = EXTERNAL_EVENTS
            .iter()
            .find(|(job, _)| *job == name)
            .map(|(_, event)| event.to_string())
            .unwrap_or_else(|| format!("cron/{name}.scheduled"));
        Self::new(name, &event)
    }
}

#[async_trait::async_trait]
impl Job for ExternalJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn event_name(&self) -> String {
        self.event_name.clone()
    }

    async fn run_inline(&self) -> Result<Summary> {
        bail!(
            "{} has no in-process body; event {} could not be delivered",
            self.name,
            self.event_name
        )
    }
}

/// Job implementations keyed by name.
#[derive(Clone, Default)]
pub struct JobCatalog {
    jobs: BTreeMap<String, Arc<dyn Job>>,
}

impl JobCatalog {
    /// One job per registry entry: the built-in sweep for its name, an
    /// [`ExternalJob`] for everything else.
    pub fn from_registry(
        registry: &JobRegistry,
        tasks: Arc<DelayedTaskStore>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        let mut catalog = Self::default();
        for entry in registry.entries() {
            let job: Arc<dyn Job> = if entry.job_name == SWEEP_JOB_NAME {
                Arc::new(DelayedTaskSweep::new(
                    tasks.clone(),
                    Arc::new(EventForwardingHandler::new(bus.clone())),
                ))
            } else {
                Arc::new(ExternalJob::for_registry_name(&entry.job_name))
            };
            catalog.insert(job);
        }
        catalog
    }

    pub fn insert(&mut self, job: Arc<dyn Job>) {
        self.jobs.insert(job.name().to_string(), job);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Job>> {
        self.jobs.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.jobs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
