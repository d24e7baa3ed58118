//! Static catalog of known jobs.
//!
//! The registry is plain configuration. It is handed to whoever needs it
//! (health aggregation, the jobs listing) rather than living in a global.

use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use serde::Serialize;

/// One known job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRegistryEntry {
    pub job_name: String,
    pub label: String,
    /// 6-field cron expression (seconds first), UTC.
    pub schedule: String,
}

impl JobRegistryEntry {
    pub fn new(job_name: &str, label: &str, schedule: &str) -> Self {
        Self {
            job_name: job_name.to_string(),
            label: label.to_string(),
            schedule: schedule.to_string(),
        }
    }

    /// Next time the external trigger is expected to fire after `after`.
    pub fn next_run_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        CronSchedule::from_str(&self.schedule)
            .ok()
            .and_then(|s| s.after(after).next())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobRegistry {
    entries: Vec<JobRegistryEntry>,
}

impl JobRegistry {
    /// Build a registry, rejecting duplicate names and invalid cron expressions.
    pub fn new(entries: Vec<JobRegistryEntry>) -> Result<Self> {
        for (i, entry) in entries.iter().enumerate() {
            CronSchedule::from_str(&entry.schedule).with_context(|| {
                format!(
                    "Invalid cron expression '{}' for job '{}'",
                    entry.schedule, entry.job_name
                )
            })?;
            if entries[..i].iter().any(|e| e.job_name == entry.job_name) {
                anyhow::bail!("Duplicate job '{}' in registry", entry.job_name);
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[JobRegistryEntry] {
        &self.entries
    }

    pub fn get(&self, job_name: &str) -> Option<&JobRegistryEntry> {
        self.entries.iter().find(|e| e.job_name == job_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The out-of-box job catalog.
pub fn defaults() -> JobRegistry {
    JobRegistry {
        entries: vec![
            JobRegistryEntry::new(
                "weekly-digest",
                "Weekly visibility digest email",
                "0 0 13 * * Mon", // Mondays 13:00 UTC
            ),
            JobRegistryEntry::new(
                "token-refresh",
                "OAuth token refresh",
                "0 0 */6 * * *", // every 6 hours
            ),
            JobRegistryEntry::new(
                "content-automation",
                "Content automation engine",
                "0 0 9 * * *", // daily 09:00 UTC
            ),
            JobRegistryEntry::new(
                "benchmark-aggregation",
                "Industry benchmark aggregation",
                "0 30 2 * * Sun", // Sundays 02:30 UTC
            ),
            JobRegistryEntry::new(
                crate::jobs::sweep::SWEEP_JOB_NAME,
                "Delayed task sweep",
                "0 15 * * * *", // hourly at :15
            ),
        ],
    }
}
