//! Operator-controlled per-job kill switches.

use std::collections::HashMap;

pub const KILL_ENV_PREFIX: &str = "JOBRELAY_KILL_";

/// Decides whether a job is currently disabled.
pub trait KillSwitch: Send + Sync {
    /// `Some(reason)` when the job must be skipped.
    fn engaged(&self, job_name: &str) -> Option<String>;
}

/// Kill switches read from the `[kill_switches]` config table, with an
/// environment flag (`JOBRELAY_KILL_<JOB_NAME>`) able to engage any job.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredKillSwitches {
    flags: HashMap<String, bool>,
    read_env: bool,
}

impl ConfiguredKillSwitches {
    pub fn new(flags: HashMap<String, bool>) -> Self {
        Self {
            flags,
            read_env: true,
        }
    }

    /// Ignore the process environment; only configured flags apply.
    pub fn without_env(mut self) -> Self {
        self.read_env = false;
        self
    }

    /// Environment variable consulted for `job_name`.
    pub fn env_key(job_name: &str) -> String {
        format!(
            "{}{}",
            KILL_ENV_PREFIX,
            job_name.to_ascii_uppercase().replace('-', "_")
        )
    }

    fn env_engaged(&self, job_name: &str) -> bool {
        self.read_env
            && std::env::var(Self::env_key(job_name))
                .map(|v| is_truthy(&v))
                .unwrap_or(false)
    }
}

impl KillSwitch for ConfiguredKillSwitches {
    fn engaged(&self, job_name: &str) -> Option<String> {
        if self.flags.get(job_name).copied().unwrap_or(false) {
            return Some(format!("{job_name} disabled by configuration"));
        }
        if self.env_engaged(job_name) {
            return Some(format!(
                "{job_name} disabled by {}",
                Self::env_key(job_name)
            ));
        }
        None
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true")
}
