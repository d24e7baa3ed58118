//! TOML configuration for jobrelay.
//!
//! Layered model: compiled-in defaults per section, an optional TOML file,
//! then environment overrides for secrets so they need not live on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const CONFIG_ENV: &str = "JOBRELAY_CONFIG";
pub const CRON_SECRET_ENV: &str = "JOBRELAY_CRON_SECRET";
pub const EVENT_KEY_ENV: &str = "JOBRELAY_EVENT_KEY";
pub const EVENT_BUS_URL_ENV: &str = "JOBRELAY_EVENT_BUS_URL";
pub const LOCAL_CONFIG_FILE: &str = "jobrelay.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub event_bus: EventBusConfig,
    /// Job name to kill-switch flag.
    #[serde(default)]
    pub kill_switches: HashMap<String, bool>,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub delayed: DelayedConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Resolve configuration for a process.
    ///
    /// An explicit path must load. Otherwise tries `JOBRELAY_CONFIG`, then
    /// `./jobrelay.toml`, then defaults. Environment overrides are applied
    /// last in every case.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => Self::load_or_default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Try `JOBRELAY_CONFIG`, then `./jobrelay.toml`, then defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "JOBRELAY_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %local.display(),
                        error = %e,
                        "local config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    /// Overlay secrets and the bus endpoint from the environment.
    ///
    /// `lookup` abstracts `std::env::var` so tests stay hermetic.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup(CRON_SECRET_ENV) {
            self.auth.cron_secret = Some(secret);
        }
        if let Some(key) = lookup(EVENT_KEY_ENV) {
            self.event_bus.event_key = Some(key);
        }
        if let Some(url) = lookup(EVENT_BUS_URL_ENV) {
            self.event_bus.endpoint = Some(url);
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP API listens on.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database holding run records and delayed tasks.
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/jobrelay.db"),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared secret cron triggers present as a bearer token. Unset means
    /// every trigger is rejected.
    pub cron_secret: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("cron_secret", &self.cron_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// Ingest URL. Unset means every dispatch runs inline.
    pub endpoint: Option<String>,
    pub event_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            event_key: None,
            timeout_secs: 10,
        }
    }
}

impl std::fmt::Debug for EventBusConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBusConfig")
            .field("endpoint", &self.endpoint)
            .field("event_key", &self.event_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Most recent run records considered.
    pub window: usize,
    /// Raw records echoed in the report.
    pub recent_runs: usize,
    pub failure_window_days: i64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            window: crate::scheduler::health::DEFAULT_RECORD_WINDOW,
            recent_runs: crate::scheduler::health::DEFAULT_RECENT_RUNS,
            failure_window_days: crate::scheduler::health::DEFAULT_FAILURE_WINDOW_DAYS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayedConfig {
    /// Key prefix for task records and the pending set.
    pub namespace: String,
    /// Days a task survives past its target date before expiring unclaimed.
    /// Values below 1 are raised to 1.
    pub ttl_buffer_days: u32,
}

impl Default for DelayedConfig {
    fn default() -> Self {
        Self {
            namespace: crate::delayed::DEFAULT_NAMESPACE.to_string(),
            ttl_buffer_days: crate::delayed::DEFAULT_TTL_BUFFER_DAYS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
