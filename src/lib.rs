//! jobrelay -- resilient background jobs for the visibility dashboard.
//!
//! This crate provides dual-path job dispatch (durable event hand-off with
//! inline fallback), fail-open run logging, job health aggregation, and
//! delayed one-shot tasks.

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod delayed;
pub mod dispatch;
pub mod jobs;
pub mod logging;
pub mod scheduler;
pub mod storage;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};

use crate::auth::CronAuth;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::delayed::DelayedTaskStore;
use crate::dispatch::{ConfiguredKillSwitches, Dispatcher, EventBus, HttpEventBus};
use crate::jobs::JobCatalog;
use crate::scheduler::health::DEFAULT_FAILURE_WINDOW_DAYS;
use crate::scheduler::{
    registry, HealthAggregator, HealthService, JobRegistry, JobRegistryEntry, RunLogger,
};
use crate::storage::{Pool, SqliteKeyedStore, SqliteRunStore};

/// Shared services built once from configuration.
pub struct Runtime {
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub registry: Arc<JobRegistry>,
    pub runs: Arc<SqliteRunStore>,
    pub keyed: Arc<SqliteKeyedStore>,
    pub tasks: Arc<DelayedTaskStore>,
    pub bus: Arc<dyn EventBus>,
}

impl Runtime {
    /// Open the database and wire every store against the system clock.
    pub fn open(config: Config) -> Result<Self> {
        let db_path = config.storage.db_path.to_string_lossy().into_owned();
        tracing::info!(%db_path, "Initializing database");
        let pool = storage::open_pool(&db_path)
            .with_context(|| format!("Failed to open database at {db_path}"))?;
        Self::with_pool(config, pool, Arc::new(SystemClock))
    }

    pub fn with_pool(config: Config, pool: Pool, clock: Arc<dyn Clock>) -> Result<Self> {
        let runs = Arc::new(SqliteRunStore::new(pool.clone()));
        let keyed = Arc::new(SqliteKeyedStore::new(pool, clock.clone()));
        let tasks = Arc::new(
            DelayedTaskStore::new(keyed.clone(), clock.clone())
                .with_namespace(config.delayed.namespace.clone())
                .with_ttl_buffer_days(config.delayed.ttl_buffer_days),
        );
        let bus = HttpEventBus::new(
            config.event_bus.endpoint.clone(),
            config.event_bus.event_key.clone(),
            StdDuration::from_secs(config.event_bus.timeout_secs),
        )?;
        if !bus.is_configured() {
            tracing::warn!("No event bus endpoint configured; every job will run inline");
        }

        Ok(Self {
            config,
            clock,
            registry: Arc::new(registry::defaults()),
            runs,
            keyed,
            tasks,
            bus: Arc::new(bus),
        })
    }

    pub fn health_service(&self) -> HealthService {
        let aggregator = HealthAggregator::new(self.registry.as_ref().clone())
            .with_record_window(self.config.health.window)
            .with_recent_runs(self.config.health.recent_runs)
            .with_failure_window(
                Duration::try_days(self.config.health.failure_window_days)
                    .unwrap_or_else(|| Duration::days(DEFAULT_FAILURE_WINDOW_DAYS)),
            );
        HealthService::new(aggregator, self.runs.clone(), self.clock.clone())
    }

    pub fn dispatcher(&self) -> Dispatcher {
        let auth = CronAuth::new(self.config.auth.cron_secret.clone());
        if !auth.is_configured() {
            tracing::warn!("No cron secret configured; all job triggers will be rejected");
        }
        Dispatcher::new(
            auth,
            Arc::new(ConfiguredKillSwitches::new(self.config.kill_switches.clone())),
            RunLogger::new(self.runs.clone(), self.clock.clone()),
            self.bus.clone(),
        )
    }

    /// Each registered job with its next run after the runtime clock's now.
    pub fn upcoming_runs(&self) -> Vec<(&JobRegistryEntry, Option<DateTime<Utc>>)> {
        let now = self.clock.now();
        self.registry
            .entries()
            .iter()
            .map(|entry| (entry, entry.next_run_after(&now)))
            .collect()
    }

    pub fn catalog(&self) -> JobCatalog {
        JobCatalog::from_registry(&self.registry, self.tasks.clone(), self.bus.clone())
    }

    pub fn app_state(&self) -> api::state::AppState {
        api::state::AppState {
            dispatcher: Arc::new(self.dispatcher()),
            jobs: self.catalog(),
            health: self.health_service(),
            registry: self.registry.clone(),
            clock: self.clock.clone(),
        }
    }
}

/// Start the API server and run until Ctrl+C.
pub async fn serve(config: Config) -> Result<()> {
    let bind = config.server.bind.clone();
    let runtime = Runtime::open(config)?;
    let app = api::router(runtime.app_state());

    let addr: std::net::SocketAddr = bind
        .parse()
        .with_context(|| format!("Invalid bind address: {bind}"))?;
    tracing::info!(%addr, jobs = runtime.registry.len(), "jobrelay listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received Ctrl+C, shutting down");
        })
        .await?;

    Ok(())
}
