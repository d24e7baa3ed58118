//! Job bookkeeping: the static registry, run history, run logging and health.

pub mod health;
pub mod history;
pub mod registry;
pub mod runlog;

// Re-export common types
pub use self::health::{HealthAggregator, HealthReport, HealthService, JobHealth, OverallStatus};
pub use self::history::{RunRecord, RunStatus, RunStore, Summary};
pub use self::registry::{JobRegistry, JobRegistryEntry};
pub use self::runlog::{RunHandle, RunLogger};
