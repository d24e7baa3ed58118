use std::sync::Arc;

use crate::clock::Clock;
use crate::dispatch::Dispatcher;
use crate::jobs::JobCatalog;
use crate::scheduler::{HealthService, JobRegistry};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub jobs: JobCatalog,
    pub health: HealthService,
    pub registry: Arc<JobRegistry>,
    pub clock: Arc<dyn Clock>,
}
