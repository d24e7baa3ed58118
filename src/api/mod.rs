//! API layer -- axum routes, handlers, and middleware.

mod routes;
pub mod state;

use self::state::AppState;
use axum::Router;
use tower_http::trace::TraceLayer;

/// Build the application router with all API routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn fallback() -> (axum::http::StatusCode, &'static str) {
    (axum::http::StatusCode::NOT_FOUND, "not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CronAuth;
    use crate::clock::ManualClock;
    use crate::dispatch::test_support::RecordingBus;
    use crate::dispatch::{ConfiguredKillSwitches, Dispatcher, Job};
    use crate::jobs::JobCatalog;
    use crate::scheduler::{
        registry, HealthAggregator, HealthService, RunLogger, RunStatus, RunStore, Summary,
    };
    use crate::storage::{open_memory_pool, SqliteRunStore};
    use anyhow::bail;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tower::ServiceExt; // for `oneshot`

    const SECRET: &str = "test-secret";

    struct StubJob {
        name: &'static str,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Job for StubJob {
        fn name(&self) -> &str {
            self.name
        }

        fn event_name(&self) -> String {
            format!("cron/{}.daily", self.name)
        }

        async fn run_inline(&self) -> anyhow::Result<Summary> {
            if self.fail {
                bail!("upstream API returned 502");
            }
            let mut s = Summary::new();
            s.insert("refreshed".into(), json!(4));
            Ok(s)
        }
    }

    fn app(bus: RecordingBus, killed: &[&str]) -> (Router, Arc<SqliteRunStore>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 3, 12, 0, 0).unwrap(),
        ));
        let store = Arc::new(SqliteRunStore::new(open_memory_pool().unwrap()));
        let flags: HashMap<String, bool> =
            killed.iter().map(|j| (j.to_string(), true)).collect();

        let dispatcher = Dispatcher::new(
            CronAuth::new(Some(SECRET.into())),
            Arc::new(ConfiguredKillSwitches::new(flags).without_env()),
            RunLogger::new(store.clone(), clock.clone()),
            Arc::new(bus),
        );

        let mut jobs = JobCatalog::default();
        jobs.insert(Arc::new(StubJob {
            name: "token-refresh",
            fail: false,
        }));
        jobs.insert(Arc::new(StubJob {
            name: "content-automation",
            fail: true,
        }));

        let registry = registry::defaults();
        let state = AppState {
            dispatcher: Arc::new(dispatcher),
            jobs,
            health: HealthService::new(
                HealthAggregator::new(registry.clone()),
                store.clone(),
                clock.clone(),
            ),
            registry: Arc::new(registry),
            clock,
        };
        (router(state), store)
    }

    async fn call(app: Router, method: &str, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let response = app
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 100_000)
            .await
            .unwrap();
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_liveness() {
        let (app, _) = app(RecordingBus::default(), &[]);
        let (status, body) = call(app, "GET", "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "ok");
        assert_eq!(body["data"]["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_trigger_requires_bearer() {
        let (app, store) = app(RecordingBus::default(), &[]);
        let (status, body) = call(app.clone(), "POST", "/api/v1/jobs/token-refresh/run", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");

        let (status, _) =
            call(app, "POST", "/api/v1/jobs/token-refresh/run", Some("nope")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(store.recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trigger_dispatches_via_bus() {
        let (app, store) = app(RecordingBus::default(), &[]);
        let (status, body) =
            call(app, "GET", "/api/v1/jobs/token-refresh/run", Some(SECRET)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true, "dispatched": true }));
        assert_eq!(store.recent(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_trigger_falls_back_inline() {
        let (app, _) = app(RecordingBus::refusing(), &[]);
        let (status, body) =
            call(app, "POST", "/api/v1/jobs/token-refresh/run", Some(SECRET)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true, "refreshed": 4 }));
    }

    #[tokio::test]
    async fn test_inline_failure_is_500() {
        let (app, store) = app(RecordingBus::refusing(), &[]);
        let (status, body) =
            call(app, "POST", "/api/v1/jobs/content-automation/run", Some(SECRET)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("upstream API returned 502"));

        let runs = store.recent(10).await.unwrap();
        assert_eq!(runs[0].status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_kill_switch_skips() {
        let (app, store) = app(RecordingBus::default(), &["token-refresh"]);
        let (status, body) =
            call(app, "POST", "/api/v1/jobs/token-refresh/run", Some(SECRET)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["skipped"], true);
        assert!(body["reason"].is_string());
        assert!(store.recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let (app, _) = app(RecordingBus::default(), &[]);
        let (status, _) = call(app.clone(), "POST", "/api/v1/jobs/nope/run", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(app, "POST", "/api/v1/jobs/nope/run", Some(SECRET)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "unknown job: nope");
    }

    #[tokio::test]
    async fn test_jobs_health_reflects_runs() {
        let (app, _) = app(RecordingBus::refusing(), &[]);
        call(app.clone(), "POST", "/api/v1/jobs/content-automation/run", Some(SECRET)).await;

        let (status, body) = call(app, "GET", "/api/v1/jobs/health", None).await;
        assert_eq!(status, StatusCode::OK);
        let data = &body["data"];
        assert_eq!(data["overall"], "degraded");
        assert_eq!(data["hasRecentFailures"], true);
        assert_eq!(data["jobs"].as_array().unwrap().len(), 5);
        assert_eq!(data["recentRuns"].as_array().unwrap().len(), 1);

        let job = data["jobs"]
            .as_array()
            .unwrap()
            .iter()
            .find(|j| j["jobName"] == "content-automation")
            .unwrap();
        assert_eq!(job["lastStatus"], "failed");
        assert_eq!(job["recentFailureCount"], 1);
        assert!(body["meta"]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_list_jobs_with_next_run() {
        let (app, _) = app(RecordingBus::default(), &[]);
        let (status, body) = call(app, "GET", "/api/v1/jobs", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["total"], 5);

        let digest = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .find(|j| j["jobName"] == "weekly-digest")
            .unwrap();
        // 2025-03-03 is a Monday; the digest fires at 13:00 that day.
        assert_eq!(digest["nextRunAt"], "2025-03-03T13:00:00Z");
    }

    #[tokio::test]
    async fn test_unknown_route_falls_back() {
        let (app, _) = app(RecordingBus::default(), &[]);
        let (status, _) = call(app, "GET", "/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
