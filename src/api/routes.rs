//! API route definitions.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use super::state::AppState;
use crate::auth::extract_bearer;
use crate::dispatch::DispatchError;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/jobs", get(list_jobs))
        .route("/jobs/health", get(jobs_health))
        .route("/jobs/{job}/run", get(run_job).post(run_job))
}

fn meta(state: &AppState) -> Value {
    json!({
        "timestamp": state.clock.now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": meta(&state)
    }))
}

async fn list_jobs(State(state): State<AppState>) -> Json<Value> {
    let now = state.clock.now();
    let jobs: Vec<Value> = state
        .registry
        .entries()
        .iter()
        .map(|entry| {
            json!({
                "jobName": entry.job_name,
                "label": entry.label,
                "schedule": entry.schedule,
                "nextRunAt": entry.next_run_after(&now),
            })
        })
        .collect();

    Json(json!({
        "data": jobs,
        "meta": { "total": jobs.len() }
    }))
}

async fn jobs_health(State(state): State<AppState>) -> Json<Value> {
    let report = state.health.report().await;
    Json(json!({
        "data": report,
        "meta": meta(&state)
    }))
}

async fn run_job(
    State(state): State<AppState>,
    Path(job_name): Path<String>,
    headers: HeaderMap,
) -> Response {
    let credential = extract_bearer(&headers);

    let Some(job) = state.jobs.get(&job_name) else {
        // Unknown names are only revealed to authorized callers.
        if !state.dispatcher.is_authorized(credential) {
            return error_response(StatusCode::UNAUTHORIZED, "unauthorized");
        }
        return error_response(StatusCode::NOT_FOUND, &format!("unknown job: {job_name}"));
    };

    match state.dispatcher.dispatch(job.as_ref(), credential).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome.to_body())).into_response(),
        Err(DispatchError::Unauthorized) => {
            error_response(StatusCode::UNAUTHORIZED, "unauthorized")
        }
        Err(DispatchError::Execution(message)) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &message)
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
