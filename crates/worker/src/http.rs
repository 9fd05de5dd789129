//! Axum surface of the worker.
//!
//! The queue treats any non-2xx answer as a reason to redeliver, so only
//! retryable dependency failures answer `500`. Unreadable task bodies and
//! other permanent failures answer `200` with status `dropped`.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use domain::{ErrorCategory, TaskPayload, TaskRunId};
use serde_json::{json, Value};
use tracing::warn;

use crate::dispatcher::{DispatchOutcome, Dispatcher};

/// Header the queue sets on every task.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

const SERVICE_NAME: &str = "worker";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<Dispatcher>,
}

impl AppState {
    /// Wraps a configured dispatcher.
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

/// Builds the router with all endpoints.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/", post(run_task))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": SERVICE_NAME }))
}

async fn run_task(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> (StatusCode, Json<Value>) {
    let started = Instant::now();
    let run_id = TaskRunId::new_random();
    let header_id = headers.get(CORRELATION_HEADER).and_then(|v| v.to_str().ok());

    let payload: TaskPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(run_id = %run_id, correlation_id = header_id.unwrap_or("-"), error = %err, "unreadable task body dropped");
            return (
                StatusCode::OK,
                Json(json!({
                    "status": "dropped",
                    "correlation_id": header_id,
                    "run_id": run_id.to_string(),
                    "category": ErrorCategory::MalformedInput.as_str(),
                    "reason": "unreadable task body",
                })),
            );
        }
    };

    let correlation_id = payload.correlation_id().to_string();
    if header_id.is_some_and(|h| h != correlation_id) {
        warn!(run_id = %run_id, correlation_id = %correlation_id, header = header_id, "correlation header disagrees with task body");
    }

    let result = state.dispatcher.dispatch(run_id, payload).await;
    let mut body = json!({
        "correlation_id": correlation_id,
        "run_id": run_id.to_string(),
        "elapsed_ms": started.elapsed().as_millis() as u64,
    });

    let status = match result {
        Ok(DispatchOutcome::Dropped { reason }) => {
            body["status"] = json!("dropped");
            body["category"] = json!(reason.category().as_str());
            body["reason"] = json!(reason.describe());
            StatusCode::OK
        }
        Ok(DispatchOutcome::Command { verb, status, messages }) => {
            body["status"] = json!("processed");
            body["command"] = json!(verb);
            body["command_status"] = json!(status.as_str());
            body["messages"] = json!(messages);
            StatusCode::OK
        }
        Ok(DispatchOutcome::Conversation { messages }) => {
            body["status"] = json!("processed");
            body["messages"] = json!(messages);
            StatusCode::OK
        }
        Err(err) if !err.is_retryable() => {
            body["status"] = json!("dropped");
            body["category"] = json!(err.category().as_str());
            StatusCode::OK
        }
        Err(err) => {
            body["status"] = json!("error");
            body["category"] = json!(err.category().as_str());
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(body))
}
