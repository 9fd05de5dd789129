//! Axum surface of the gateway.
//!
//! Only two outcomes are surfaced to the sources as errors: a failed
//! signature check (`401`) and a missing delivery identifier (`400`).
//! Everything past authentication answers `202 Accepted` with a JSON status
//! body, including internal failures, so the sources never retry on our
//! behalf.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::gateway::{Admission, Airlock, GitHubDelivery, TelegramDelivery};

/// Header carrying the HMAC-SHA256 signature of a git-host delivery.
pub const HEADER_SIGNATURE: &str = "x-hub-signature-256";
/// Header carrying the git-host delivery id.
pub const HEADER_DELIVERY: &str = "x-github-delivery";
/// Header carrying the git-host event name.
pub const HEADER_EVENT: &str = "x-github-event";
/// Header carrying the chat-platform shared secret.
pub const HEADER_TELEGRAM_TOKEN: &str = "x-telegram-bot-api-secret-token";

const SERVICE_NAME: &str = "airlock";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    airlock: Arc<Airlock>,
}

impl AppState {
    /// Wraps a configured gateway.
    pub fn new(airlock: Arc<Airlock>) -> Self {
        Self { airlock }
    }

    /// The gateway.
    pub fn airlock(&self) -> &Airlock {
        &self.airlock
    }
}

/// Builds the router with all endpoints.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook/github", post(github_webhook))
        .route("/webhook", post(github_webhook))
        .route("/webhook/telegram", post(telegram_webhook))
        .route("/health", get(health))
        .with_state(state)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn github_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let delivery = GitHubDelivery {
        signature: header(&headers, HEADER_SIGNATURE),
        delivery_id: header(&headers, HEADER_DELIVERY),
        event: header(&headers, HEADER_EVENT),
        body: &body,
    };
    state.airlock().admit_github(delivery).await.into_response()
}

async fn telegram_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let delivery = TelegramDelivery {
        secret_token: header(&headers, HEADER_TELEGRAM_TOKEN),
        body: &body,
    };
    state.airlock().admit_telegram(delivery).await.into_response()
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": SERVICE_NAME }))
}

impl IntoResponse for Admission {
    fn into_response(self) -> Response {
        let category = self.category().map(|c| c.as_str());
        let (status, body) = match self {
            Admission::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "status": "unauthorized", "reason": "signature verification failed" }),
            ),
            Admission::MissingDeliveryId => (
                StatusCode::BAD_REQUEST,
                json!({ "status": "error", "category": category, "reason": "missing delivery id" }),
            ),
            Admission::Duplicate { delivery_id } => (
                StatusCode::ACCEPTED,
                json!({ "status": "duplicate", "delivery_id": delivery_id.as_str() }),
            ),
            Admission::Malformed { reason } => (
                StatusCode::ACCEPTED,
                json!({ "status": "error", "category": category, "reason": reason }),
            ),
            Admission::Ignored { reason } => (
                StatusCode::ACCEPTED,
                json!({ "status": "ignored", "reason": reason.describe() }),
            ),
            Admission::Failed { stage, reason } => (
                StatusCode::ACCEPTED,
                json!({ "status": "error", "category": category, "stage": stage.as_str(), "reason": reason }),
            ),
            Admission::Enqueued { correlation_id, payload_mode, task_name, elapsed } => (
                StatusCode::ACCEPTED,
                json!({
                    "status": "enqueued",
                    "correlation_id": correlation_id.as_str(),
                    "payload_mode": payload_mode.as_str(),
                    "task_name": task_name.as_str(),
                    "elapsed_ms": elapsed.as_millis() as u64,
                }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testkit::*;
    use crate::gateway::AirlockConfig;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    fn github_request(uri: &str, body: Vec<u8>, signature: &str, delivery: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header(HEADER_EVENT, "issue_comment")
            .header(HEADER_SIGNATURE, signature);
        if let Some(delivery) = delivery {
            builder = builder.header(HEADER_DELIVERY, delivery);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn telegram_request(body: Vec<u8>, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/webhook/telegram");
        if let Some(token) = token {
            builder = builder.header(HEADER_TELEGRAM_TOKEN, token);
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_service() {
        let h = harness();
        let app = build_router(AppState::new(h.airlock));
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok", "service": "airlock" }));
    }

    #[tokio::test]
    async fn signed_delivery_returns_202_enqueued() {
        let h = harness();
        let app = build_router(AppState::new(h.airlock.clone()));
        let body = comment_body("/assign @octocat", "octocat", "User");
        let sig = sign(&body);

        let (status, json) = send(app, github_request("/webhook/github", body, &sig, Some("d-1"))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json["status"], "enqueued");
        assert_eq!(json["payload_mode"], "inline");
        assert_eq!(json["task_name"], "memory-task-1");
        assert!(json["correlation_id"].as_str().unwrap().starts_with("gh_d-1_"));
        assert_eq!(h.queue.tasks().len(), 1);
    }

    #[tokio::test]
    async fn legacy_webhook_path_is_an_alias() {
        let h = harness();
        let app = build_router(AppState::new(h.airlock.clone()));
        let body = comment_body("hello", "octocat", "User");
        let sig = sign(&body);

        let (status, json) = send(app, github_request("/webhook", body, &sig, Some("d-2"))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json["status"], "enqueued");
    }

    #[tokio::test]
    async fn forged_signature_returns_401() {
        let h = harness();
        let app = build_router(AppState::new(h.airlock.clone()));
        let body = comment_body("hello", "octocat", "User");
        let wrong = domain::signature::sign_payload(&body, b"wrong-secret").unwrap();

        let (status, json) = send(app, github_request("/webhook/github", body, &wrong, Some("d-3"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["status"], "unauthorized");
        assert!(h.ledger.is_empty());
    }

    #[tokio::test]
    async fn missing_delivery_header_returns_400() {
        let h = harness();
        let app = build_router(AppState::new(h.airlock));
        let body = comment_body("hello", "octocat", "User");
        let sig = sign(&body);

        let (status, json) = send(app, github_request("/webhook/github", body, &sig, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["category"], "malformed_input");
    }

    #[tokio::test]
    async fn replay_returns_202_duplicate() {
        let h = harness();
        let app = build_router(AppState::new(h.airlock.clone()));
        let body = comment_body("hello", "octocat", "User");
        let sig = sign(&body);

        let first = send(app.clone(), github_request("/webhook/github", body.clone(), &sig, Some("d-4"))).await;
        assert_eq!(first.1["status"], "enqueued");
        let (status, json) = send(app, github_request("/webhook/github", body, &sig, Some("d-4"))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json, json!({ "status": "duplicate", "delivery_id": "d-4" }));
        assert_eq!(h.queue.tasks().len(), 1);
    }

    #[tokio::test]
    async fn unparseable_body_is_accepted_as_error() {
        let h = harness();
        let app = build_router(AppState::new(h.airlock.clone()));
        let body = b"{ nope".to_vec();
        let sig = sign(&body);

        let (status, json) = send(app, github_request("/webhook/github", body, &sig, Some("d-5"))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json["status"], "error");
        assert_eq!(json["category"], "malformed_input");
        assert!(h.queue.tasks().is_empty());
    }

    #[tokio::test]
    async fn bot_comment_returns_202_ignored() {
        let h = harness();
        let app = build_router(AppState::new(h.airlock.clone()));
        let body = comment_body("/label bug", "renovate[bot]", "Bot");
        let sig = sign(&body);

        let (status, json) = send(app, github_request("/webhook/github", body, &sig, Some("d-6"))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json["status"], "ignored");
        assert!(h.queue.tasks().is_empty());
    }

    #[tokio::test]
    async fn telegram_update_round_trips_through_the_router() {
        let h = harness();
        let app = build_router(AppState::new(h.airlock.clone()));

        let (status, json) = send(app.clone(), telegram_request(chat_body(42, "hi"), Some(CHAT_SECRET))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json["status"], "enqueued");

        let (status, json) = send(app.clone(), telegram_request(chat_body(42, "hi"), Some(CHAT_SECRET))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json["status"], "duplicate");

        let (status, _) = send(app, telegram_request(chat_body(43, "hi"), Some("wrong"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn telegram_without_update_id_returns_400() {
        let h = harness_with(AirlockConfig::new(SECRET, None));
        let app = build_router(AppState::new(h.airlock));

        let (status, _) = send(app, telegram_request(br#"{"message":{}}"#.to_vec(), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
