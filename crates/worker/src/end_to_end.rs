//! Gateway to queue to worker, in process.

use std::sync::Arc;

use airlock::{Admission, Airlock, AirlockConfig, GitHubDelivery, TelegramDelivery};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use domain::signature::sign_payload;
use domain::{FilterReason, PayloadMode, TaskPayload, Timestamp, DEFAULT_CLAIM_CHECK_THRESHOLD, LOOP_MARKER_TAG};
use gcp::{InMemoryLedger, InMemoryTaskQueue};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::http::{build_router, AppState, CORRELATION_HEADER};
use crate::testkit::*;

const SECRET: &str = "e2e-webhook-secret";
const CHAT_SECRET: &str = "e2e-chat-secret";

struct Pipeline {
    airlock: Airlock,
    queue: Arc<InMemoryTaskQueue>,
    world: Arc<FakeWorld>,
}

impl Pipeline {
    fn new(claim_check_threshold: usize) -> Self {
        let world = FakeWorld::new();
        let queue = Arc::new(InMemoryTaskQueue::new());
        let mut config = AirlockConfig::new(SECRET, Some(CHAT_SECRET.to_string()));
        config.claim_check_threshold = claim_check_threshold;
        let airlock = Airlock::new(config, Arc::new(InMemoryLedger::new()), world.claim_checks.clone(), queue.clone());
        Self { airlock, queue, world }
    }

    async fn comment(&self, delivery_id: &str, body: &[u8]) -> Admission {
        let signature = sign_payload(body, SECRET.as_bytes()).unwrap();
        self.airlock
            .admit_github(GitHubDelivery {
                signature: Some(&signature),
                delivery_id: Some(delivery_id),
                event: Some("issue_comment"),
                body,
            })
            .await
    }

    /// Delivers every queued task to the worker, as the queue would.
    async fn drain(&self) -> Vec<(StatusCode, Value)> {
        let app = build_router(AppState::new(Arc::new(self.world.dispatcher())));
        let mut responses = Vec::new();
        for task in self.queue.drain() {
            let request = Request::builder()
                .method("POST")
                .uri("/")
                .header("content-type", "application/json")
                .header(CORRELATION_HEADER, task.correlation_id.as_str())
                .body(Body::from(task.body))
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            responses.push((status, serde_json::from_slice(&bytes).unwrap()));
        }
        responses
    }
}

fn issue_comment(issue: u64, body: &str, author: &str, author_type: &str) -> Vec<u8> {
    json!({
        "action": "created",
        "installation": { "id": GITHUB_INSTALLATION },
        "repository": {
            "full_name": REPOSITORY,
            "owner": { "login": OWNER, "type": "User" }
        },
        "issue": { "number": issue, "title": "Tracking", "labels": [] },
        "comment": {
            "id": 9_999_003,
            "body": body,
            "user": { "login": author, "type": author_type }
        }
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn label_command_from_owner_labels_once_and_confirms() {
    let pipeline = Pipeline::new(DEFAULT_CLAIM_CHECK_THRESHOLD);
    let body = issue_comment(18, "/label bug", OWNER, "User");

    assert!(matches!(pipeline.comment("d-100", &body).await, Admission::Enqueued { .. }));
    let responses = pipeline.drain().await;
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].0, StatusCode::OK);
    assert_eq!(responses[0].1["command_status"], "applied");

    let calls = pipeline.world.calls();
    let mutations: Vec<_> = calls.iter().filter(|c| c.is_mutation()).collect();
    assert_eq!(mutations, vec![&Call::AddLabels { issue: 18, labels: vec!["bug".to_string()] }]);
    assert_eq!(pipeline.world.comments().len(), 1);
    assert!(pipeline.world.comments()[0].contains("Added label(s): `bug`"));
}

#[tokio::test]
async fn replayed_delivery_is_not_processed_twice() {
    let pipeline = Pipeline::new(DEFAULT_CLAIM_CHECK_THRESHOLD);
    let body = issue_comment(18, "/label bug", OWNER, "User");

    assert!(matches!(pipeline.comment("d-101", &body).await, Admission::Enqueued { .. }));
    pipeline.drain().await;
    assert!(matches!(pipeline.comment("d-101", &body).await, Admission::Duplicate { .. }));
    assert!(pipeline.drain().await.is_empty());

    let label_calls = pipeline.world.calls().iter().filter(|c| c.is_mutation()).count();
    assert_eq!(label_calls, 1);
}

#[tokio::test]
async fn chat_message_round_trip() {
    let pipeline = Pipeline::new(DEFAULT_CLAIM_CHECK_THRESHOLD);
    let update = json!({
        "update_id": 42,
        "message": {
            "message_id": 9,
            "chat": { "id": 777, "type": "private" },
            "from": { "id": 5, "is_bot": false, "username": "alice" },
            "text": "How is the deploy going?"
        }
    })
    .to_string()
    .into_bytes();

    let admission = pipeline
        .airlock
        .admit_telegram(TelegramDelivery { secret_token: Some(CHAT_SECRET), body: &update })
        .await;
    assert!(matches!(admission, Admission::Enqueued { .. }));

    let responses = pipeline.drain().await;
    assert_eq!(responses[0].1["status"], "processed");
    assert_eq!(responses[0].1["messages"]["chat_message_ids"], json!([31]));

    let calls = pipeline.world.calls();
    assert_eq!(calls[0], Call::Token(CHAT_INSTALLATION));
    let comments = pipeline.world.comments();
    assert_eq!(comments.len(), 2);
    assert!(comments[0].contains("How is the deploy going?"));
    assert!(comments[1].contains(ANSWER) && comments[1].contains(LOOP_MARKER_TAG));
    assert_eq!(calls.last(), Some(&Call::SendMessage { chat: 777, text: ANSWER.to_string() }));
}

#[tokio::test]
async fn bot_comment_is_dropped_at_both_ends() {
    let pipeline = Pipeline::new(DEFAULT_CLAIM_CHECK_THRESHOLD);
    let body = issue_comment(TRACKING_ISSUE, "/label bug", "airlock-app[bot]", "Bot");

    assert_eq!(
        pipeline.comment("d-102", &body).await,
        Admission::Ignored { reason: FilterReason::BotAuthor }
    );
    assert!(pipeline.drain().await.is_empty());

    // The worker refuses the same event even if it bypasses the gateway.
    let envelope = bot_comment_envelope("/label bug");
    let task = TaskPayload::Inline {
        correlation_id: envelope.correlation_id().clone(),
        enqueued_at: Timestamp::now(),
        envelope,
    };
    let app = build_router(AppState::new(Arc::new(pipeline.world.dispatcher())));
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .body(Body::from(serde_json::to_vec(&task).unwrap()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(pipeline.world.calls().is_empty());
}

#[tokio::test]
async fn oversized_comment_travels_by_claim_check() {
    let pipeline = Pipeline::new(512);
    let long_question = format!("Please summarise: {}", "details ".repeat(200));
    let body = issue_comment(TRACKING_ISSUE, &long_question, OWNER, "User");

    let admission = pipeline.comment("d-103", &body).await;
    assert!(matches!(admission, Admission::Enqueued { payload_mode: PayloadMode::ClaimCheck, .. }));
    assert_eq!(pipeline.world.claim_checks.keys().len(), 1);

    let responses = pipeline.drain().await;
    assert_eq!(responses[0].0, StatusCode::OK);
    assert_eq!(responses[0].1["status"], "processed");
    let prompt = pipeline.world.calls().into_iter().find_map(|c| match c {
        Call::Complete { prompt } => Some(prompt),
        _ => None,
    });
    assert!(prompt.unwrap().contains(&long_question));
}
