//! Cloud Tasks queue with an HTTP target.
//!
//! Each task is a `POST` of the JSON task body to the worker URL, carrying
//! the correlation id as `X-Correlation-ID`. Cloud Tasks retries delivery
//! while the worker answers non-2xx. When an invoker service account is
//! configured the task carries an OIDC token minted for it, so the worker can
//! require authenticated invocation.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use domain::{QueuedTask, StoreError, TaskName, TaskQueue};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::auth::AccessTokenSource;
use crate::http::{decode_error, failure, transport, CALL_TIMEOUT};

/// Public Cloud Tasks endpoint.
pub const TASKS_API_BASE: &str = "https://cloudtasks.googleapis.com/v2";

/// Header carrying the correlation id to the worker.
pub const CORRELATION_HEADER: &str = "X-Correlation-ID";

/// Where tasks are created and where they are delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTarget {
    /// Project owning the queue.
    pub project: String,
    /// Queue region.
    pub location: String,
    /// Queue name.
    pub queue: String,
    /// Worker endpoint the tasks are delivered to.
    pub worker_url: String,
    /// Service account the OIDC token is minted for, if any.
    pub invoker_service_account: Option<String>,
}

impl QueueTarget {
    fn queue_path(&self) -> String {
        format!("projects/{}/locations/{}/queues/{}", self.project, self.location, self.queue)
    }
}

#[derive(Deserialize)]
struct CreatedTask {
    name: String,
}

/// [`TaskQueue`] over Cloud Tasks.
pub struct CloudTasksQueue {
    http: reqwest::Client,
    api_base: String,
    target: QueueTarget,
    tokens: Arc<dyn AccessTokenSource>,
}

impl CloudTasksQueue {
    /// Creates a queue client for `target`.
    pub fn new(http: reqwest::Client, target: QueueTarget, tokens: Arc<dyn AccessTokenSource>) -> Self {
        Self { http, api_base: TASKS_API_BASE.to_string(), target, tokens }
    }

    /// Points the client at another API base (emulator, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn task_request(&self, task: &QueuedTask) -> Value {
        let mut http_request = json!({
            "url": self.target.worker_url,
            "httpMethod": "POST",
            "headers": {
                "Content-Type": "application/json",
                CORRELATION_HEADER: task.correlation_id.as_str(),
            },
            "body": STANDARD.encode(&task.body),
        });
        if let Some(account) = &self.target.invoker_service_account {
            http_request["oidcToken"] = json!({ "serviceAccountEmail": account });
        }
        json!({ "task": { "httpRequest": http_request } })
    }
}

#[async_trait]
impl TaskQueue for CloudTasksQueue {
    #[instrument(skip(self, task), fields(correlation_id = %task.correlation_id, size = task.body.len()))]
    async fn enqueue(&self, task: QueuedTask) -> Result<TaskName, StoreError> {
        let token = self.tokens.token().await?;
        let url = format!("{}/{}/tasks", self.api_base, self.target.queue_path());

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .timeout(CALL_TIMEOUT)
            .json(&self.task_request(&task))
            .send()
            .await
            .map_err(|e| transport("cloud tasks", e))?;
        if !response.status().is_success() {
            return Err(failure("cloud tasks", task.correlation_id.as_str(), response).await);
        }

        let created: CreatedTask = response.json().await.map_err(|e| decode_error("cloud tasks", e))?;
        info!(task_name = %created.name, "task created");
        TaskName::new(created.name).ok_or_else(|| StoreError::Corrupt { message: "empty task name".to_string() })
    }
}
