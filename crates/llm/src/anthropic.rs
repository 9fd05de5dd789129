//! Anthropic Messages API provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{ApiError, LanguageModel, SecretName, SecretSource};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Public Anthropic endpoint.
pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";

/// API version header value.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

const MAX_TOKENS: u32 = 1024;

const COMPLETION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// [`LanguageModel`] over the Anthropic Messages API.
pub struct AnthropicProvider {
    http: reqwest::Client,
    api_base: String,
    model: String,
    api_key: SecretName,
    secrets: Arc<dyn SecretSource>,
}

impl AnthropicProvider {
    /// Creates a provider for `model`, reading the API key named `api_key`.
    pub fn new(
        http: reqwest::Client,
        model: impl Into<String>,
        api_key: SecretName,
        secrets: Arc<dyn SecretSource>,
    ) -> Self {
        Self { http, api_base: ANTHROPIC_API_BASE.to_string(), model: model.into(), api_key, secrets }
    }

    /// Points the provider at another API base.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

fn failure(status: StatusCode, body: &str) -> ApiError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return ApiError::RateLimited { status: status.as_u16(), retry_after: None };
    }
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
    ApiError::Status { status: status.as_u16(), message }
}

#[async_trait]
impl LanguageModel for AnthropicProvider {
    #[instrument(skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<String, ApiError> {
        let key = self.secrets.get_secret(&self.api_key).await?;
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: [Message { role: "user", content: prompt }],
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", self.api_base))
            .header("x-api-key", key.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .timeout(COMPLETION_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::Timeout
                } else {
                    ApiError::Transport { message: e.to_string() }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failure(status, &body));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse { message: e.to_string() })?;
        let text: Vec<String> = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        if text.is_empty() {
            return Err(ApiError::InvalidResponse { message: "no text content in response".to_string() });
        }

        let text = text.join("\n");
        debug!(response_len = text.len(), "completion received");
        Ok(text)
    }
}
