//! Chat-platform infrastructure adapter.
//!
//! Implements [`domain::ChatMessenger`] over the Telegram Bot API
//! `sendMessage` method. The bot token is read from the secret source on each
//! send and is never logged; it appears only in the request path. Text is
//! sent without a `parse_mode`, so unbalanced markup in model output is
//! delivered verbatim instead of being rejected.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{ApiError, ChatId, ChatMessenger, MessageId, SecretName, SecretSource};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Public Bot API endpoint.
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Deserialize)]
struct BotApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<SentMessage>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Deserialize)]
struct SentMessage {
    message_id: u64,
}

#[derive(Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// [`ChatMessenger`] over the Telegram Bot API.
pub struct TelegramMessenger {
    http: reqwest::Client,
    api_base: String,
    bot_token: SecretName,
    secrets: Arc<dyn SecretSource>,
}

impl TelegramMessenger {
    /// Creates a messenger whose bot token is stored under `bot_token`.
    pub fn new(http: reqwest::Client, bot_token: SecretName, secrets: Arc<dyn SecretSource>) -> Self {
        Self { http, api_base: TELEGRAM_API_BASE.to_string(), bot_token, secrets }
    }

    /// Points the messenger at another API base.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl ChatMessenger for TelegramMessenger {
    #[instrument(skip(self, text), fields(chat_id = %chat, text_len = text.len()))]
    async fn send_message(&self, chat: ChatId, text: &str) -> Result<MessageId, ApiError> {
        let token = self.secrets.get_secret(&self.bot_token).await?;
        let url = format!("{}/bot{}/sendMessage", self.api_base, token.expose());

        let response = self
            .http
            .post(url)
            .timeout(SEND_TIMEOUT)
            .json(&SendMessageRequest { chat_id: chat.as_i64(), text })
            .send()
            .await
            .map_err(|e| {
                // reqwest includes the URL in its error text; the URL carries the token.
                let e = e.without_url();
                if e.is_timeout() {
                    ApiError::Timeout
                } else {
                    ApiError::Transport { message: e.to_string() }
                }
            })?;

        let status = response.status();
        let body: BotApiResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse { message: e.without_url().to_string() })?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = body.parameters.and_then(|p| p.retry_after).map(Duration::from_secs);
            return Err(ApiError::RateLimited { status: status.as_u16(), retry_after });
        }
        if !status.is_success() || !body.ok {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: body.description.unwrap_or_else(|| "request failed".to_string()),
            });
        }

        let sent = body
            .result
            .ok_or_else(|| ApiError::InvalidResponse { message: "missing result".to_string() })?;
        debug!(message_id = sent.message_id, "chat message sent");
        Ok(MessageId::new(sent.message_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{SecretValue, StoreError};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct BotToken;

    #[async_trait]
    impl SecretSource for BotToken {
        async fn get_secret(&self, _name: &SecretName) -> Result<SecretValue, StoreError> {
            Ok(SecretValue::new("123:abc"))
        }
    }

    fn messenger(server: &MockServer) -> TelegramMessenger {
        TelegramMessenger::new(
            reqwest::Client::new(),
            SecretName::new("telegram-bot-token").unwrap(),
            Arc::new(BotToken),
        )
        .with_api_base(server.uri())
    }

    #[tokio::test]
    async fn sends_plain_text_message() {
        let text = "use *args and my_var_name with `code";
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_json(json!({"chat_id": 777, "text": text})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 31, "chat": {"id": 777}, "date": 0, "text": text}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = messenger(&server).send_message(ChatId::new(777), text).await.unwrap();
        assert_eq!(id, MessageId::new(31));
    }

    #[tokio::test]
    async fn bot_api_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "ok": false,
                "error_code": 403,
                "description": "Forbidden: bot was blocked by the user"
            })))
            .mount(&server)
            .await;

        let err = messenger(&server).send_message(ChatId::new(777), "hello").await.unwrap_err();
        match err {
            ApiError::Status { status, message } => {
                assert_eq!(status, 403);
                assert!(message.contains("blocked"));
                assert!(!message.contains("123:abc"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn flood_control_is_a_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "ok": false,
                "error_code": 429,
                "description": "Too Many Requests: retry after 5",
                "parameters": {"retry_after": 5}
            })))
            .mount(&server)
            .await;

        let err = messenger(&server).send_message(ChatId::new(777), "hello").await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::RateLimited { status: 429, retry_after: Some(d) } if d == Duration::from_secs(5)
        ));
    }
}
