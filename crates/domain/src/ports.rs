//! Collaborator interfaces.
//!
//! The gateway and worker never touch a cloud SDK or HTTP client directly.
//! Every external collaborator is one of these traits, constructed once at
//! process start and passed in as `Arc<dyn Trait>`. Infrastructure crates
//! provide the implementations; tests provide recording fakes.

use async_trait::async_trait;

use crate::{
    ApiError, ChatId, ClaimCheckKey, CommentId, CorrelationId, CreateOutcome, IdempotencyRecord,
    InstallationId, IssueNumber, MessageId, RepositoryName, SecretName, StoreError, TaskName,
};

// ---------------------------------------------------------------------------
// Credential material
// ---------------------------------------------------------------------------

/// Secret bytes returned by a [`SecretSource`]. `Debug` never prints them.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    /// Wraps secret material.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the secret material.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretValue(<redacted>)")
    }
}

/// A short-lived, scoped token for the issue-tracking API.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps a token string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the token string for use in an `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Returns current credential material for a named secret.
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Reads the latest version of `name`.
    async fn get_secret(&self, name: &SecretName) -> Result<SecretValue, StoreError>;
}

/// Exchanges the App identity for an installation-scoped access token.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Returns a token scoped to `installation`.
    async fn installation_token(&self, installation: InstallationId) -> Result<AccessToken, ApiError>;
}

// ---------------------------------------------------------------------------
// Durable primitives
// ---------------------------------------------------------------------------

/// Atomic create-if-absent store for [`IdempotencyRecord`]s.
///
/// Implementations must make creation mutually exclusive across concurrent
/// callers using the same key: exactly one caller observes
/// [`CreateOutcome::Created`].
#[async_trait]
pub trait IdempotencyLedger: Send + Sync {
    /// Creates `record` unless a live record with the same key exists.
    async fn create(&self, record: &IdempotencyRecord) -> Result<CreateOutcome, StoreError>;
}

/// Byte store for envelopes too large to travel inline.
#[async_trait]
pub trait ClaimCheckStore: Send + Sync {
    /// Writes `bytes` under `key`.
    async fn put(&self, key: &ClaimCheckKey, bytes: Vec<u8>) -> Result<(), StoreError>;

    /// Reads the bytes written under `key`.
    async fn get(&self, key: &ClaimCheckKey) -> Result<Vec<u8>, StoreError>;
}

/// A task body ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTask {
    /// Sent as the `X-Correlation-ID` header.
    pub correlation_id: CorrelationId,
    /// JSON-serialized [`crate::TaskPayload`].
    pub body: Vec<u8>,
}

/// At-least-once delivery of task bodies to the worker endpoint.
///
/// The target URL is fixed at construction; the queue retries delivery while
/// the worker answers non-2xx.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Submits `task`, returning the queue-assigned task name.
    async fn enqueue(&self, task: QueuedTask) -> Result<TaskName, StoreError>;
}

// ---------------------------------------------------------------------------
// Outbound APIs
// ---------------------------------------------------------------------------

/// Issue-tracking API: comments, labels, assignees.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Posts `body` as a new comment, returning its id.
    async fn post_comment(
        &self,
        token: &AccessToken,
        repository: &RepositoryName,
        issue: IssueNumber,
        body: &str,
    ) -> Result<CommentId, ApiError>;

    /// Adds `labels` to the issue.
    async fn add_labels(
        &self,
        token: &AccessToken,
        repository: &RepositoryName,
        issue: IssueNumber,
        labels: &[String],
    ) -> Result<(), ApiError>;

    /// Adds `assignees` (logins, no `@`) to the issue.
    async fn add_assignees(
        &self,
        token: &AccessToken,
        repository: &RepositoryName,
        issue: IssueNumber,
        assignees: &[String],
    ) -> Result<(), ApiError>;
}

/// Replies into a chat-platform conversation.
#[async_trait]
pub trait ChatMessenger: Send + Sync {
    /// Sends `text` to `chat`, returning the new message's id.
    async fn send_message(&self, chat: ChatId, text: &str) -> Result<MessageId, ApiError>;
}

/// Language-model collaborator. Responses are opaque text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Completes `prompt`.
    async fn complete(&self, prompt: &str) -> Result<String, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_material_is_redacted_in_debug_output() {
        let secret = SecretValue::new("hunter2");
        let token = AccessToken::new("ghs_abc");
        assert!(!format!("{secret:?}").contains("hunter2"));
        assert!(!format!("{token:?}").contains("ghs_abc"));
        assert_eq!(secret.expose(), "hunter2");
    }
}
