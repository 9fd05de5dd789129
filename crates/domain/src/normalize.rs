//! Mapping of raw webhook bodies onto [`EventEnvelope`]s.
//!
//! Parsing is tolerant: only the fields the airlock needs are declared, and
//! everything else in the (large) webhook payloads is ignored. Bodies that are
//! not JSON, or that lack a required field, are [`NormalizeError`]s and map to
//! [`ErrorCategory::MalformedInput`]. Well-formed events the airlock does not
//! handle are [`Normalized::Ignored`] with a [`FilterReason`].

use serde::Deserialize;
use thiserror::Error;

use crate::{
    AuthorKind, ChatId, ChatMetadata, ChatUserId, CommentId, CommentPayload, DeliveryId,
    ErrorCategory, EventEnvelope, GitHubMetadata, InstallationId, IssueNumber, MessageId,
    MessagePayload, RepositoryName, Timestamp, UpdateId, UserLogin,
};

/// The only git-host event the airlock admits.
pub const GITHUB_ISSUE_COMMENT_EVENT: &str = "issue_comment";
/// The only action of that event the airlock admits.
pub const GITHUB_CREATED_ACTION: &str = "created";

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a well-formed event was not admitted for processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterReason {
    /// Git-host event type other than `issue_comment`.
    UnsupportedEvent(String),
    /// `issue_comment` action other than `created`.
    UnsupportedAction(String),
    /// Chat update without a text message.
    NoTextMessage,
    /// Authored by an automated principal.
    BotAuthor,
    /// Contains the marker the worker places on its own output.
    LoopMarker,
    /// Plain comment outside the tracking issue.
    OutsideTrackingScope,
}

impl FilterReason {
    /// Short stable description used in responses and logs.
    pub fn describe(&self) -> String {
        match self {
            FilterReason::UnsupportedEvent(event) => format!("unsupported event '{event}'"),
            FilterReason::UnsupportedAction(action) => format!("unsupported action '{action}'"),
            FilterReason::NoTextMessage => "update carries no text message".to_string(),
            FilterReason::BotAuthor => "bot author".to_string(),
            FilterReason::LoopMarker => "loop marker present".to_string(),
            FilterReason::OutsideTrackingScope => "comment outside tracking issue".to_string(),
        }
    }

    /// Every filter reason is a policy decision.
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::PolicyFiltered
    }
}

impl std::fmt::Display for FilterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Result of normalizing a well-formed body.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    /// The event is admitted as this envelope.
    Admitted(EventEnvelope),
    /// The event is well-formed but not handled.
    Ignored(FilterReason),
}

/// The body could not be turned into an envelope.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// The body is not valid JSON.
    #[error("body is not valid JSON: {0}")]
    InvalidJson(String),

    /// The JSON lacks a required field or a field has the wrong shape.
    #[error("payload does not match the expected shape: {0}")]
    InvalidShape(String),
}

impl NormalizeError {
    /// Always [`ErrorCategory::MalformedInput`].
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::MalformedInput
    }
}

// ---------------------------------------------------------------------------
// Git host
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RawUser {
    login: String,
    #[serde(rename = "type", default = "default_author_kind")]
    kind: AuthorKind,
}

fn default_author_kind() -> AuthorKind {
    AuthorKind::User
}

#[derive(Deserialize)]
struct RawRepository {
    full_name: String,
    owner: RawUser,
}

#[derive(Deserialize)]
struct RawLabel {
    name: String,
}

#[derive(Deserialize)]
struct RawIssue {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    labels: Vec<RawLabel>,
}

#[derive(Deserialize)]
struct RawComment {
    id: u64,
    #[serde(default)]
    body: Option<String>,
    user: RawUser,
}

#[derive(Deserialize)]
struct RawInstallation {
    id: u64,
}

#[derive(Deserialize)]
struct IssueCommentEvent {
    #[serde(default)]
    installation: Option<RawInstallation>,
    repository: RawRepository,
    issue: RawIssue,
    comment: RawComment,
}

fn parse_json(body: &[u8]) -> Result<serde_json::Value, NormalizeError> {
    serde_json::from_slice(body).map_err(|e| NormalizeError::InvalidJson(e.to_string()))
}

fn required<T>(value: Option<T>, what: &str) -> Result<T, NormalizeError> {
    value.ok_or_else(|| NormalizeError::InvalidShape(format!("invalid or empty {what}")))
}

/// Normalizes a git-host delivery.
///
/// `event_name` is the `X-GitHub-Event` header. Filtering by event type and
/// action happens after the JSON is known to be well-formed, so a garbage
/// body is always reported as malformed.
pub fn normalize_github(
    event_name: Option<&str>,
    delivery_id: DeliveryId,
    received_at: Timestamp,
    body: &[u8],
) -> Result<Normalized, NormalizeError> {
    let value = parse_json(body)?;

    let event_name = event_name.unwrap_or_default();
    if event_name != GITHUB_ISSUE_COMMENT_EVENT {
        return Ok(Normalized::Ignored(FilterReason::UnsupportedEvent(event_name.to_string())));
    }
    let action = value.get("action").and_then(|a| a.as_str()).unwrap_or_default();
    if action != GITHUB_CREATED_ACTION {
        return Ok(Normalized::Ignored(FilterReason::UnsupportedAction(action.to_string())));
    }

    let event: IssueCommentEvent =
        serde_json::from_value(value).map_err(|e| NormalizeError::InvalidShape(e.to_string()))?;

    let metadata = GitHubMetadata {
        installation_id: event.installation.map(|i| InstallationId::new(i.id)),
        repository: required(RepositoryName::new(event.repository.full_name), "repository.full_name")?,
        repository_owner: required(UserLogin::new(event.repository.owner.login), "repository.owner.login")?,
        issue_number: IssueNumber::new(event.issue.number),
        comment_id: CommentId::new(event.comment.id),
        author: required(UserLogin::new(event.comment.user.login), "comment.user.login")?,
        author_kind: event.comment.user.kind,
    };
    let payload = CommentPayload {
        body: event.comment.body.unwrap_or_default(),
        issue_title: event.issue.title,
        issue_labels: event.issue.labels.into_iter().map(|l| l.name).collect(),
    };

    Ok(Normalized::Admitted(EventEnvelope::github(delivery_id, received_at, metadata, payload)))
}

// ---------------------------------------------------------------------------
// Chat platform
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct UpdateProbe {
    #[serde(default)]
    update_id: Option<u64>,
}

#[derive(Deserialize)]
struct RawChat {
    id: i64,
}

#[derive(Deserialize)]
struct RawSender {
    id: u64,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
}

#[derive(Deserialize)]
struct RawMessage {
    message_id: u64,
    chat: RawChat,
    #[serde(default)]
    from: Option<RawSender>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct RawUpdate {
    update_id: u64,
    #[serde(default)]
    message: Option<RawMessage>,
}

/// Extracts the chat update's delivery identifier without parsing the rest.
///
/// Returns `Ok(None)` when the body is JSON but carries no `update_id`.
pub fn probe_update_id(body: &[u8]) -> Result<Option<UpdateId>, NormalizeError> {
    let probe: UpdateProbe =
        serde_json::from_slice(body).map_err(|e| NormalizeError::InvalidJson(e.to_string()))?;
    Ok(probe.update_id.map(UpdateId::new))
}

/// Normalizes a chat-platform update. Only text messages are admitted.
pub fn normalize_telegram(
    delivery_id: DeliveryId,
    received_at: Timestamp,
    body: &[u8],
) -> Result<Normalized, NormalizeError> {
    let value = parse_json(body)?;
    let update: RawUpdate =
        serde_json::from_value(value).map_err(|e| NormalizeError::InvalidShape(e.to_string()))?;

    let Some(message) = update.message else {
        return Ok(Normalized::Ignored(FilterReason::NoTextMessage));
    };
    let Some(text) = message.text.filter(|t| !t.trim().is_empty()) else {
        return Ok(Normalized::Ignored(FilterReason::NoTextMessage));
    };

    let sender = message.from;
    let metadata = ChatMetadata {
        update_id: UpdateId::new(update.update_id),
        chat_id: ChatId::new(message.chat.id),
        user_id: sender.as_ref().map(|s| ChatUserId::new(s.id)),
        username: sender.as_ref().and_then(|s| s.username.clone()),
        first_name: sender.as_ref().and_then(|s| s.first_name.clone()),
        sender_is_bot: sender.as_ref().is_some_and(|s| s.is_bot),
    };
    let payload = MessagePayload { text, message_id: Some(MessageId::new(message.message_id)) };

    Ok(Normalized::Admitted(EventEnvelope::telegram(delivery_id, received_at, metadata, payload)))
}

#[cfg(test)]
pub(crate) mod samples {
    use serde_json::json;

    /// A trimmed `issue_comment.created` delivery.
    pub fn issue_comment(action: &str, body: &str, author: &str, author_type: &str) -> Vec<u8> {
        json!({
            "action": action,
            "installation": { "id": 100 },
            "repository": {
                "full_name": "octocat/hello-world",
                "owner": { "login": "octocat", "type": "User" }
            },
            "issue": {
                "number": 18,
                "title": "Tracking",
                "labels": [{ "name": "triage" }]
            },
            "comment": {
                "id": 9_999_003,
                "body": body,
                "user": { "login": author, "type": author_type }
            }
        })
        .to_string()
        .into_bytes()
    }

    /// A chat update carrying a text message.
    pub fn chat_message(update_id: u64, text: &str, is_bot: bool) -> Vec<u8> {
        json!({
            "update_id": update_id,
            "message": {
                "message_id": 9,
                "chat": { "id": 777, "type": "private" },
                "from": { "id": 5, "is_bot": is_bot, "username": "alice", "first_name": "Alice" },
                "text": text
            }
        })
        .to_string()
        .into_bytes()
    }
}
