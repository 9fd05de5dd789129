//! The unified event envelope produced by normalizing either source.
//!
//! An [`EventEnvelope`] is immutable once constructed: its fields are private,
//! the correlation id is derived inside the constructor, and deserialization
//! re-checks that the declared source agrees with the metadata and payload.

use serde::{Deserialize, Serialize};

use crate::{
    AuthorKind, ChatId, ChatUserId, CommentId, CorrelationId, DeliveryId, EventSource,
    InstallationId, IssueNumber, MessageId, RepositoryName, Timestamp, UpdateId, UserLogin,
};

// ---------------------------------------------------------------------------
// Metadata: identifiers only, never free text
// ---------------------------------------------------------------------------

/// Identifiers of a git-host issue comment needed for outbound calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubMetadata {
    /// App installation the delivery came through. Absent for deliveries that
    /// were not routed through an App installation.
    pub installation_id: Option<InstallationId>,
    /// Repository the comment was posted in.
    pub repository: RepositoryName,
    /// Owner principal of that repository; the only principal allowed to run commands.
    pub repository_owner: UserLogin,
    /// Issue the comment was posted on.
    pub issue_number: IssueNumber,
    /// The comment itself.
    pub comment_id: CommentId,
    /// Comment author.
    pub author: UserLogin,
    /// Kind of the comment author.
    pub author_kind: AuthorKind,
}

/// Identifiers of a chat-platform message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMetadata {
    /// Delivery identifier of the update.
    pub update_id: UpdateId,
    /// Chat the message was sent in; replies go here.
    pub chat_id: ChatId,
    /// Sender id, when the platform provided one.
    pub user_id: Option<ChatUserId>,
    /// Sender username, when set.
    pub username: Option<String>,
    /// Sender first name, when set.
    pub first_name: Option<String>,
    /// Whether the sender is a bot account.
    pub sender_is_bot: bool,
}

impl ChatMetadata {
    /// Human-facing name of the sender.
    pub fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .or(self.first_name.as_deref())
            .unwrap_or("unknown")
    }
}

/// Source-specific identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EventMetadata {
    /// Git-host issue comment identifiers.
    #[serde(rename = "github")]
    GitHub(GitHubMetadata),
    /// Chat-platform message identifiers.
    #[serde(rename = "telegram")]
    Telegram(ChatMetadata),
}

// ---------------------------------------------------------------------------
// Payload: free text and structured fields
// ---------------------------------------------------------------------------

/// Body of a git-host issue comment plus issue context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentPayload {
    /// Comment text as written.
    pub body: String,
    /// Title of the issue the comment was posted on.
    pub issue_title: String,
    /// Names of the labels on that issue at delivery time.
    pub issue_labels: Vec<String>,
}

/// Body of a chat-platform message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Message text as sent.
    pub text: String,
    /// The message's id within its chat.
    pub message_id: Option<MessageId>,
}

/// Source-specific free text and structured fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// Git-host comment.
    Comment(CommentPayload),
    /// Chat-platform message.
    Message(MessagePayload),
}

// ---------------------------------------------------------------------------
// Routing subset
// ---------------------------------------------------------------------------

/// The small subset of metadata a claim-check task carries so the worker can
/// route and log before fetching the full envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingMetadata {
    /// Source of the event.
    pub source: EventSource,
    /// Repository, for git-host events.
    pub repository: Option<RepositoryName>,
    /// Issue, for git-host events.
    pub issue_number: Option<IssueNumber>,
    /// App installation, for git-host events.
    pub installation_id: Option<InstallationId>,
    /// Chat, for chat-platform events.
    pub chat_id: Option<ChatId>,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Event type tag of admitted git-host events.
pub const GITHUB_COMMENT_CREATED: &str = "issue_comment.created";
/// Event type tag of admitted chat-platform events.
pub const TELEGRAM_MESSAGE: &str = "message";

/// The unit normalized from either source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "EnvelopeRepr", into = "EnvelopeRepr")]
pub struct EventEnvelope {
    event_type: String,
    correlation_id: CorrelationId,
    delivery_id: DeliveryId,
    received_at: Timestamp,
    metadata: EventMetadata,
    payload: EventPayload,
}

impl EventEnvelope {
    /// Builds the envelope for an admitted git-host comment, assigning its
    /// correlation id.
    pub fn github(
        delivery_id: DeliveryId,
        received_at: Timestamp,
        metadata: GitHubMetadata,
        payload: CommentPayload,
    ) -> Self {
        Self {
            event_type: GITHUB_COMMENT_CREATED.to_string(),
            correlation_id: CorrelationId::derive(EventSource::GitHub, &delivery_id, received_at),
            delivery_id,
            received_at,
            metadata: EventMetadata::GitHub(metadata),
            payload: EventPayload::Comment(payload),
        }
    }

    /// Builds the envelope for an admitted chat-platform message, assigning
    /// its correlation id.
    pub fn telegram(
        delivery_id: DeliveryId,
        received_at: Timestamp,
        metadata: ChatMetadata,
        payload: MessagePayload,
    ) -> Self {
        Self {
            event_type: TELEGRAM_MESSAGE.to_string(),
            correlation_id: CorrelationId::derive(EventSource::Telegram, &delivery_id, received_at),
            delivery_id,
            received_at,
            metadata: EventMetadata::Telegram(metadata),
            payload: EventPayload::Message(payload),
        }
    }

    /// Source the event was admitted from.
    pub fn source(&self) -> EventSource {
        match self.metadata {
            EventMetadata::GitHub(_) => EventSource::GitHub,
            EventMetadata::Telegram(_) => EventSource::Telegram,
        }
    }

    /// Event type tag (e.g. `"issue_comment.created"`).
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Correlation id assigned at admission.
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Source-native delivery identifier.
    pub fn delivery_id(&self) -> &DeliveryId {
        &self.delivery_id
    }

    /// Admission time.
    pub fn received_at(&self) -> Timestamp {
        self.received_at
    }

    /// Source-specific identifiers.
    pub fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    /// Source-specific free text and structured fields.
    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// The user's free text: comment body or message text.
    pub fn text(&self) -> &str {
        match &self.payload {
            EventPayload::Comment(comment) => &comment.body,
            EventPayload::Message(message) => &message.text,
        }
    }

    /// Routing subset carried by claim-check tasks.
    pub fn routing(&self) -> RoutingMetadata {
        match &self.metadata {
            EventMetadata::GitHub(meta) => RoutingMetadata {
                source: EventSource::GitHub,
                repository: Some(meta.repository.clone()),
                issue_number: Some(meta.issue_number),
                installation_id: meta.installation_id,
                chat_id: None,
            },
            EventMetadata::Telegram(meta) => RoutingMetadata {
                source: EventSource::Telegram,
                repository: None,
                issue_number: None,
                installation_id: None,
                chat_id: Some(meta.chat_id),
            },
        }
    }
}

/// Serialized shape of [`EventEnvelope`]; carries an explicit `source` field
/// that must agree with the metadata and payload variants.
#[derive(Serialize, Deserialize)]
struct EnvelopeRepr {
    source: EventSource,
    event_type: String,
    correlation_id: CorrelationId,
    delivery_id: DeliveryId,
    received_at: Timestamp,
    metadata: EventMetadata,
    payload: EventPayload,
}

impl From<EventEnvelope> for EnvelopeRepr {
    fn from(envelope: EventEnvelope) -> Self {
        Self {
            source: envelope.source(),
            event_type: envelope.event_type,
            correlation_id: envelope.correlation_id,
            delivery_id: envelope.delivery_id,
            received_at: envelope.received_at,
            metadata: envelope.metadata,
            payload: envelope.payload,
        }
    }
}

impl TryFrom<EnvelopeRepr> for EventEnvelope {
    type Error = String;

    fn try_from(repr: EnvelopeRepr) -> Result<Self, Self::Error> {
        let consistent = matches!(
            (repr.source, &repr.metadata, &repr.payload),
            (EventSource::GitHub, EventMetadata::GitHub(_), EventPayload::Comment(_))
                | (EventSource::Telegram, EventMetadata::Telegram(_), EventPayload::Message(_))
        );
        if !consistent {
            return Err(format!(
                "envelope source '{}' does not match its metadata/payload",
                repr.source
            ));
        }
        Ok(Self {
            event_type: repr.event_type,
            correlation_id: repr.correlation_id,
            delivery_id: repr.delivery_id,
            received_at: repr.received_at,
            metadata: repr.metadata,
            payload: repr.payload,
        })
    }
}
