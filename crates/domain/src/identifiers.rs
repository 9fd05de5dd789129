//! Newtype domain identifiers.
//!
//! Every identifier that crosses a component boundary (gateway → queue →
//! worker → external API) is represented as a distinct newtype wrapping a
//! primitive. This prevents accidentally interchanging, for example, an
//! [`IssueNumber`] with an [`InstallationId`] even though both are `u64` under
//! the hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EventSource, Timestamp};

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Macro for u64-wrapped newtypes (platform-assigned integers).
// Generates: struct (Copy), new(), as_u64(), Display.
// ---------------------------------------------------------------------------
macro_rules! u64_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Creates a new identifier from a raw integer.
            pub fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the underlying integer value.
            pub fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: GitHub-integer-backed
// ---------------------------------------------------------------------------

u64_id! {
    /// Identifies a GitHub App installation; scopes the access token the
    /// worker exchanges for before calling the issue-tracking API.
    InstallationId
}

u64_id! {
    /// A GitHub issue (or pull request) number within a repository.
    IssueNumber
}

u64_id! {
    /// A GitHub issue comment id, as returned when a comment is created.
    CommentId
}

// ---------------------------------------------------------------------------
// Identifiers: Telegram-integer-backed
// ---------------------------------------------------------------------------

u64_id! {
    /// Telegram's monotonically increasing update identifier. Doubles as the
    /// delivery identifier for chat-platform webhooks.
    UpdateId
}

u64_id! {
    /// Identifies a Telegram message within a chat.
    MessageId
}

u64_id! {
    /// Identifies the Telegram user who sent a message.
    ChatUserId
}

/// Identifies a Telegram chat.
///
/// Group and channel chats have negative ids, so unlike the other platform
/// integers this one is signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(i64);

impl ChatId {
    /// Creates a chat identifier from a raw integer.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the underlying integer value.
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed
// ---------------------------------------------------------------------------

string_id! {
    /// The source-native identifier of one physical webhook delivery
    /// (`X-GitHub-Delivery` header, or the Telegram `update_id` rendered as text).
    DeliveryId
}

string_id! {
    /// A GitHub account login (user, bot, or organisation).
    UserLogin
}

string_id! {
    /// The name of a secret held by the secret source (e.g. `"telegram-bot-token"`).
    SecretName
}

string_id! {
    /// The name of the task created by the queue (opaque, queue-assigned).
    TaskName
}

impl UserLogin {
    /// GitHub logins are case-insensitive; compares accordingly.
    pub fn matches(&self, other: &UserLogin) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

// ---------------------------------------------------------------------------

/// Identifies a GitHub repository in `"owner/repo"` format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryName(String);

impl RepositoryName {
    /// Creates a repository name, returning `None` unless the value has the
    /// shape `owner/repo` with both parts non-empty.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        match v.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
                Some(Self(v))
            }
            _ => None,
        }
    }

    /// Returns the full `owner/repo` name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the owner part of the name.
    pub fn owner(&self) -> &str {
        self.0.split_once('/').map(|(owner, _)| owner).unwrap_or_default()
    }
}

impl TryFrom<String> for RepositoryName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value.clone()).ok_or_else(|| format!("not an owner/repo name: {value}"))
    }
}

impl From<RepositoryName> for String {
    fn from(value: RepositoryName) -> Self {
        value.0
    }
}

impl std::fmt::Display for RepositoryName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Correlation
// ---------------------------------------------------------------------------

/// A globally unique token threaded through gateway, queue, and worker.
///
/// Assigned exactly once, at admission, from the event source, the
/// source-native delivery identifier, and the admission time:
/// `gh_<delivery>_<unix_seconds>` or `tg_<update>_<unix_seconds>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Derives the correlation id for an admitted delivery.
    pub fn derive(source: EventSource, delivery: &DeliveryId, admitted_at: Timestamp) -> Self {
        Self(format!(
            "{}_{}_{}",
            source.correlation_prefix(),
            delivery,
            admitted_at.as_unix_seconds()
        ))
    }

    /// Wraps a correlation id received from another component (e.g. the
    /// `X-Correlation-ID` header). Returns `None` if the value is empty.
    pub fn from_existing(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        if v.is_empty() { None } else { Some(Self(v)) }
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------

/// Identifies a single worker execution of a queued task.
///
/// Generated fresh every time the worker endpoint is invoked, so repeated
/// executions of the same task under queue-level retry can be told apart in
/// logs even though they share a [`CorrelationId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskRunId(Uuid);

impl TaskRunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TaskRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
