//! Shared value types for the airlock domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values that participate in domain decisions (which source an
//! event came from, when it was admitted, who authored it).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event sources
// ---------------------------------------------------------------------------

/// The two untrusted producers the airlock admits events from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// The Git hosting platform (GitHub webhooks).
    #[serde(rename = "github")]
    GitHub,
    /// The chat platform (Telegram bot webhooks).
    Telegram,
}

impl EventSource {
    /// Stable lowercase name, used in ledger keys, logs, and task payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            EventSource::GitHub => "github",
            EventSource::Telegram => "telegram",
        }
    }

    /// Short prefix used when deriving correlation ids.
    pub fn correlation_prefix(self) -> &'static str {
        match self {
            EventSource::GitHub => "gh",
            EventSource::Telegram => "tg",
        }
    }

    /// Whether the worker can reply directly to the originating conversation.
    pub fn supports_direct_reply(self) -> bool {
        matches!(self, EventSource::Telegram)
    }
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Principals
// ---------------------------------------------------------------------------

/// Kind of principal that authored a git-host comment.
///
/// Mirrors GitHub's `user.type`. Anything GitHub adds later deserializes as
/// [`AuthorKind::Other`] rather than failing the whole payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthorKind {
    /// A human account.
    User,
    /// An automated account (GitHub Apps, `dependabot`, this system itself).
    Bot,
    /// An organisation account.
    Organization,
    /// Unrecognised kind.
    #[serde(other)]
    Other,
}

impl AuthorKind {
    /// Returns `true` for automated principals.
    pub fn is_bot(self) -> bool {
        matches!(self, AuthorKind::Bot)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Seconds since the Unix epoch.
    pub fn as_unix_seconds(self) -> i64 {
        self.0.timestamp()
    }

    /// Returns this timestamp shifted forward by `duration`.
    pub fn plus(self, duration: Duration) -> Self {
        Self(self.0 + duration)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
