//! Idempotency records: one per admitted physical delivery.
//!
//! Records are created exactly once through the ledger's atomic
//! create-if-absent and expire after [`RETENTION_HOURS`]. The airlock never
//! deletes them; purging is left to the ledger's own TTL mechanism.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::{DeliveryId, EventSource, Timestamp};

/// How long an idempotency record is retained (24 hours).
pub const RETENTION_HOURS: i64 = 24;

/// Source-qualified delivery id: `github:<delivery>` or `telegram:<update>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerKey(String);

impl LedgerKey {
    /// Key for `delivery_id` from `source`.
    pub fn new(source: EventSource, delivery_id: &DeliveryId) -> Self {
        Self(format!("{}:{}", source.as_str(), delivery_id))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status stored on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// The delivery passed authentication and was admitted.
    Seen,
}

impl DeliveryStatus {
    /// Stable snake-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Seen => "seen",
        }
    }
}

/// The ledger document for one admitted delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// Document key.
    pub key: LedgerKey,
    /// Admission time.
    pub timestamp: Timestamp,
    /// Lifecycle status.
    pub status: DeliveryStatus,
    /// Source of the delivery.
    pub source: EventSource,
    /// When the ledger may purge the record.
    pub expire_at: Timestamp,
}

impl IdempotencyRecord {
    /// Record for a delivery admitted at `now`.
    pub fn admitted(source: EventSource, delivery_id: &DeliveryId, now: Timestamp) -> Self {
        Self {
            key: LedgerKey::new(source, delivery_id),
            timestamp: now,
            status: DeliveryStatus::Seen,
            source,
            expire_at: now.plus(Duration::hours(RETENTION_HOURS)),
        }
    }

    /// Whether the record has passed its expiry at `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expire_at
    }
}

/// Result of an atomic create-if-absent.
///
/// A conflict is a normal outcome, not an error: the caller short-circuits
/// the delivery as a duplicate. Ledger failures are reported separately as
/// [`crate::StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The record did not exist and has now been created.
    Created,
    /// A record with the same key already exists.
    AlreadyExists,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_source_qualified() {
        let id = DeliveryId::new("abc").unwrap();
        assert_eq!(LedgerKey::new(EventSource::GitHub, &id).as_str(), "github:abc");
        assert_eq!(LedgerKey::new(EventSource::Telegram, &id).as_str(), "telegram:abc");
    }

    #[test]
    fn record_expires_after_retention_window() {
        let now = Timestamp::now();
        let record = IdempotencyRecord::admitted(EventSource::GitHub, &DeliveryId::new("d").unwrap(), now);

        assert_eq!(record.status, DeliveryStatus::Seen);
        assert!(!record.is_expired(now));
        assert!(!record.is_expired(now.plus(Duration::hours(23))));
        assert!(record.is_expired(now.plus(Duration::hours(24))));
    }
}
