//! Task payloads handed to the queue, and the inline vs. claim-check decision.
//!
//! The mode is chosen once, at enqueue time, solely from the serialized size
//! of the envelope: an envelope serializing to at most the threshold travels
//! inline; anything larger is written to the claim-check store and the task
//! carries only a locator plus [`RoutingMetadata`].

use serde::{Deserialize, Serialize};

use crate::{CorrelationId, EventEnvelope, RoutingMetadata, Timestamp};

/// Default claim-check threshold: 100 KiB of serialized envelope.
pub const DEFAULT_CLAIM_CHECK_THRESHOLD: usize = 100 * 1024;

/// Locator of an envelope in the claim-check store: `payloads/<correlation_id>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimCheckKey(String);

impl ClaimCheckKey {
    /// Key under which the envelope for `correlation_id` is stored.
    pub fn for_correlation(correlation_id: &CorrelationId) -> Self {
        Self(format!("payloads/{correlation_id}.json"))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClaimCheckKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which way the envelope travels through the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadMode {
    /// The envelope is embedded in the task body.
    Inline,
    /// The task body carries a locator into the claim-check store.
    ClaimCheck,
}

impl PayloadMode {
    /// Stable snake-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            PayloadMode::Inline => "inline",
            PayloadMode::ClaimCheck => "claim_check",
        }
    }
}

/// The body handed to the queue. Always carries the correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TaskPayload {
    /// Full envelope embedded.
    Inline {
        /// Correlation id of the envelope.
        correlation_id: CorrelationId,
        /// When the task was built.
        enqueued_at: Timestamp,
        /// The envelope itself.
        envelope: EventEnvelope,
    },
    /// Locator into the claim-check store.
    ClaimCheck {
        /// Correlation id of the stored envelope.
        correlation_id: CorrelationId,
        /// When the task was built.
        enqueued_at: Timestamp,
        /// Where the envelope was written.
        locator: ClaimCheckKey,
        /// Routing subset available before the envelope is fetched.
        routing: RoutingMetadata,
    },
}

impl TaskPayload {
    /// Correlation id, regardless of mode.
    pub fn correlation_id(&self) -> &CorrelationId {
        match self {
            TaskPayload::Inline { correlation_id, .. } | TaskPayload::ClaimCheck { correlation_id, .. } => {
                correlation_id
            }
        }
    }

    /// The mode this payload was built in.
    pub fn mode(&self) -> PayloadMode {
        match self {
            TaskPayload::Inline { .. } => PayloadMode::Inline,
            TaskPayload::ClaimCheck { .. } => PayloadMode::ClaimCheck,
        }
    }
}

/// The decision taken for one envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPlan {
    /// Enqueue the payload directly.
    Inline {
        /// Task body to enqueue.
        task: TaskPayload,
        /// Serialized envelope size in bytes.
        size: usize,
    },
    /// Write `blob` under `key` first, then enqueue `task`.
    ClaimCheck {
        /// Claim-check key to write.
        key: ClaimCheckKey,
        /// Serialized envelope bytes to store.
        blob: Vec<u8>,
        /// Locator-only task body to enqueue afterwards.
        task: TaskPayload,
    },
}

impl TaskPlan {
    /// Chooses the mode for `envelope` against `threshold` bytes.
    pub fn for_envelope(
        envelope: &EventEnvelope,
        threshold: usize,
        enqueued_at: Timestamp,
    ) -> Result<Self, serde_json::Error> {
        let blob = serde_json::to_vec(envelope)?;
        let correlation_id = envelope.correlation_id().clone();

        if blob.len() <= threshold {
            return Ok(TaskPlan::Inline {
                size: blob.len(),
                task: TaskPayload::Inline { correlation_id, enqueued_at, envelope: envelope.clone() },
            });
        }

        let key = ClaimCheckKey::for_correlation(&correlation_id);
        Ok(TaskPlan::ClaimCheck {
            task: TaskPayload::ClaimCheck {
                correlation_id,
                enqueued_at,
                locator: key.clone(),
                routing: envelope.routing(),
            },
            key,
            blob,
        })
    }

    /// The mode chosen.
    pub fn mode(&self) -> PayloadMode {
        match self {
            TaskPlan::Inline { .. } => PayloadMode::Inline,
            TaskPlan::ClaimCheck { .. } => PayloadMode::ClaimCheck,
        }
    }

    /// The task body that will be enqueued.
    pub fn task(&self) -> &TaskPayload {
        match self {
            TaskPlan::Inline { task, .. } | TaskPlan::ClaimCheck { task, .. } => task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::fixtures::{github_envelope, telegram_envelope};

    fn serialized_len(envelope: &EventEnvelope) -> usize {
        serde_json::to_vec(envelope).unwrap().len()
    }

    #[test]
    fn envelope_at_exactly_the_threshold_is_inline() {
        let envelope = github_envelope("/label bug");
        let size = serialized_len(&envelope);

        let plan = TaskPlan::for_envelope(&envelope, size, Timestamp::now()).unwrap();
        assert_eq!(plan.mode(), PayloadMode::Inline);
    }

    #[test]
    fn envelope_one_byte_over_the_threshold_is_claim_checked() {
        let envelope = github_envelope("/label bug");
        let size = serialized_len(&envelope);

        let plan = TaskPlan::for_envelope(&envelope, size - 1, Timestamp::now()).unwrap();
        match plan {
            TaskPlan::ClaimCheck { key, blob, task } => {
                assert_eq!(blob.len(), size);
                assert_eq!(
                    key.as_str(),
                    format!("payloads/{}.json", envelope.correlation_id())
                );
                assert_eq!(task.correlation_id(), envelope.correlation_id());
            }
            TaskPlan::Inline { .. } => panic!("expected claim-check"),
        }
    }

    #[test]
    fn large_text_goes_through_the_claim_check_by_default() {
        let envelope = telegram_envelope(&"x".repeat(DEFAULT_CLAIM_CHECK_THRESHOLD));
        let plan =
            TaskPlan::for_envelope(&envelope, DEFAULT_CLAIM_CHECK_THRESHOLD, Timestamp::now()).unwrap();
        assert_eq!(plan.mode(), PayloadMode::ClaimCheck);
    }

    #[test]
    fn claim_check_blob_decodes_to_the_original_envelope() {
        let envelope = github_envelope("a long comment");
        let plan = TaskPlan::for_envelope(&envelope, 0, Timestamp::now()).unwrap();
        let TaskPlan::ClaimCheck { blob, .. } = plan else {
            panic!("expected claim-check");
        };
        let decoded: EventEnvelope = serde_json::from_slice(&blob).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn task_payload_is_tagged_by_mode() {
        let envelope = telegram_envelope("hi");
        let plan = TaskPlan::for_envelope(&envelope, usize::MAX, Timestamp::now()).unwrap();
        let json = serde_json::to_value(plan.task()).unwrap();
        assert_eq!(json["mode"], "inline");
        assert_eq!(json["correlation_id"], envelope.correlation_id().as_str());

        let plan = TaskPlan::for_envelope(&envelope, 0, Timestamp::now()).unwrap();
        let json = serde_json::to_value(plan.task()).unwrap();
        assert_eq!(json["mode"], "claim_check");
        assert_eq!(json["routing"]["source"], "telegram");
        assert!(json.get("envelope").is_none());
    }
}
