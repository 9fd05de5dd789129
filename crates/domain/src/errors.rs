//! Error taxonomy and retry-policy types shared across the airlock.
//!
//! [`ErrorCategory`] is the coarse classification every failure maps onto; it
//! decides whether the gateway rejects, accepts-and-drops, or degrades, and it
//! is the only error text that may reach a user-visible comment.
//!
//! [`StoreError`] covers the durable collaborators (ledger, claim-check store,
//! queue, secret source). [`ApiError`] covers outbound HTTP APIs and produces a
//! [`RetryPolicy`] so callers can decide whether to back off and retry.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Taxonomy
// ---------------------------------------------------------------------------

/// Coarse failure classification.
///
/// Security checks ([`ErrorCategory::AuthenticationFailure`]) and idempotency
/// ([`ErrorCategory::DuplicateDelivery`]) are never soft-failed; the remaining
/// categories are contained and surfaced as a logged drop, a user-visible
/// comment, or a retryable task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad or missing signature or token. Rejected at the boundary.
    AuthenticationFailure,
    /// Idempotency conflict. Accepted and dropped.
    DuplicateDelivery,
    /// Unparseable JSON or missing required fields. Accepted and dropped.
    MalformedInput,
    /// Wrong event type/action, bot author, loop marker, non-owner command.
    PolicyFiltered,
    /// Ledger, store, queue, credential, or API call failure.
    DependencyFailure,
}

impl ErrorCategory {
    /// Stable snake-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::AuthenticationFailure => "authentication_failure",
            ErrorCategory::DuplicateDelivery => "duplicate_delivery",
            ErrorCategory::MalformedInput => "malformed_input",
            ErrorCategory::PolicyFiltered => "policy_filtered",
            ErrorCategory::DependencyFailure => "dependency_failure",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Returned by [`ApiError::retry_policy`] to let the outbound-call retry loop
/// decide whether to re-invoke an operation.
///
/// - `Retryable` errors: rate-limit responses only.
/// - `NonRetryable` errors: every other HTTP error, timeouts, transport
///   failures, and malformed responses. These propagate immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    ///
    /// `after` optionally specifies the minimum delay before retrying (e.g.
    /// derived from a `Retry-After` response header).
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Durable collaborator errors
// ---------------------------------------------------------------------------

/// Failures of the ledger, claim-check store, task queue, or secret source.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested key does not exist.
    #[error("not found: {key}")]
    NotFound {
        /// The key that was looked up.
        key: String,
    },

    /// The backing service could not be reached or refused the operation.
    #[error("store unavailable: {message}")]
    Unavailable {
        /// Description of the failure (never contains payload contents).
        message: String,
    },

    /// Stored bytes could not be decoded.
    #[error("stored value is corrupt: {message}")]
    Corrupt {
        /// Description of the decoding failure.
        message: String,
    },
}

impl StoreError {
    /// Convenience constructor for [`StoreError::Unavailable`].
    pub fn unavailable(message: impl Into<String>) -> Self {
        StoreError::Unavailable { message: message.into() }
    }
}

// ---------------------------------------------------------------------------
// Outbound API errors
// ---------------------------------------------------------------------------

/// Failures of outbound HTTP calls (issue tracker, chat platform, language
/// model, credential exchange).
#[derive(Debug, Error)]
pub enum ApiError {
    /// The API signalled a rate limit.
    #[error("rate limited (HTTP {status})")]
    RateLimited {
        /// HTTP status that carried the rate-limit signal (429 or 403).
        status: u16,
        /// Delay requested by the API, if it sent one.
        retry_after: Option<Duration>,
    },

    /// The API returned a non-success status that is not a rate limit.
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Short description (API error message, truncated).
        message: String,
    },

    /// The call did not complete within its timeout.
    #[error("request timed out")]
    Timeout,

    /// The request could not be sent or the response could not be read.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// The API answered with a body that does not match its contract.
    #[error("invalid response: {message}")]
    InvalidResponse {
        /// Description of what was missing or malformed.
        message: String,
    },

    /// Credential material could not be loaded or used.
    #[error("credential error: {message}")]
    Credential {
        /// Description of the credential problem (never the secret itself).
        message: String,
    },
}

impl ApiError {
    /// Only rate limits are retried; everything else propagates immediately.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            ApiError::RateLimited { retry_after, .. } => RetryPolicy::Retryable { after: *retry_after },
            _ => RetryPolicy::NonRetryable,
        }
    }

    /// Short, stable name of the variant; safe to show to users.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::Status { .. } => "http_status",
            ApiError::Timeout => "timeout",
            ApiError::Transport { .. } => "transport",
            ApiError::InvalidResponse { .. } => "invalid_response",
            ApiError::Credential { .. } => "credential",
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Credential { message: err.to_string() }
    }
}
