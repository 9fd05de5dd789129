//! Core domain of the event airlock.
//!
//! This crate contains every domain concept shared by the gateway and the
//! worker: newtype identifiers, the unified event envelope, task payloads and
//! the claim-check decision, idempotency records, webhook authentication,
//! normalization, slash-command parsing and the loop guards, the error
//! taxonomy, and the collaborator traits. Infrastructure crates implement the
//! traits defined here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`DeliveryId`, `CorrelationId`, `IssueNumber`, etc.) |
//! | [`types`] | Shared value types (`EventSource`, `AuthorKind`, `Timestamp`) |
//! | [`errors`] | Error taxonomy and retry-policy types |
//! | [`envelope`] | `EventEnvelope` and its metadata/payload |
//! | [`ledger`] | Idempotency records and `CreateOutcome` |
//! | [`task`] | Task payloads and the inline vs. claim-check plan |
//! | [`signature`] | Webhook signature and shared-token verification |
//! | [`normalize`] | Raw webhook bodies to envelopes |
//! | [`commands`] | Slash-commands, authorization, bot and loop guards |
//! | [`ports`] | Collaborator traits |

pub mod commands;
pub mod envelope;
pub mod errors;
pub mod identifiers;
pub mod ledger;
pub mod normalize;
pub mod ports;
pub mod signature;
pub mod task;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use commands::{
    authorize, contains_loop_marker, parse_command, screen, Authorization, Command, CommandAction,
    LOOP_MARKER, LOOP_MARKER_TAG,
};
pub use envelope::{
    ChatMetadata, CommentPayload, EventEnvelope, EventMetadata, EventPayload, GitHubMetadata,
    MessagePayload, RoutingMetadata, GITHUB_COMMENT_CREATED, TELEGRAM_MESSAGE,
};
pub use errors::{ApiError, ErrorCategory, RetryPolicy, StoreError};
pub use identifiers::{
    ChatId, ChatUserId, CommentId, CorrelationId, DeliveryId, InstallationId, IssueNumber,
    MessageId, RepositoryName, SecretName, TaskName, TaskRunId, UpdateId, UserLogin,
};
pub use ledger::{CreateOutcome, DeliveryStatus, IdempotencyRecord, LedgerKey, RETENTION_HOURS};
pub use normalize::{
    normalize_github, normalize_telegram, probe_update_id, FilterReason, NormalizeError, Normalized,
};
pub use ports::{
    AccessToken, AccessTokenProvider, ChatMessenger, ClaimCheckStore, IdempotencyLedger,
    IssueTracker, LanguageModel, QueuedTask, SecretSource, SecretValue, TaskQueue,
};
pub use signature::{verify_hub_signature, verify_shared_token, TokenCheck};
pub use task::{ClaimCheckKey, PayloadMode, TaskPayload, TaskPlan, DEFAULT_CLAIM_CHECK_THRESHOLD};
pub use types::{AuthorKind, EventSource, Timestamp};
