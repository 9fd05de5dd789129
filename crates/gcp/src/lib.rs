//! Durable-primitive adapters.
//!
//! Implements the storage-facing traits defined in the [`domain`] crate
//! against Google Cloud REST APIs:
//!
//! | Trait | Adapter | Service |
//! |-------|---------|---------|
//! | [`domain::IdempotencyLedger`] | [`FirestoreLedger`] | Firestore (create-if-absent document) |
//! | [`domain::ClaimCheckStore`] | [`GcsClaimCheckStore`] | Cloud Storage objects |
//! | [`domain::TaskQueue`] | [`CloudTasksQueue`] | Cloud Tasks HTTP targets |
//! | [`domain::SecretSource`] | [`SecretManagerSource`] / [`EnvSecretSource`] | Secret Manager / process environment |
//!
//! [`memory`] provides in-process equivalents of the ledger, store and queue
//! for local runs and tests.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Access tokens, REST framing and status mapping live
//! here. The gateway and worker see only the [`domain`] traits.

pub mod auth;
pub mod firestore;
pub mod memory;
pub mod secrets;
pub mod storage;
pub mod tasks;

mod http;

pub use auth::{AccessTokenSource, MetadataTokenSource, StaticTokenSource};
pub use firestore::FirestoreLedger;
pub use memory::{InMemoryClaimCheckStore, InMemoryLedger, InMemoryTaskQueue};
pub use secrets::{EnvSecretSource, SecretManagerSource};
pub use storage::GcsClaimCheckStore;
pub use tasks::{CloudTasksQueue, QueueTarget};
