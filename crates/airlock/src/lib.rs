//! Event airlock gateway.
//!
//! The gateway is the only component exposed to the two untrusted event
//! sources. Each request runs through a fixed sequence of gates
//! ([`GateStage`]): signature check, idempotency ledger, parse and filter,
//! size-based claim-check decision, and finally task submission. Every gate
//! has a named early exit ([`Admission`]), and every exit except the first two
//! answers `202 Accepted` so the sources never retry-storm on local failures.
//!
//! ## Architectural Layer
//!
//! **HTTP surface + orchestration.** Collaborators (ledger, claim-check store,
//! task queue) are injected as [`domain`] trait objects; this crate performs no
//! cloud I/O of its own.
//!
//! ## Endpoints
//!
//! - `POST /webhook/github` (alias `POST /webhook`) - git-host deliveries
//! - `POST /webhook/telegram` - chat-platform updates
//! - `GET /health` - liveness

pub mod gateway;
pub mod http;

pub use gateway::{Admission, Airlock, AirlockConfig, GateStage, GitHubDelivery, TelegramDelivery};
pub use http::{build_router, AppState};
