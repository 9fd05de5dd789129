//! Event airlock worker.
//!
//! Receives task bodies from the queue, resolves claim-checks, re-applies the
//! bot and loop guards, and then either runs an owner-only slash-command or
//! consults the language model and records its answer on the tracking issue
//! (and, for chat-originated events, in the chat).
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** The dispatcher sequences calls to the collaborator
//! traits defined in [`domain`]; it contains no transport code of its own.
//!
//! ## Failure semantics
//!
//! | Step | On failure |
//! |------|------------|
//! | claim-check fetch | task fails, queue retries |
//! | installation token | task fails, queue retries |
//! | intake comment | logged, pipeline continues |
//! | model call | task fails, queue retries |
//! | response / command reply comment | task fails, queue retries |
//! | command mutation | failure comment, task succeeds |
//! | chat reply | best-effort failure comment, task succeeds |

pub mod dispatcher;
pub mod http;
pub mod messages;
pub mod steps;

#[cfg(test)]
mod end_to_end;
#[cfg(test)]
pub(crate) mod testkit;

pub use dispatcher::{
    CommandStatus, DispatchError, DispatchOutcome, Dispatcher, ProducedMessages, WorkerConfig,
};
pub use http::{build_router, AppState, CORRELATION_HEADER};
pub use steps::best_effort;
