//! Non-fatal pipeline steps.
//!
//! Fatal steps use `?` and fail the task so the queue redelivers it. Steps
//! whose failure must not fail the task go through [`best_effort`], which logs
//! the error and yields `None`.

use std::fmt::Display;
use std::future::Future;

use tracing::warn;

/// Awaits `call`; on error logs it under `step` and returns `None`.
pub async fn best_effort<T, E, F>(step: &'static str, call: F) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match call.await {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(step, error = %err, "non-fatal step failed, continuing");
            None
        }
    }
}
