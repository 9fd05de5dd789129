//! GitHub infrastructure adapter.
//!
//! Implements the GitHub-facing traits defined in the [`domain`] crate:
//! [`domain::AccessTokenProvider`] through [`AppTokenProvider`] (signed App
//! assertion exchanged for an installation token) and [`domain::IssueTracker`]
//! through [`GitHubClient`] (comments, labels, assignees).
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules.
//! All GitHub API details (rate limiting, timeouts, authentication headers)
//! are handled here; the [`domain`] crate never sees them.
//!
//! Every call goes through [`retry::retry_with_backoff`]: rate-limit responses
//! are retried up to three attempts with exponential backoff, everything else
//! propagates immediately.

pub mod auth;
pub mod client;
pub mod response;
pub mod retry;

pub use auth::{AppTokenProvider, GITHUB_API_BASE};
pub use client::GitHubClient;
pub use retry::{retry_with_backoff, RetryConfig};

/// Sent as `User-Agent` on every request; GitHub rejects requests without one.
pub const USER_AGENT: &str = "event-airlock";

/// Media type requested from the REST API.
pub const ACCEPT: &str = "application/vnd.github+json";
