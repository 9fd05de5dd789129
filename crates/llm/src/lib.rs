//! Language-model infrastructure adapter.
//!
//! Implements the [`domain::LanguageModel`] trait for Anthropic's Messages
//! API. Additional providers are added as new `impl` blocks in this crate
//! without any changes to the `domain` crate.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** All HTTP transport, request formatting and response
//! parsing live here. The worker sees only [`domain::LanguageModel`] and
//! treats the returned text as opaque.

pub mod anthropic;

pub use anthropic::{AnthropicProvider, ANTHROPIC_API_BASE, ANTHROPIC_VERSION, DEFAULT_MODEL};
