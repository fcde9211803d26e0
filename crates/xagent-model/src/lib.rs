//! # xagent-model
//!
//! Language-model access for xAgent.
//!
//! - [`ModelCaller`]: the "messages in, text out" seam used by the GUI run
//!   loop and the AI-review approval tier
//! - [`HttpModelCaller`]: OpenAI-compatible chat-completion client with a
//!   per-instance circuit breaker
//! - [`ChatMessage`] / [`ContentBlock`]: typed text and image content
//! - [`classify_model_error`]: turns failures into actionable diagnostics
//! - [`retry_with_bail`]: bounded retry that never retries a cancellation

mod auth;
mod circuit_breaker;
mod classify;
mod client;
mod retry;
mod types;

pub use auth::{resolve_api_key, FALLBACK_API_KEY_ENV};
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use classify::{classify_model_error, extract_model_name, ModelErrorKind};
pub use client::{HttpModelCaller, ModelCaller};
pub use retry::{abortable, retry_with_bail, RetryPolicy};
pub use types::*;
