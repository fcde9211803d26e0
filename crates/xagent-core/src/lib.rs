//! # xagent-core
//!
//! Core types for the xAgent automation CLI.
//!
//! xAgent drives language-model calls, gates tool executions and runs a
//! screenshot-predict-act loop for GUI automation. This crate holds the pieces
//! every other crate shares:
//!
//! - the unified [`XAgentError`] type
//! - the settings file ([`XAgentConfig`])
//! - the GUI run data model (status, transcript entries, predictions)
//! - fail-open helpers for infrastructure work

pub mod config;
mod error;
pub mod fail_open;
mod types;

pub use config::{
    ApprovalMode, ApprovalSettings, GuiSettings, ModelSettings, ScreenshotFailurePolicy,
    XAgentConfig,
};
pub use error::{Result, XAgentError};
pub use types::*;
