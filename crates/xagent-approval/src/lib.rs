//! # xagent-approval
//!
//! Smart approval for xAgent tool calls.
//!
//! Tool calls pass three tiers in order, stopping at the first verdict:
//! 1. [`Whitelist`]: read-only tools are approved outright
//! 2. [`Blacklist`]: dangerous shell commands and system-directory writes
//!    require confirmation
//! 3. [`AiReviewer`]: a model classifies the rest, failing closed
//!
//! [`ToolGate`] applies the configured approval mode on top of the engine.

mod blacklist;
mod engine;
mod gate;
mod reviewer;
mod types;
mod whitelist;

pub use blacklist::{Blacklist, BlacklistRule, ThreatCategory, FILE_TOOLS, SHELL_TOOLS, SYSTEM_DIRS};
pub use engine::ApprovalEngine;
pub use gate::{Confirmer, ToolGate};
pub use reviewer::{AiReviewer, ToolReviewer};
pub use types::{ApprovalResult, Decision, DetectionMethod, RiskLevel, ToolCall, Verdict};
pub use whitelist::{ToolChecker, Whitelist, SAFE_TOOLS};
