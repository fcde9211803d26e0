//! Approval data types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool call awaiting approval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub params: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// String parameter by key
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// Shell command of a command-execution tool
    pub fn command(&self) -> Option<&str> {
        self.param_str("command")
    }

    /// Target path of a file-mutation tool
    pub fn file_path(&self) -> Option<&str> {
        self.param_str("file_path")
            .or_else(|| self.param_str("path"))
            .or_else(|| self.param_str("notebook_path"))
    }
}

/// Approval decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    RequiresConfirmation,
    Rejected,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::RequiresConfirmation => write!(f, "requires_confirmation"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Risk of a tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    #[serde(alias = "low", alias = "Low")]
    Low,
    #[serde(alias = "medium", alias = "Medium")]
    Medium,
    #[serde(alias = "high", alias = "High")]
    High,
    #[serde(alias = "critical", alias = "Critical")]
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Tier that produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Whitelist,
    Blacklist,
    AiReview,
    /// Decided by a human, or by the approval mode itself
    Manual,
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Whitelist => write!(f, "whitelist"),
            Self::Blacklist => write!(f, "blacklist"),
            Self::AiReview => write!(f, "ai_review"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// What one tier concluded, before timing is attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub decision: Decision,
    pub risk_level: RiskLevel,
    pub description: String,
}

impl Verdict {
    pub fn new(decision: Decision, risk_level: RiskLevel, description: impl Into<String>) -> Self {
        Self {
            decision,
            risk_level,
            description: description.into(),
        }
    }
}

/// Outcome of evaluating one tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalResult {
    pub decision: Decision,
    pub risk_level: RiskLevel,
    pub detection_method: DetectionMethod,
    pub description: String,
    /// Time from the start of evaluation until the verdict
    pub latency_ms: u64,
}

impl ApprovalResult {
    pub fn from_verdict(verdict: Verdict, detection_method: DetectionMethod, latency_ms: u64) -> Self {
        Self {
            decision: verdict.decision,
            risk_level: verdict.risk_level,
            detection_method,
            description: verdict.description,
            latency_ms,
        }
    }

    pub fn approved(&self) -> bool {
        self.decision == Decision::Approved
    }
}
