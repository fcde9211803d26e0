//! Tier 1: safe-tool whitelist

use crate::types::{Decision, RiskLevel, ToolCall, Verdict};
use std::collections::HashSet;

/// A synchronous approval tier. `None` means "no verdict, ask the next tier".
pub trait ToolChecker: Send + Sync {
    fn check(&self, call: &ToolCall) -> Option<Verdict>;
}

/// Read-only or sandboxed tools
pub const SAFE_TOOLS: &[&str] = &[
    "Read",
    "Glob",
    "Grep",
    "LS",
    "WebSearch",
    "WebFetch",
    "TodoRead",
    "TodoWrite",
    "NotebookRead",
    "ExitPlanMode",
];

/// Exact-name whitelist
#[derive(Debug, Clone)]
pub struct Whitelist {
    tools: HashSet<String>,
}

impl Whitelist {
    pub fn new<I, S>(tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tools: tools.into_iter().map(Into::into).collect(),
        }
    }

    /// Default safe set plus `extra`
    pub fn with_extra(extra: &[String]) -> Self {
        let mut whitelist = Self::default();
        whitelist.tools.extend(extra.iter().cloned());
        whitelist
    }

    pub fn contains(&self, tool: &str) -> bool {
        self.tools.contains(tool)
    }
}

impl Default for Whitelist {
    fn default() -> Self {
        Self::new(SAFE_TOOLS.iter().copied())
    }
}

impl ToolChecker for Whitelist {
    fn check(&self, call: &ToolCall) -> Option<Verdict> {
        self.contains(&call.name).then(|| {
            Verdict::new(
                Decision::Approved,
                RiskLevel::Low,
                format!("{} is a read-only tool", call.name),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_safe_tool_approved() {
        let verdict = Whitelist::default()
            .check(&ToolCall::new("Read", json!({"file_path": "/etc/passwd"})))
            .unwrap();
        assert_eq!(verdict.decision, Decision::Approved);
        assert_eq!(verdict.risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_match_is_exact() {
        let whitelist = Whitelist::default();
        assert!(whitelist.check(&ToolCall::new("read", json!({}))).is_none());
        assert!(whitelist.check(&ToolCall::new("Bash", json!({}))).is_none());
    }

    #[test]
    fn test_extra_tools() {
        let whitelist = Whitelist::with_extra(&["Screenshot".to_string()]);
        assert!(whitelist.contains("Screenshot"));
        assert!(whitelist.contains("Grep"));
    }
}
