//! Tier 2: dangerous-operation blacklist
//!
//! Shell commands are matched against an ordered rule table and the first
//! matching rule wins. File-mutation tools are matched by target path
//! against system directories. A match never rejects outright; it asks for
//! confirmation with the rule's risk level.

use crate::types::{Decision, RiskLevel, ToolCall, Verdict};
use crate::whitelist::ToolChecker;
use regex::Regex;
use serde::{Deserialize, Serialize};
use xagent_core::{Result, XAgentError};
use RiskLevel::{Critical, High, Medium};
use ThreatCategory::*;

/// What a blacklisted command threatens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    SystemDestruction,
    PrivilegeEscalation,
    DataExfiltration,
    NetworkAttack,
    ResourceExhaustion,
}

/// One command rule
#[derive(Debug, Clone)]
pub struct BlacklistRule {
    pattern: Regex,
    pub category: ThreatCategory,
    pub risk_level: RiskLevel,
    pub description: String,
}

impl BlacklistRule {
    pub fn new(
        pattern: &str,
        category: ThreatCategory,
        risk_level: RiskLevel,
        description: impl Into<String>,
    ) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| XAgentError::Config(format!("Invalid blacklist pattern '{}': {}", pattern, e)))?;
        Ok(Self {
            pattern,
            category,
            risk_level,
            description: description.into(),
        })
    }

    pub fn matches(&self, command: &str) -> bool {
        self.pattern.is_match(command)
    }
}

/// Built-in command rules, in match order
const COMMAND_RULES: &[(&str, ThreatCategory, RiskLevel, &str)] = &[
    (
        r"\brm\s+(?:-{1,2}[a-zA-Z-]+\s+)*(?:/\*?|~/?|\$HOME/?)(?:\s|;|&|$)",
        SystemDestruction,
        Critical,
        "Recursive deletion of the root or home directory",
    ),
    (r"\bmkfs(?:\.\w+)?\b", SystemDestruction, Critical, "Formats a filesystem"),
    (r"\bdd\b.*\bof=/dev/", SystemDestruction, Critical, "Overwrites a raw device"),
    (r">\s*/dev/(?:sd|hd|nvme|disk)", SystemDestruction, Critical, "Redirects output onto a disk device"),
    (
        r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
        ResourceExhaustion,
        Critical,
        "Fork bomb",
    ),
    (
        r"\b(?:nc|ncat|netcat)\b.*\s-[a-z]*e\s",
        NetworkAttack,
        Critical,
        "Opens a reverse shell",
    ),
    (
        r"\bchmod\s+(?:-R\s+)?0?777\s+/(?:\s|$)",
        SystemDestruction,
        High,
        "Makes the root directory world-writable",
    ),
    (
        r"\b(?:curl|wget)\b[^|]*\|\s*(?:sudo\s+)?(?:sh|bash|zsh)\b",
        NetworkAttack,
        High,
        "Pipes a downloaded script into a shell",
    ),
    (r"\bsudo\b", PrivilegeEscalation, High, "Runs a command as root"),
    (r"\bsu\s+(?:-|root\b)", PrivilegeEscalation, High, "Switches to the root user"),
    (r"\bchmod\s+[ugoa]*\+s\b", PrivilegeEscalation, High, "Sets the setuid bit"),
    (
        r"(?:/etc/shadow|\.ssh/id_[a-z0-9]+|\.aws/credentials)",
        DataExfiltration,
        High,
        "Accesses credential files",
    ),
    (
        r"\b(?:curl|wget)\b.*(?:\s-d\s*@|--data(?:-binary)?\s*@|\s-F\s|--upload-file|\s-T\s)",
        DataExfiltration,
        High,
        "Uploads local data to a remote server",
    ),
    (r"\b(?:scp|rsync)\b.*\S+@\S+:", DataExfiltration, Medium, "Copies files to a remote host"),
    (r"\b(?:nmap|masscan|hping3)\b", NetworkAttack, High, "Scans or floods the network"),
    (
        r"\b(?:shutdown|reboot|halt|poweroff)\b",
        SystemDestruction,
        High,
        "Shuts down or restarts the machine",
    ),
    (r"\bkill(?:all)?\s+-9\s+-1\b", ResourceExhaustion, High, "Kills every process"),
    (r"\brm\s+-{1,2}[a-zA-Z-]*[rR]", SystemDestruction, Medium, "Recursive deletion"),
    (
        r"\bgit\s+(?:push\s+.*--force|reset\s+--hard)",
        SystemDestruction,
        Medium,
        "Discards version-control history",
    ),
];

/// Tools whose `command` parameter is run by a shell
pub const SHELL_TOOLS: &[&str] = &["Bash"];

/// Tools that write to the path in their parameters
pub const FILE_TOOLS: &[&str] = &["Write", "Edit", "MultiEdit", "NotebookEdit"];

/// System directories file tools must not touch unconfirmed
pub const SYSTEM_DIRS: &[&str] = &[
    "/etc", "/usr", "/bin", "/sbin", "/boot", "/sys", "/proc", "/dev", "/lib", "/lib64", "/var",
    "/System", "/Library", "C:\\Windows",
];

/// Rule-based blacklist
#[derive(Debug, Clone)]
pub struct Blacklist {
    rules: Vec<BlacklistRule>,
}

impl Blacklist {
    /// Empty blacklist
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a command rule after the existing ones
    pub fn with_rule(mut self, rule: BlacklistRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// First rule matching `command`
    pub fn match_command(&self, command: &str) -> Option<&BlacklistRule> {
        self.rules.iter().find(|rule| rule.matches(command))
    }

    /// System directory containing `path`, if any
    ///
    /// Both sides are normalized first: `.` and `..` are resolved lexically,
    /// separators become `/` and case is folded.
    pub fn match_path(path: &str) -> Option<&'static str> {
        let path = normalize_path(path);
        SYSTEM_DIRS.iter().copied().find(|dir| {
            let dir = normalize_path(dir);
            path == dir
                || path
                    .strip_prefix(dir.as_str())
                    .map(|rest| rest.starts_with('/'))
                    .unwrap_or(false)
        })
    }
}

fn normalize_path(path: &str) -> String {
    let rooted = path.starts_with('/') || path.starts_with('\\');
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                // Never climb above a drive letter
                if !matches!(parts.as_slice(), [drive] if drive.ends_with(':')) {
                    parts.pop();
                }
            }
            part => parts.push(part),
        }
    }

    let joined = parts.join("/").to_lowercase();
    if rooted {
        format!("/{}", joined)
    } else {
        joined
    }
}

impl Default for Blacklist {
    fn default() -> Self {
        let rules = COMMAND_RULES
            .iter()
            .map(|(pattern, category, risk, description)| {
                BlacklistRule::new(pattern, *category, *risk, *description)
                    .expect("built-in blacklist patterns are valid")
            })
            .collect();
        Self { rules }
    }
}

impl ToolChecker for Blacklist {
    fn check(&self, call: &ToolCall) -> Option<Verdict> {
        if SHELL_TOOLS.contains(&call.name.as_str()) {
            let command = call.command()?;
            let rule = self.match_command(command)?;
            return Some(Verdict::new(
                Decision::RequiresConfirmation,
                rule.risk_level,
                rule.description.clone(),
            ));
        }

        if FILE_TOOLS.contains(&call.name.as_str()) {
            let dir = Self::match_path(call.file_path()?)?;
            return Some(Verdict::new(
                Decision::RequiresConfirmation,
                RiskLevel::High,
                format!("Modifies system directory {}", dir),
            ));
        }

        None
    }
}
