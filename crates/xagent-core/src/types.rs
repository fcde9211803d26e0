//! Core type definitions for GUI agent runs

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Placeholder text stored on screenshot entries
pub const IMAGE_PLACEHOLDER: &str = "<image>";

/// Status of a GUI agent run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    #[default]
    Init,
    Running,
    Paused,
    /// The operator needs a fresh model call; the caller re-invokes `run()`
    CallLlm,
    /// A `call_user` action asked for human help
    CallUser,
    End,
    Error,
    UserStopped,
}

impl AgentStatus {
    /// Whether this status ends a `run()` invocation
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::CallLlm | Self::CallUser | Self::End | Self::Error | Self::UserStopped
        )
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::CallLlm => write!(f, "call_llm"),
            Self::CallUser => write!(f, "call_user"),
            Self::End => write!(f, "end"),
            Self::Error => write!(f, "error"),
            Self::UserStopped => write!(f, "user_stopped"),
        }
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "init" => Ok(Self::Init),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "call_llm" => Ok(Self::CallLlm),
            "call_user" => Ok(Self::CallUser),
            "end" => Ok(Self::End),
            "error" => Ok(Self::Error),
            "user_stopped" | "userstopped" => Ok(Self::UserStopped),
            _ => Err(format!("Invalid status: {}", s)),
        }
    }
}

/// Who produced a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Human,
    Assistant,
}

/// Screen geometry reported by the operator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenContext {
    pub width: u32,
    pub height: u32,
    pub scale_factor: f64,
}

impl Default for ScreenContext {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            scale_factor: 1.0,
        }
    }
}

/// A captured screenshot, owned by exactly one transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screenshot {
    /// Base64-encoded image bytes
    pub base64: String,
    pub width: u32,
    pub height: u32,
    pub scale_factor: f64,
}

impl Screenshot {
    /// Render as a data URL for multimodal messages
    pub fn data_url(&self) -> String {
        format!("data:image/png;base64,{}", self.base64)
    }
}

/// Wall-clock timing in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub start: i64,
    pub end: i64,
    pub duration: i64,
}

impl Timing {
    /// Timing from a start timestamp to now
    pub fn since(start: i64) -> Self {
        let end = now_millis();
        Self {
            start,
            end,
            duration: end - start,
        }
    }

    /// Zero-length timing at the current instant
    pub fn instant() -> Self {
        Self::since(now_millis())
    }
}

/// Current wall-clock time in milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// A structured action extracted from model text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionPrediction {
    pub action_type: String,
    #[serde(default)]
    pub action_inputs: BTreeMap<String, serde_json::Value>,
    /// Reasoning the model gave before the action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
}

impl ActionPrediction {
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            ..Default::default()
        }
    }
}

/// One entry in the run transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub origin: Origin,
    /// Instruction text, image placeholder, or the model's action summary
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<Screenshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_actions: Option<Vec<ActionPrediction>>,
    pub timing: Timing,
}

impl ConversationEntry {
    /// The user's instruction
    pub fn instruction(text: impl Into<String>) -> Self {
        Self {
            origin: Origin::Human,
            text: text.into(),
            screenshot: None,
            parsed_actions: None,
            timing: Timing::instant(),
        }
    }

    /// A human entry carrying a fresh screenshot
    pub fn screenshot(screenshot: Screenshot, timing: Timing) -> Self {
        Self {
            origin: Origin::Human,
            text: IMAGE_PLACEHOLDER.to_string(),
            screenshot: Some(screenshot),
            parsed_actions: None,
            timing,
        }
    }

    /// The model's answer with the actions parsed from it
    pub fn assistant(summary: impl Into<String>, actions: Vec<ActionPrediction>, timing: Timing) -> Self {
        Self {
            origin: Origin::Assistant,
            text: summary.into(),
            screenshot: None,
            parsed_actions: Some(actions),
            timing,
        }
    }
}

/// Status-bearing notification handed to run observers
///
/// `transcript` holds only the entries new since the previous update, so an
/// empty list is a status-only notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunUpdate {
    pub status: AgentStatus,
    pub transcript: Vec<ConversationEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
