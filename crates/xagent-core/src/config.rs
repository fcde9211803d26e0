//! Configuration management for xAgent
//!
//! Settings live in `.xagent/settings.toml` under a root directory. Every
//! field has a default, so a partial file (or no file at all) is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Result, XAgentError};

/// Relative location of the settings file
pub const SETTINGS_PATH: &str = ".xagent/settings.toml";

/// Top-level xAgent configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XAgentConfig {
    /// Language-model endpoint settings
    #[serde(default)]
    pub model: ModelSettings,

    /// GUI agent run loop settings
    #[serde(default)]
    pub gui: GuiSettings,

    /// Tool approval settings
    #[serde(default)]
    pub approval: ApprovalSettings,
}

/// Language-model endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name sent with each request
    #[serde(default = "default_model_name")]
    pub name: String,

    /// Environment variable containing the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Maximum tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// HTTP request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// What the run loop does when a screenshot fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenshotFailurePolicy {
    /// Give the iteration back and try again until `max_screenshot_errors`
    #[default]
    Retry,
    /// Fail the run on the first screenshot error
    Abort,
}

/// GUI agent run loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuiSettings {
    /// Iterations before the run fails with a loop-ceiling error
    #[serde(default = "default_max_loop_count")]
    pub max_loop_count: usize,

    /// Sleep between iterations
    #[serde(default)]
    pub loop_interval_ms: u64,

    /// Extra attempts for a failed model call
    #[serde(default)]
    pub model_max_retries: usize,

    #[serde(default = "default_model_retry_delay_ms")]
    pub model_retry_delay_ms: u64,

    /// Attempts per action before the run fails
    #[serde(default = "default_step_max_retries")]
    pub step_max_retries: usize,

    #[serde(default = "default_short_delay_ms")]
    pub step_retry_delay_ms: u64,

    /// Screenshot failures tolerated before the run fails
    #[serde(default = "default_max_screenshot_errors")]
    pub max_screenshot_errors: usize,

    #[serde(default = "default_short_delay_ms")]
    pub screenshot_error_delay_ms: u64,

    #[serde(default)]
    pub screenshot_failure_policy: ScreenshotFailurePolicy,

    /// Coordinate space of the vision model's boxes (width, height)
    #[serde(default = "default_factors")]
    pub factors: (f64, f64),

    /// Overrides the built-in GUI system prompt
    #[serde(default)]
    pub system_prompt: Option<String>,
}

/// How tool calls are gated before execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    /// Ask the user for every tool call
    Manual,
    /// Whitelist, blacklist, then AI review
    #[default]
    Smart,
    /// Approve everything
    Yolo,
}

impl std::fmt::Display for ApprovalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Smart => write!(f, "smart"),
            Self::Yolo => write!(f, "yolo"),
        }
    }
}

impl std::str::FromStr for ApprovalMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" | "default" => Ok(Self::Manual),
            "smart" => Ok(Self::Smart),
            "yolo" | "auto" => Ok(Self::Yolo),
            _ => Err(format!("Invalid approval mode: {}", s)),
        }
    }
}

/// Tool approval settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApprovalSettings {
    #[serde(default)]
    pub mode: ApprovalMode,

    /// Tool names added to the built-in safe list
    #[serde(default)]
    pub extra_safe_tools: Vec<String>,
}

// Default value providers
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model_name() -> String {
    "gpt-4o".to_string()
}

fn default_api_key_env() -> String {
    "XAGENT_API_KEY".to_string()
}

fn default_max_tokens() -> usize {
    4096
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_loop_count() -> usize {
    100
}

fn default_model_retry_delay_ms() -> u64 {
    30_000
}

fn default_step_max_retries() -> usize {
    3
}

fn default_short_delay_ms() -> u64 {
    1000
}

fn default_max_screenshot_errors() -> usize {
    5
}

fn default_factors() -> (f64, f64) {
    (1000.0, 1000.0)
}

impl XAgentConfig {
    /// Path of the settings file under `root`
    pub fn settings_path(root: &Path) -> PathBuf {
        root.join(SETTINGS_PATH)
    }

    /// Load configuration from `.xagent/settings.toml` or use defaults
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let path = Self::settings_path(root);

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            Self::from_toml(&content)
        } else {
            tracing::debug!("No settings file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| XAgentError::Config(format!("Failed to parse settings file: {}", e)))
    }

    /// Render configuration as TOML text
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| XAgentError::Config(format!("Failed to serialize settings: {}", e)))
    }

    /// Write default configuration to `.xagent/settings.toml`
    pub fn write_default(root: &Path) -> Result<PathBuf> {
        let path = Self::settings_path(root);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&path, Self::default().to_toml()?)?;
        Ok(path)
    }
}

impl ModelSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl GuiSettings {
    pub fn loop_interval(&self) -> Duration {
        Duration::from_millis(self.loop_interval_ms)
    }

    pub fn model_retry_delay(&self) -> Duration {
        Duration::from_millis(self.model_retry_delay_ms)
    }

    pub fn step_retry_delay(&self) -> Duration {
        Duration::from_millis(self.step_retry_delay_ms)
    }

    pub fn screenshot_error_delay(&self) -> Duration {
        Duration::from_millis(self.screenshot_error_delay_ms)
    }

    /// Settings with every sleep set to zero
    pub fn without_delays(mut self) -> Self {
        self.loop_interval_ms = 0;
        self.model_retry_delay_ms = 0;
        self.step_retry_delay_ms = 0;
        self.screenshot_error_delay_ms = 0;
        self
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            name: default_model_name(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for GuiSettings {
    fn default() -> Self {
        Self {
            max_loop_count: default_max_loop_count(),
            loop_interval_ms: 0,
            model_max_retries: 0,
            model_retry_delay_ms: default_model_retry_delay_ms(),
            step_max_retries: default_step_max_retries(),
            step_retry_delay_ms: default_short_delay_ms(),
            max_screenshot_errors: default_max_screenshot_errors(),
            screenshot_error_delay_ms: default_short_delay_ms(),
            screenshot_failure_policy: ScreenshotFailurePolicy::default(),
            factors: default_factors(),
            system_prompt: None,
        }
    }
}
