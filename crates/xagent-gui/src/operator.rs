//! Operator contract: the automation backend the run loop drives
//!
//! An operator captures screenshots and injects input. The loop never looks
//! behind this trait, so desktop, browser and replay backends are
//! interchangeable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use xagent_core::{ActionPrediction, Result, ScreenContext};

/// Outcome flag of a screenshot capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenshotStatus {
    Success,
    Failed,
}

/// Raw screenshot as returned by an operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotOutput {
    pub status: ScreenshotStatus,
    /// Base64-encoded image; `None` counts as a failed capture
    pub base64: Option<String>,
    pub scale_factor: Option<f64>,
    pub error_message: Option<String>,
}

impl ScreenshotOutput {
    pub fn success(base64: impl Into<String>, scale_factor: f64) -> Self {
        Self {
            status: ScreenshotStatus::Success,
            base64: Some(base64.into()),
            scale_factor: Some(scale_factor),
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ScreenshotStatus::Failed,
            base64: None,
            scale_factor: None,
            error_message: Some(message.into()),
        }
    }
}

/// Everything an operator needs to carry out one parsed action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteParams {
    /// Raw model text the action came from
    pub prediction: String,
    pub parsed_prediction: ActionPrediction,
    pub screen_width: u32,
    pub screen_height: u32,
    pub scale_factor: f64,
    /// Coordinate space of the model's boxes
    pub factors: (f64, f64),
}

/// What an executed action means for the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteStatus {
    /// Keep going
    #[default]
    Continue,
    /// The action completed the task
    End,
    /// Hand control back to the caller for a fresh model call
    NeedsInput,
}

/// Result of [`Operator::do_execute`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteOutput {
    pub status: ExecuteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ExecuteOutput {
    pub fn with_status(status: ExecuteStatus) -> Self {
        Self {
            status,
            message: None,
        }
    }
}

/// Automation backend
#[async_trait]
pub trait Operator: Send + Sync {
    /// Prepare the backend (attach to display, launch browser, ...)
    async fn do_initialize(&self) -> Result<()>;

    /// Capture the current screen
    async fn do_screenshot(&self) -> Result<ScreenshotOutput>;

    /// Current screen geometry
    async fn get_screen_context(&self) -> Result<ScreenContext>;

    /// Carry out one action
    async fn do_execute(&self, params: ExecuteParams) -> Result<ExecuteOutput>;

    /// Release resources. Must be safe to call more than once.
    async fn cleanup(&self) -> Result<()>;
}
