//! Tool gate: applies the approval mode before a tool runs

use crate::engine::ApprovalEngine;
use crate::types::{ApprovalResult, Decision, DetectionMethod, RiskLevel, ToolCall};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};
use xagent_core::{ApprovalMode, Result, XAgentError};

/// Interactive yes/no prompt
#[async_trait]
pub trait Confirmer: Send + Sync {
    /// Ask whether `call` may run. `assessment` is the engine's result in
    /// smart mode, `None` in manual mode.
    async fn confirm(&self, call: &ToolCall, assessment: Option<&ApprovalResult>) -> Result<bool>;
}

/// Gate in front of tool execution
pub struct ToolGate {
    mode: ApprovalMode,
    engine: ApprovalEngine,
    confirmer: Arc<dyn Confirmer>,
}

impl ToolGate {
    pub fn new(mode: ApprovalMode, engine: ApprovalEngine, confirmer: Arc<dyn Confirmer>) -> Self {
        Self {
            mode,
            engine,
            confirmer,
        }
    }

    pub fn mode(&self) -> ApprovalMode {
        self.mode
    }

    /// Decide whether `call` may run
    ///
    /// Returns the approving result, or `ToolRejected` when the engine
    /// rejects the call or the user declines it.
    pub async fn authorize(&self, call: &ToolCall) -> Result<ApprovalResult> {
        match self.mode {
            ApprovalMode::Yolo => Ok(ApprovalResult {
                decision: Decision::Approved,
                risk_level: RiskLevel::Low,
                detection_method: DetectionMethod::Manual,
                description: "Approved without review (yolo mode)".to_string(),
                latency_ms: 0,
            }),
            ApprovalMode::Manual => {
                let assessment = ApprovalResult {
                    decision: Decision::RequiresConfirmation,
                    risk_level: RiskLevel::Medium,
                    detection_method: DetectionMethod::Manual,
                    description: "Manual approval mode".to_string(),
                    latency_ms: 0,
                };
                self.ask(call, None, assessment).await
            }
            ApprovalMode::Smart => {
                let result = self.engine.evaluate(call).await;
                match result.decision {
                    Decision::Approved => Ok(result),
                    Decision::Rejected => {
                        warn!("{} rejected: {}", call.name, result.description);
                        Err(XAgentError::ToolRejected(format!(
                            "{}: {} ({} risk)",
                            call.name, result.description, result.risk_level
                        )))
                    }
                    Decision::RequiresConfirmation => {
                        let shown = result.clone();
                        self.ask(call, Some(&shown), result).await
                    }
                }
            }
        }
    }

    async fn ask(
        &self,
        call: &ToolCall,
        shown: Option<&ApprovalResult>,
        assessment: ApprovalResult,
    ) -> Result<ApprovalResult> {
        if self.confirmer.confirm(call, shown).await? {
            info!("{} confirmed by user", call.name);
            Ok(ApprovalResult {
                decision: Decision::Approved,
                detection_method: DetectionMethod::Manual,
                description: format!("Confirmed by user: {}", assessment.description),
                ..assessment
            })
        } else {
            info!("{} declined by user", call.name);
            Err(XAgentError::ToolRejected(format!("{}: declined by user", call.name)))
        }
    }
}
