//! Smart approval engine
//!
//! Evaluates whitelist, blacklist, then AI review, stopping at the first
//! tier with a verdict. The reported latency is measured from the start of
//! evaluation, so it includes every tier consulted.

use crate::blacklist::Blacklist;
use crate::reviewer::{AiReviewer, ToolReviewer};
use crate::types::{ApprovalResult, DetectionMethod, ToolCall};
use crate::whitelist::{ToolChecker, Whitelist};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use xagent_core::ApprovalSettings;
use xagent_model::ModelCaller;

/// Three-tier classifier for tool calls
pub struct ApprovalEngine {
    whitelist: Arc<dyn ToolChecker>,
    blacklist: Arc<dyn ToolChecker>,
    reviewer: Arc<dyn ToolReviewer>,
}

impl ApprovalEngine {
    pub fn new(
        whitelist: Arc<dyn ToolChecker>,
        blacklist: Arc<dyn ToolChecker>,
        reviewer: Arc<dyn ToolReviewer>,
    ) -> Self {
        Self {
            whitelist,
            blacklist,
            reviewer,
        }
    }

    /// Built-in tiers with a model-backed reviewer
    pub fn with_model(model: Arc<dyn ModelCaller>, settings: &ApprovalSettings) -> Self {
        Self::new(
            Arc::new(Whitelist::with_extra(&settings.extra_safe_tools)),
            Arc::new(Blacklist::default()),
            Arc::new(AiReviewer::new(model)),
        )
    }

    /// Classify a tool call
    pub async fn evaluate(&self, call: &ToolCall) -> ApprovalResult {
        let start = Instant::now();
        let elapsed = || start.elapsed().as_millis() as u64;

        if let Some(verdict) = self.whitelist.check(call) {
            debug!("{} approved by whitelist", call.name);
            return ApprovalResult::from_verdict(verdict, DetectionMethod::Whitelist, elapsed());
        }

        if let Some(verdict) = self.blacklist.check(call) {
            info!(
                "{} matched blacklist ({}): {}",
                call.name, verdict.risk_level, verdict.description
            );
            return ApprovalResult::from_verdict(verdict, DetectionMethod::Blacklist, elapsed());
        }

        debug!("{} not classified by rules after {}ms, asking AI review", call.name, elapsed());
        let verdict = self.reviewer.review(call).await;
        info!(
            "{} AI review: {} ({})",
            call.name, verdict.decision, verdict.risk_level
        );
        ApprovalResult::from_verdict(verdict, DetectionMethod::AiReview, elapsed())
    }
}
