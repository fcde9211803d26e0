//! Tier 3: AI review
//!
//! Asks a language model to classify the call. The reviewer is fail-closed:
//! a model error, an answer without a parseable JSON object, or an answer
//! holding more than one object yields "not approved, MEDIUM", never an
//! approval.

use crate::types::{Decision, RiskLevel, ToolCall, Verdict};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use xagent_core::{Result, ScreenContext, XAgentError};
use xagent_model::{ChatMessage, ModelCaller};

/// Asynchronous last-resort tier. Always produces a verdict.
#[async_trait]
pub trait ToolReviewer: Send + Sync {
    async fn review(&self, call: &ToolCall) -> Verdict;
}

const REVIEW_SYSTEM_PROMPT: &str = "You are a security reviewer for an AI coding agent. \
You are shown one tool call the agent wants to make. Decide whether it is safe to run \
without asking the user. Answer with strict JSON only, no prose:\n\
{\"approved\": true|false, \"riskLevel\": \"LOW\"|\"MEDIUM\"|\"HIGH\"|\"CRITICAL\", \"analysis\": \"one sentence\"}";

#[derive(Debug, Deserialize)]
struct ReviewAnswer {
    approved: bool,
    #[serde(rename = "riskLevel", alias = "risk_level")]
    risk_level: RiskLevel,
    #[serde(default)]
    analysis: String,
}

/// Every complete JSON object embedded in `text`, in order
fn json_objects(text: &str) -> Vec<Value> {
    let mut objects = Vec::new();
    let mut from = 0;

    while let Some(offset) = text[from..].find('{') {
        let start = from + offset;
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) => {
                objects.push(value);
                from = start + stream.byte_offset();
            }
            _ => from = start + 1,
        }
    }

    objects
}

/// Parse the single JSON object in a model answer
fn parse_answer(text: &str) -> Result<ReviewAnswer> {
    let mut objects = json_objects(text);
    match objects.len() {
        0 => Err(XAgentError::Parse("no JSON object in review answer".to_string())),
        1 => serde_json::from_value(objects.remove(0))
            .map_err(|e| XAgentError::Parse(format!("invalid review answer: {}", e))),
        n => Err(XAgentError::Parse(format!(
            "ambiguous review answer: {} JSON objects",
            n
        ))),
    }
}

/// Map a review answer to a verdict
fn verdict_from_answer(answer: ReviewAnswer) -> Verdict {
    let decision = match (answer.approved, answer.risk_level) {
        (true, _) => Decision::Approved,
        (false, RiskLevel::Critical) => Decision::Rejected,
        (false, _) => Decision::RequiresConfirmation,
    };
    let description = if answer.analysis.is_empty() {
        format!("AI review: {} risk", answer.risk_level)
    } else {
        answer.analysis
    };
    Verdict::new(decision, answer.risk_level, description)
}

/// Fail-closed verdict for a review that could not be completed
fn fail_closed(reason: &str) -> Verdict {
    Verdict::new(
        Decision::RequiresConfirmation,
        RiskLevel::Medium,
        format!("AI review unavailable ({}); confirmation required", reason),
    )
}

/// Model-backed reviewer
pub struct AiReviewer {
    model: Arc<dyn ModelCaller>,
}

impl AiReviewer {
    pub fn new(model: Arc<dyn ModelCaller>) -> Self {
        Self { model }
    }

    fn build_prompt(call: &ToolCall) -> String {
        let params = serde_json::to_string_pretty(&call.params).unwrap_or_else(|_| call.params.to_string());
        format!("Tool: {}\nParameters:\n{}", call.name, params)
    }
}

#[async_trait]
impl ToolReviewer for AiReviewer {
    async fn review(&self, call: &ToolCall) -> Verdict {
        let messages = [
            ChatMessage::system(REVIEW_SYSTEM_PROMPT),
            ChatMessage::user(Self::build_prompt(call)),
        ];

        let text = match self.model.invoke(&messages, &ScreenContext::default()).await {
            Ok(text) => text,
            Err(e) => {
                warn!("AI review of {} failed: {}", call.name, e);
                return fail_closed(&e.to_string());
            }
        };

        match parse_answer(&text) {
            Ok(answer) => {
                debug!(
                    "AI review of {}: approved={} risk={}",
                    call.name, answer.approved, answer.risk_level
                );
                verdict_from_answer(answer)
            }
            Err(e) => {
                warn!("AI review of {} unparseable: {}", call.name, e);
                fail_closed(&e.to_string())
            }
        }
    }
}
