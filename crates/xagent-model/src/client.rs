//! Model callers
//!
//! The run loop and the approval engine only need "messages in, text out";
//! [`ModelCaller`] is that seam. [`HttpModelCaller`] talks to any
//! OpenAI-compatible chat-completion endpoint.

use crate::auth;
use crate::circuit_breaker::CircuitBreaker;
use crate::types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use async_trait::async_trait;
use xagent_core::{ModelSettings, Result, ScreenContext, XAgentError};

/// Something that turns a message list into model text
#[async_trait]
pub trait ModelCaller: Send + Sync {
    /// Call the model. `screen` is the geometry of the latest screenshot
    /// (default for non-GUI callers).
    async fn invoke(&self, messages: &[ChatMessage], screen: &ScreenContext) -> Result<String>;

    /// Name of the model, used in diagnostics
    fn model_name(&self) -> &str;
}

/// OpenAI-compatible chat-completion client
pub struct HttpModelCaller {
    http: reqwest::Client,
    settings: ModelSettings,
    api_key: String,
    circuit_breaker: CircuitBreaker,
}

impl HttpModelCaller {
    /// Create a caller, resolving the API key from the environment
    pub fn new(settings: ModelSettings) -> Result<Self> {
        let api_key = auth::resolve_api_key(&settings)?;
        Self::with_api_key(settings, api_key)
    }

    /// Create a caller with an explicit API key
    pub fn with_api_key(settings: ModelSettings, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| XAgentError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            settings,
            api_key: api_key.into(),
            circuit_breaker: CircuitBreaker::default(),
        })
    }

    /// Override the circuit breaker
    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreaker) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    /// Endpoint URL for chat completions
    pub fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }

    async fn send(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.settings.name,
            max_tokens: self.settings.max_tokens,
            messages,
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() {
                    "request timed out"
                } else if e.is_connect() {
                    "connection failed"
                } else {
                    "failed to send request"
                };
                XAgentError::model(format!("{}: {}", kind, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown".to_string());
            return Err(XAgentError::Model {
                status: Some(status.as_u16()),
                message: format!("{} {}", status, body),
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| XAgentError::model(format!("Failed to parse response: {}", e)))?;

        if let Some(usage) = &completion.usage {
            tracing::debug!(
                "Model {} used {} prompt tokens, {} completion tokens",
                self.settings.name,
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }

        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl ModelCaller for HttpModelCaller {
    async fn invoke(&self, messages: &[ChatMessage], screen: &ScreenContext) -> Result<String> {
        if !self.circuit_breaker.can_execute() {
            return Err(XAgentError::ApiLimit(format!(
                "Circuit breaker is OPEN - too many model failures. Wait {} seconds before retry.",
                self.circuit_breaker.time_until_retry().as_secs()
            )));
        }

        tracing::debug!(
            "Calling {} with {} messages (screen {}x{})",
            self.settings.name,
            messages.len(),
            screen.width,
            screen.height
        );

        match self.send(messages).await {
            Ok(text) => {
                self.circuit_breaker.record_success();
                tracing::info!("Model {} answered ({} chars)", self.settings.name, text.len());
                Ok(text)
            }
            Err(e) => {
                // Client errors say nothing about endpoint health
                if !matches!(e.status_code(), Some(400..=499)) {
                    self.circuit_breaker.record_failure();
                    tracing::error!(
                        "Circuit breaker: recorded failure (count: {})",
                        self.circuit_breaker.failure_count()
                    );
                }
                Err(e)
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.settings.name
    }
}
