//! Model-call failure classification
//!
//! Turns a failed model call into one of five categories, each with an
//! actionable message naming the setting to check. The HTTP status code is
//! used when the error carries one. Otherwise the message text is matched
//! against known substrings; that fallback is best-effort, since transport
//! libraries do not promise stable wording.

use regex::Regex;
use std::sync::OnceLock;
use xagent_core::XAgentError;

/// Category of a failed model call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelErrorKind {
    Authentication,
    RateLimit,
    Network,
    ModelNotFound { model: String },
    Generic { message: String },
}

impl ModelErrorKind {
    /// User-facing diagnostic for this category
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Authentication => "Authentication failed: the model endpoint rejected the API key. \
                 Check the variable named by model.api_key_env (default XAGENT_API_KEY)."
                .to_string(),
            Self::RateLimit => "Rate limit exceeded (429): the model endpoint is throttling requests. \
                 Wait before retrying or raise gui.model_max_retries."
                .to_string(),
            Self::Network => "Network error: could not reach the model endpoint. \
                 Check model.base_url and your network connection."
                .to_string(),
            Self::ModelNotFound { model } => format!(
                "Model not found (404): '{}' is not served by this endpoint. \
                 Check model.name and model.base_url.",
                model
            ),
            Self::Generic { message } => format!("Model call failed: {}", message),
        }
    }
}

fn quoted_model_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)model[\s:=]*[`'"]([^`'"\s]+)[`'"]"#).expect("model name regex is valid")
    })
}

/// Best-effort extraction of a model name from an error message
pub fn extract_model_name(message: &str) -> Option<String> {
    quoted_model_name()
        .captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Classify a model-call error
///
/// `configured_model` is reported for 404s whose message names no model.
pub fn classify_model_error(error: &XAgentError, configured_model: &str) -> ModelErrorKind {
    let message = match error {
        XAgentError::Auth(_) => return ModelErrorKind::Authentication,
        XAgentError::ApiLimit(_) => return ModelErrorKind::RateLimit,
        XAgentError::Model { message, .. } => message.clone(),
        other => other.to_string(),
    };

    let not_found = || ModelErrorKind::ModelNotFound {
        model: extract_model_name(&message).unwrap_or_else(|| configured_model.to_string()),
    };

    match error.status_code() {
        Some(401) | Some(403) => return ModelErrorKind::Authentication,
        Some(429) => return ModelErrorKind::RateLimit,
        Some(404) => return not_found(),
        _ => {}
    }

    let lower = message.to_lowercase();
    if lower.contains("401")
        || lower.contains("unauthorized")
        || lower.contains("api key")
        || lower.contains("api_key")
        || lower.contains("apikey")
    {
        ModelErrorKind::Authentication
    } else if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        ModelErrorKind::RateLimit
    } else if lower.contains("econnrefused")
        || lower.contains("enotfound")
        || lower.contains("etimedout")
        || lower.contains("network")
        || lower.contains("connection")
        || lower.contains("connect")
        || lower.contains("timed out")
        || lower.contains("dns")
    {
        ModelErrorKind::Network
    } else if lower.contains("404") || lower.contains("model not found") || lower.contains("does not exist") {
        not_found()
    } else {
        ModelErrorKind::Generic {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(text: &str) -> XAgentError {
        XAgentError::model(text)
    }

    #[test]
    fn test_status_code_takes_precedence() {
        let err = XAgentError::Model {
            status: Some(401),
            message: "connection closed".to_string(),
        };
        assert_eq!(classify_model_error(&err, "m"), ModelErrorKind::Authentication);

        let err = XAgentError::Model {
            status: Some(429),
            message: "slow down".to_string(),
        };
        assert_eq!(classify_model_error(&err, "m"), ModelErrorKind::RateLimit);
    }

    #[test]
    fn test_substring_fallbacks() {
        assert_eq!(
            classify_model_error(&msg("Request failed with status code 401"), "m"),
            ModelErrorKind::Authentication
        );
        assert_eq!(
            classify_model_error(&msg("Incorrect API key provided"), "m"),
            ModelErrorKind::Authentication
        );
        assert_eq!(
            classify_model_error(&msg("429 Too Many Requests"), "m"),
            ModelErrorKind::RateLimit
        );
        assert_eq!(
            classify_model_error(&msg("connect ECONNREFUSED 127.0.0.1:8000"), "m"),
            ModelErrorKind::Network
        );
    }

    #[test]
    fn test_not_found_extracts_model_name() {
        let err = XAgentError::Model {
            status: Some(404),
            message: "The model `ui-tars-72b` does not exist".to_string(),
        };
        assert_eq!(
            classify_model_error(&err, "configured"),
            ModelErrorKind::ModelNotFound {
                model: "ui-tars-72b".to_string()
            }
        );
    }

    #[test]
    fn test_not_found_falls_back_to_configured_name() {
        assert_eq!(
            classify_model_error(&msg("404 page not found"), "gpt-4o"),
            ModelErrorKind::ModelNotFound {
                model: "gpt-4o".to_string()
            }
        );
    }

    #[test]
    fn test_generic_keeps_raw_message() {
        let kind = classify_model_error(&msg("upstream exploded"), "m");
        assert!(kind.diagnostic().contains("upstream exploded"));
    }

    #[test]
    fn test_typed_variants() {
        assert_eq!(
            classify_model_error(&XAgentError::Auth("no key".into()), "m"),
            ModelErrorKind::Authentication
        );
        assert_eq!(
            classify_model_error(&XAgentError::ApiLimit("breaker open".into()), "m"),
            ModelErrorKind::RateLimit
        );
    }

    #[test]
    fn test_diagnostics_name_settings() {
        assert!(ModelErrorKind::Authentication.diagnostic().contains("Authentication"));
        assert!(ModelErrorKind::Authentication.diagnostic().contains("model.api_key_env"));
        assert!(ModelErrorKind::Network.diagnostic().contains("model.base_url"));
        assert!(ModelErrorKind::ModelNotFound { model: "x".into() }
            .diagnostic()
            .contains("model.name"));
    }
}
