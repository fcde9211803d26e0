//! API key resolution for model endpoints
//!
//! Lookup order:
//! 1. The variable named by `model.api_key_env` (default `XAGENT_API_KEY`)
//! 2. `OPENAI_API_KEY`

use std::env;
use xagent_core::{ModelSettings, Result, XAgentError};

/// Fallback variable consulted after the configured one
pub const FALLBACK_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Get the API key for the configured model endpoint
pub fn resolve_api_key(settings: &ModelSettings) -> Result<String> {
    if let Ok(key) = env::var(&settings.api_key_env) {
        if !key.trim().is_empty() {
            tracing::debug!("Using API key from {}", settings.api_key_env);
            return Ok(key);
        }
    }

    if let Ok(key) = env::var(FALLBACK_API_KEY_ENV) {
        if !key.trim().is_empty() {
            tracing::debug!("Using API key from {}", FALLBACK_API_KEY_ENV);
            return Ok(key);
        }
    }

    Err(XAgentError::Auth(format!(
        "No API key found. Set {} (configured by model.api_key_env) or {}",
        settings.api_key_env, FALLBACK_API_KEY_ENV
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to prevent concurrent env var modifications
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_env_vars<F, R>(vars: &[(&str, Option<&str>)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = ENV_LOCK.lock().unwrap();

        let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        for (key, value) in vars {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        let result = f();

        for (key, original) in originals {
            match original {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        result
    }

    fn settings(env_name: &str) -> ModelSettings {
        ModelSettings {
            api_key_env: env_name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_configured_variable_wins() {
        with_env_vars(
            &[
                ("XAGENT_TEST_KEY_A", Some("configured")),
                (FALLBACK_API_KEY_ENV, Some("fallback")),
            ],
            || {
                let key = resolve_api_key(&settings("XAGENT_TEST_KEY_A")).unwrap();
                assert_eq!(key, "configured");
            },
        );
    }

    #[test]
    fn test_fallback_variable() {
        with_env_vars(
            &[
                ("XAGENT_TEST_KEY_B", None),
                (FALLBACK_API_KEY_ENV, Some("fallback")),
            ],
            || {
                let key = resolve_api_key(&settings("XAGENT_TEST_KEY_B")).unwrap();
                assert_eq!(key, "fallback");
            },
        );
    }

    #[test]
    fn test_blank_key_is_ignored() {
        with_env_vars(
            &[
                ("XAGENT_TEST_KEY_C", Some("   ")),
                (FALLBACK_API_KEY_ENV, None),
            ],
            || {
                let err = resolve_api_key(&settings("XAGENT_TEST_KEY_C")).unwrap_err();
                assert!(matches!(err, XAgentError::Auth(_)));
                assert!(err.to_string().contains("model.api_key_env"));
            },
        );
    }
}
