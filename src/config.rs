use std::collections::HashMap;
use std::env;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LLMError;

/// Describes a single callable backend registered with the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// User-chosen handle, e.g. `"default-openai"`.
    pub handle: String,
    pub provider: ProviderKind,
    pub credential: Credential,
    pub default_model: Option<String>,
    pub base_url: Option<String>,
    /// Additional vendor-specific settings (service tier, safety settings, ...).
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

/// Supported provider families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAiResponses,
    AnthropicMessages,
    GoogleGemini,
}

/// Authentication material for a registered backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credential {
    /// Plain API key, sent under `header` (defaulting per-provider when absent).
    ApiKey {
        header: Option<String>,
        key: String,
    },
    /// Bearer token credential.
    Bearer { token: String },
    /// Google/GCP service account JSON.
    ServiceAccount { json: Value },
    /// No authentication required.
    None,
}

/// Bootstraps the set of [`ModelConfig`] entries from environment variables,
/// loading a `.env` file first if one is present. Recognizes
/// `ANTHROPIC_API_KEY`, `OPENAI_API_KEY`, and `GEMINI_API_KEY`, plus the
/// matching `*_BASE_URL` overrides. Returns the handles in bootstrap order
/// (Anthropic, OpenAI, Gemini) so callers can pick the first as a default.
pub fn bootstrap_from_env() -> Vec<ModelConfig> {
    let _ = dotenvy::dotenv();

    let mut configs = Vec::new();

    if let Ok(key) = env::var("ANTHROPIC_API_KEY") {
        configs.push(ModelConfig {
            handle: "anthropic".to_string(),
            provider: ProviderKind::AnthropicMessages,
            credential: Credential::ApiKey {
                header: Some("x-api-key".to_string()),
                key,
            },
            default_model: env::var("ANTHROPIC_DEFAULT_MODEL").ok(),
            base_url: env::var("ANTHROPIC_BASE_URL").ok(),
            extra: HashMap::new(),
        });
    }

    if let Ok(key) = env::var("OPENAI_API_KEY") {
        configs.push(ModelConfig {
            handle: "openai".to_string(),
            provider: ProviderKind::OpenAiResponses,
            credential: Credential::Bearer { token: key },
            default_model: env::var("OPENAI_DEFAULT_MODEL").ok(),
            base_url: env::var("OPENAI_BASE_URL").ok(),
            extra: HashMap::new(),
        });
    }

    if let Ok(key) = env::var("GEMINI_API_KEY") {
        configs.push(ModelConfig {
            handle: "gemini".to_string(),
            provider: ProviderKind::GoogleGemini,
            credential: Credential::ApiKey {
                header: None,
                key,
            },
            default_model: env::var("GEMINI_DEFAULT_MODEL").ok(),
            base_url: env::var("GEMINI_BASE_URL").ok(),
            extra: HashMap::new(),
        });
    }

    configs
}

/// Returns the handle of the first backend bootstrapped from the environment,
/// in bootstrap order, or a [`LLMError::Configuration`] if none were found.
pub fn default_handle_from_env() -> Result<String, LLMError> {
    bootstrap_from_env()
        .into_iter()
        .next()
        .map(|config| config.handle)
        .ok_or_else(|| LLMError::Configuration {
            field: "environment".to_string(),
            reason: "no ANTHROPIC_API_KEY, OPENAI_API_KEY, or GEMINI_API_KEY set".to_string(),
        })
}
