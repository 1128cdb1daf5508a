use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Anthropic Messages non-streaming response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AnthropicMessageResponse {
    /// Some compatibility layers omit `id`, hence `Option`.
    #[serde(default)]
    pub(crate) id: Option<String>,
    #[serde(default)]
    pub(crate) r#type: String,
    pub(crate) model: String,
    /// Anthropic always returns the `assistant` role here.
    #[serde(default)]
    pub(crate) role: String,
    #[serde(default)]
    pub(crate) content: Vec<AnthropicContentBlock>,
    #[serde(default)]
    pub(crate) stop_reason: Option<String>,
    #[serde(default)]
    pub(crate) stop_sequence: Option<String>,
    #[serde(default)]
    pub(crate) usage: Option<AnthropicUsage>,
    /// Fields not modeled explicitly; passed through to `ProviderMetadata.raw`.
    #[serde(flatten)]
    pub(crate) extra: HashMap<String, Value>,
}

/// A single content block: text, image, tool_use, tool_result, document, etc.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AnthropicContentBlock {
    #[serde(rename = "type")]
    pub(crate) kind: String,
    #[serde(default)]
    pub(crate) text: Option<String>,
    #[serde(default)]
    pub(crate) id: Option<String>,
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) input: Option<Value>,
    #[serde(default, rename = "tool_use_id")]
    pub(crate) tool_use_id: Option<String>,
    /// `tool_result` content: either a plain string or an array of content
    /// blocks; kept as raw JSON and normalized downstream.
    #[serde(default)]
    pub(crate) content: Option<Value>,
    /// Source for image/document blocks.
    #[serde(default)]
    pub(crate) source: Option<AnthropicImageSource>,
    #[serde(flatten)]
    pub(crate) extra: HashMap<String, Value>,
}

/// Image source, covering only the fields Anthropic documents as stable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AnthropicImageSource {
    #[serde(rename = "type")]
    pub(crate) kind: String,
    #[serde(rename = "media_type")]
    pub(crate) media_type: String,
    pub(crate) data: String,
}

/// Token usage accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AnthropicUsage {
    #[serde(default)]
    pub(crate) input_tokens: Option<u64>,
    #[serde(default)]
    pub(crate) output_tokens: Option<u64>,
    #[serde(default)]
    pub(crate) cache_creation_input_tokens: Option<u64>,
    #[serde(default)]
    pub(crate) cache_read_input_tokens: Option<u64>,
}
