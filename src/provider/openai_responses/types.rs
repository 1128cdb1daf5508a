use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Non-streaming Responses API response body.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub(crate) struct OpenAiResponsesResponse {
    pub(crate) id: String,
    pub(crate) object: String,
    #[serde(default)]
    pub(crate) created_at: Option<u64>,
    #[serde(default)]
    pub(crate) status: Option<String>,
    #[serde(default)]
    pub(crate) error: Option<Value>,
    #[serde(default)]
    pub(crate) incomplete_details: Option<Value>,
    #[serde(default)]
    pub(crate) instructions: Option<String>,
    #[serde(default)]
    pub(crate) max_output_tokens: Option<u32>,
    pub(crate) model: String,
    #[serde(default)]
    pub(crate) output: Vec<Value>,
    #[serde(default)]
    pub(crate) parallel_tool_calls: Option<bool>,
    #[serde(default)]
    pub(crate) previous_response_id: Option<String>,
    #[serde(default)]
    pub(crate) reasoning: Option<Value>,
    #[serde(default)]
    pub(crate) store: Option<bool>,
    #[serde(default)]
    pub(crate) temperature: Option<f32>,
    #[serde(default)]
    pub(crate) text: Option<Value>,
    #[serde(default)]
    pub(crate) tool_choice: Option<Value>,
    #[serde(default)]
    pub(crate) tools: Option<Vec<Value>>,
    #[serde(default)]
    pub(crate) top_p: Option<f32>,
    #[serde(default)]
    pub(crate) truncation: Option<String>,
    #[serde(default)]
    pub(crate) usage: Option<OpenAiResponsesUsage>,
    #[serde(default)]
    pub(crate) user: Option<String>,
    #[serde(default)]
    pub(crate) metadata: Option<Value>,
}

/// Token accounting attached to a Responses API result.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub(crate) struct OpenAiResponsesUsage {
    #[serde(default)]
    pub(crate) input_tokens: Option<u64>,
    #[serde(default)]
    pub(crate) output_tokens: Option<u64>,
    #[serde(default)]
    pub(crate) total_tokens: Option<u64>,
    #[serde(default)]
    pub(crate) input_tokens_details: Option<Value>,
    #[serde(default)]
    pub(crate) output_tokens_details: Option<Value>,
}
