use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level `GenerateContentResponse` shape, shared by the non-streaming
/// response and each streaming chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiGenerateContentResponse {
    /// Candidate responses.
    #[serde(default)]
    pub(crate) candidates: Vec<GeminiCandidate>,
    /// Content-filtering feedback for the prompt.
    #[serde(default, rename = "promptFeedback")]
    pub(crate) prompt_feedback: Option<Value>,
    /// Token usage metadata.
    #[serde(default, rename = "usageMetadata")]
    pub(crate) usage_metadata: Option<GeminiUsageMetadata>,
    /// The model version that actually served the request.
    #[serde(default, rename = "modelVersion")]
    pub(crate) model_version: Option<String>,
    /// Identifier for this response.
    #[serde(default, rename = "responseId")]
    pub(crate) response_id: Option<String>,
    /// Unmapped fields, passed through as provider metadata.
    #[serde(flatten)]
    pub(crate) extra: HashMap<String, Value>,
}

/// A single candidate response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiCandidate {
    #[serde(default)]
    pub(crate) content: Option<GeminiContent>,
    #[serde(default, rename = "finishReason")]
    pub(crate) finish_reason: Option<String>,
    #[serde(default)]
    pub(crate) index: Option<usize>,
    /// Other fields such as `safetyRatings`/`citationMetadata` passed through.
    #[serde(flatten)]
    pub(crate) extra: HashMap<String, Value>,
}

/// Candidate content: a role plus an ordered list of parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiContent {
    #[serde(default)]
    pub(crate) parts: Vec<GeminiPart>,
    #[serde(default)]
    pub(crate) role: Option<String>,
    #[serde(flatten)]
    pub(crate) extra: HashMap<String, Value>,
}

/// `Content.part`, a single multimodal content unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiPart {
    /// Plain text.
    #[serde(default)]
    pub(crate) text: Option<String>,
    /// Inline media data (base64).
    #[serde(default, rename = "inlineData", alias = "inline_data")]
    pub(crate) inline_data: Option<GeminiInlineData>,
    /// File reference (e.g. File API / GCS).
    #[serde(default, rename = "fileData", alias = "file_data")]
    pub(crate) file_data: Option<GeminiFileData>,
    /// Function call request.
    #[serde(default, rename = "functionCall", alias = "function_call")]
    pub(crate) function_call: Option<GeminiFunctionCall>,
    /// Function call response.
    #[serde(default, rename = "functionResponse", alias = "function_response")]
    pub(crate) function_response: Option<GeminiFunctionResponse>,
    /// Executable code.
    #[serde(default, rename = "executableCode", alias = "executable_code")]
    pub(crate) executable_code: Option<GeminiExecutableCode>,
    /// Code execution result.
    #[serde(
        default,
        rename = "codeExecutionResult",
        alias = "code_execution_result"
    )]
    pub(crate) code_execution_result: Option<GeminiCodeExecutionResult>,
    /// Fields not modeled explicitly, passed through as raw JSON.
    #[serde(flatten)]
    pub(crate) extra: HashMap<String, Value>,
}

/// Inline data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiInlineData {
    #[serde(rename = "mimeType", alias = "mime_type")]
    pub(crate) mime_type: String,
    pub(crate) data: String,
}

/// File data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiFileData {
    #[serde(rename = "mimeType", alias = "mime_type")]
    pub(crate) mime_type: Option<String>,
    #[serde(rename = "fileUri", alias = "file_uri")]
    pub(crate) file_uri: String,
}

/// A function call request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiFunctionCall {
    pub(crate) name: String,
    /// Function arguments as a JSON object.
    #[serde(default)]
    pub(crate) args: Value,
}

/// A function call response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiFunctionResponse {
    pub(crate) name: String,
    pub(crate) response: Value,
}

/// An executable code snippet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiExecutableCode {
    pub(crate) language: String,
    pub(crate) code: String,
}

/// The result of executing a code snippet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiCodeExecutionResult {
    pub(crate) outcome: String,
    #[serde(default)]
    pub(crate) output: Option<String>,
}

/// Token usage metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiUsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    pub(crate) prompt_token_count: Option<u64>,
    #[serde(rename = "cachedContentTokenCount", default)]
    pub(crate) cached_content_token_count: Option<u64>,
    #[serde(rename = "candidatesTokenCount", default)]
    pub(crate) candidates_token_count: Option<u64>,
    #[serde(rename = "totalTokenCount", default)]
    pub(crate) total_token_count: Option<u64>,
    #[serde(rename = "toolUsePromptTokenCount", default)]
    pub(crate) tool_use_prompt_token_count: Option<u64>,
    #[serde(rename = "thoughtsTokenCount", default)]
    pub(crate) thoughts_token_count: Option<u64>,
    /// Other per-modality token breakdowns, passed through verbatim.
    #[serde(flatten)]
    pub(crate) extra: HashMap<String, Value>,
}
