//! Shared data structures modeling a provider-agnostic chat request/response.
//!
//! These types normalize provider-specific payloads so the rest of the crate can stay
//! agnostic of individual vendor differences.

use std::collections::HashMap;
use std::ops::Add;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Chat role string compatible with provider-specific semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(pub String);

impl Role {
    pub fn system() -> Self {
        Self("system".to_string())
    }

    pub fn user() -> Self {
        Self("user".to_string())
    }

    pub fn assistant() -> Self {
        Self("assistant".to_string())
    }

    pub fn tool() -> Self {
        Self("tool".to_string())
    }

    pub fn developer() -> Self {
        Self("developer".to_string())
    }

    pub fn is_system_like(&self) -> bool {
        self.0 == "system" || self.0 == "developer"
    }
}

/// Normalized chat message shared across providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role associated with this message.
    pub role: Role,
    /// Optional vendor-specific name attribute.
    pub name: Option<String>,
    /// Multimodal content parts provided in order.
    #[serde(default)]
    pub content: Vec<ContentPart>,
    /// For `tool` role messages, the call this message answers.
    pub tool_call_id: Option<String>,
    /// Arbitrary metadata forwarded to providers.
    pub metadata: Option<HashMap<String, Value>>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::user(),
            name: None,
            content: vec![ContentPart::Text(TextContent { text: text.into() })],
            tool_call_id: None,
            metadata: None,
        }
    }

    pub fn text(&self) -> Option<String> {
        let mut buffer = String::new();
        for part in &self.content {
            if let ContentPart::Text(TextContent { text }) = part {
                if !buffer.is_empty() {
                    buffer.push('\n');
                }
                buffer.push_str(text);
            }
        }
        if buffer.is_empty() { None } else { Some(buffer) }
    }

    /// Tool calls embedded directly in this message's content, if any.
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }
}

/// Multimodal content part covering text, media, tools, reasoning, and vendor data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text content variant.
    Text(TextContent),
    /// Image content variant.
    Image(ImageContent),
    /// Audio content variant.
    Audio(AudioContent),
    /// Video content variant.
    Video(VideoContent),
    /// File reference variant.
    File(FileContent),
    /// Tool invocation emitted by the assistant.
    ToolCall(ToolCall),
    /// Tool execution result authored by the tool role.
    ToolResult(ToolResult),
    /// Visible reasoning/thinking trace.
    Thinking(ThinkingContent),
    /// Opaque reasoning trace the vendor will not disclose verbatim.
    RedactedThinking(RedactedThinkingContent),
    /// Vendor-defined or opaque content payload.
    Data { data: Value },
}

/// Textual content payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    /// Plain UTF-8 text.
    pub text: String,
}

/// Visible chain-of-thought style reasoning content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingContent {
    pub text: String,
    /// Vendor signature validating the thinking block, when provided.
    pub signature: Option<String>,
}

/// Reasoning content the vendor declined to expose; `data` is opaque and only
/// meaningful when echoed back to the same vendor in a follow-up request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactedThinkingContent {
    pub data: String,
}

/// Image payload compatible with OpenAI and Anthropic semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageContent {
    /// Source describing where the image bytes come from.
    pub source: ImageSource,
    /// Optional detail hints such as OpenAI or Anthropic detail levels.
    pub detail: Option<ImageDetail>,
    /// Additional metadata forwarded verbatim.
    pub metadata: Option<HashMap<String, Value>>,
}

/// Source for an image input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    /// Public URL accessible by the provider.
    Url { url: String },
    /// Base64-encoded inline payload.
    Base64 {
        data: String,
        mime_type: Option<String>,
    },
    /// Provider-managed file identifier.
    FileId { file_id: String },
}

/// Detail preset requested for image inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageDetail {
    Low,
    High,
    Auto,
}

/// Audio payload attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioContent {
    pub source: MediaSource,
    pub mime_type: Option<String>,
    pub metadata: Option<HashMap<String, Value>>,
}

/// Video payload attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoContent {
    pub source: MediaSource,
    pub mime_type: Option<String>,
    pub metadata: Option<HashMap<String, Value>>,
}

/// File reference that can be resolved by providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileContent {
    pub file_id: String,
    pub purpose: Option<String>,
    pub metadata: Option<HashMap<String, Value>>,
}

/// Unified media source definition reused by audio and video parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaSource {
    Inline { data: String },
    FileId { file_id: String },
    Url { url: String },
}

/// Declarative definition of a tool available to the assistant, as sent over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Option<Value>,
    pub kind: ToolKind,
    pub metadata: Option<HashMap<String, Value>>,
}

/// A tool the Generate Orchestrator knows about: a wire-level definition plus
/// an optional executor. Tools with an executor are "active" (the orchestrator
/// runs them itself); tools without one are "passive" (surfaced to the caller).
#[derive(Clone)]
pub struct Tool {
    pub definition: ToolDefinition,
    pub executor: Option<ToolExecutor>,
}

impl Tool {
    pub fn passive(definition: ToolDefinition) -> Self {
        Self {
            definition,
            executor: None,
        }
    }

    pub fn active(definition: ToolDefinition, executor: ToolExecutor) -> Self {
        Self {
            definition,
            executor: Some(executor),
        }
    }

    pub fn is_active(&self) -> bool {
        self.executor.is_some()
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("definition", &self.definition)
            .field("is_active", &self.is_active())
            .finish()
    }
}

/// Synchronous tool executor: takes the call arguments, returns text output or
/// an error message. Wrapped in `Arc` so `Tool` stays cheaply cloneable.
pub type ToolExecutor = std::sync::Arc<dyn Fn(Value) -> Result<String, String> + Send + Sync>;

/// Enumerates supported tool kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolKind {
    Function,
    FileSearch,
    WebSearch,
    ComputerUse,
    Custom { name: String, config: Option<Value> },
}

/// Tool call emitted inside a chat response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-supplied (or, for Gemini, synthetically minted) invocation id.
    pub id: Option<String>,
    pub name: String,
    pub arguments: Value,
    pub kind: ToolCallKind,
}

/// Tool call categories for streaming deltas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolCallKind {
    Function,
    FileSearch,
    WebSearch,
    ComputerUse,
    Custom { name: String },
}

/// Result returned by a tool execution step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Correlated call identifier.
    pub call_id: Option<String>,
    /// Text payload returned by the tool.
    pub content: String,
    /// Indicates whether the tool reported an error.
    #[serde(default)]
    pub is_error: bool,
    /// Optional inline image produced alongside the text result.
    pub image: Option<ImageContent>,
    pub metadata: Option<HashMap<String, Value>>,
}

/// Chat request shared across all providers.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatRequest {
    /// Ordered list of messages to send.
    pub messages: Vec<Message>,
    /// Fine-grained chat options.
    #[serde(default)]
    pub options: ChatOptions,
    /// Tool definitions available to the assistant (wire-level only).
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: Option<ToolChoice>,
    pub response_format: Option<ResponseFormat>,
    /// Explicit provider override; otherwise the client's default applies.
    pub provider: Option<String>,
    /// Vendor-keyed opaque passthrough, e.g. `provider_options["anthropic"]["beta"]`.
    #[serde(default)]
    pub provider_options: HashMap<String, Value>,
    pub metadata: Option<HashMap<String, Value>>,
}

/// Tunable chat options supported across providers.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub parallel_tool_calls: Option<bool>,
    /// Stop sequences honored by the vendor when present in the generated text.
    #[serde(default)]
    pub stop_sequences: Vec<String>,
    /// Reasoning effort preset, surfaced at the top level for convenience.
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Reasoning token budget, where the vendor supports one.
    pub reasoning_budget_tokens: Option<u32>,
    /// Whole-request deadline for this call, overriding the adapter's
    /// configured default. Absent means the adapter's own timeout applies.
    pub timeout: Option<Duration>,
    /// Additional provider-specific options (service tiers, safety, etc.).
    pub extra: HashMap<String, Value>,
}

/// Reasoning effort presets supported by OpenAI and Anthropic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningEffort {
    None,
    Low,
    Medium,
    High,
}

/// Tool-choice strategies supported across providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// Provider decides when to call tools.
    Auto,
    /// Provider must invoke at least one tool.
    Required,
    /// Tools are disabled for the request.
    None,
    /// Force a specific tool by name.
    Tool { name: String },
    /// Custom serialized configuration passed directly to the provider.
    Custom(Value),
}

/// Response-formatting modes supported by providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Free-form text output.
    Text,
    /// Structured JSON object without a fixed schema.
    JsonObject,
    /// JSON Schema-constrained output.
    JsonSchema {
        schema: Value,
        #[serde(default)]
        strict: bool,
    },
    /// Provider-specific response descriptor.
    Custom(Value),
}

impl ResponseFormat {
    pub fn strict_schema(schema: Value) -> Self {
        Self::JsonSchema {
            schema,
            strict: true,
        }
    }
}

/// Aggregated chat response returned by a provider: a single assistant message
/// (which may itself contain `tool_call` content parts) plus accounting metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: Message,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<FinishReason>,
    pub model: Option<String>,
    pub provider: ProviderMetadata,
    pub rate_limit: Option<RateLimitInfo>,
}

/// Token usage metrics collected from the provider. Addition is pointwise,
/// associative, commutative, and absent-preserving: `None + None == None`,
/// `None + Some(n) == Some(n)`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub reasoning_tokens: Option<u64>,
    pub cache_read_tokens: Option<u64>,
    pub cache_write_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    pub details: Option<HashMap<String, Value>>,
}

fn add_opt(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (None, None) => None,
        (Some(x), None) => Some(x),
        (None, Some(y)) => Some(y),
        (Some(x), Some(y)) => Some(x + y),
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        let mut details = self.details;
        if let Some(rhs_details) = rhs.details {
            let map = details.get_or_insert_with(HashMap::new);
            for (k, v) in rhs_details {
                map.insert(k, v);
            }
        }
        TokenUsage {
            prompt_tokens: add_opt(self.prompt_tokens, rhs.prompt_tokens),
            completion_tokens: add_opt(self.completion_tokens, rhs.completion_tokens),
            reasoning_tokens: add_opt(self.reasoning_tokens, rhs.reasoning_tokens),
            cache_read_tokens: add_opt(self.cache_read_tokens, rhs.cache_read_tokens),
            cache_write_tokens: add_opt(self.cache_write_tokens, rhs.cache_write_tokens),
            total_tokens: add_opt(self.total_tokens, rhs.total_tokens),
            details,
        }
    }
}

/// Unified finish-reason classification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReasonKind {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
    Other(String),
}

/// Why a chat response stopped generating content: the unified classification
/// alongside the vendor's own raw string, which is never discarded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinishReason {
    pub unified: FinishReasonKind,
    pub raw: Option<String>,
}

impl FinishReason {
    pub fn new(unified: FinishReasonKind, raw: impl Into<String>) -> Self {
        Self {
            unified,
            raw: Some(raw.into()),
        }
    }

    pub fn is_tool_calls(&self) -> bool {
        self.unified == FinishReasonKind::ToolCalls
    }
}

/// Best-effort rate-limit accounting surfaced by the vendor's response headers.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RateLimitInfo {
    pub requests_remaining: Option<u64>,
    pub requests_limit: Option<u64>,
    pub tokens_remaining: Option<u64>,
    pub tokens_limit: Option<u64>,
    /// Seconds until the limiting window resets, if the vendor reports one.
    pub reset_at: Option<u64>,
}

/// Provider metadata returned with each response.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    pub provider: String,
    pub request_id: Option<String>,
    pub endpoint: Option<String>,
    pub raw: Option<Value>,
}

/// Capability descriptor used to filter providers at runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CapabilityDescriptor {
    pub supports_stream: bool,
    pub supports_image_input: bool,
    pub supports_audio_input: bool,
    pub supports_video_input: bool,
    pub supports_tools: bool,
    pub supports_structured_output: bool,
    pub supports_parallel_tool_calls: bool,
}

/// Streaming event emitted incrementally while a response is generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    StreamStart {
        usage: Option<TokenUsage>,
    },
    TextStart {
        index: usize,
    },
    TextDelta {
        index: usize,
        text: String,
    },
    TextEnd {
        index: usize,
    },
    ReasoningStart {
        index: usize,
    },
    ReasoningDelta {
        index: usize,
        text: String,
    },
    ReasoningEnd {
        index: usize,
    },
    ToolCallStart {
        index: usize,
        id: String,
        name: String,
    },
    ToolCallDelta {
        index: usize,
        id: String,
        arguments_delta: String,
    },
    ToolCallEnd {
        index: usize,
        id: String,
    },
    Finish {
        finish_reason: FinishReason,
        usage: Option<TokenUsage>,
    },
    Error {
        message: String,
    },
    /// Vendor-specific event not mapped to any of the above.
    ProviderEvent {
        raw: Value,
    },
}

/// A chunk of streaming events plus the provider metadata they originated from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunk {
    pub events: Vec<StreamEvent>,
    pub provider: ProviderMetadata,
}
