//! Generate Orchestrator: a multi-round tool-calling loop built on top of
//! [`crate::client::LLMClient`] and [`crate::provider::LLMProvider`].
//!
//! A tool is *active* when its [`Tool`] carries an executor — the
//! orchestrator runs it and feeds the result back as a `tool_result` message.
//! A tool without an executor is *passive*: its calls are returned to the
//! caller untouched. A call naming a tool the caller never declared is
//! treated as active-but-unknown, producing a synthesized error result
//! rather than a panic or a silently dropped call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::Value;

use crate::client::LLMClient;
use crate::error::LLMError;
use crate::provider::ChatStream;
use crate::retry::RetryConfig;
use crate::types::{
    ChatOptions, ChatRequest, ContentPart, FinishReasonKind, Message, ResponseFormat, Role,
    ToolCall, ToolChoice, ToolResult, TokenUsage,
};

pub use crate::types::Tool;

/// Options accepted by [`generate`], [`generate_object`], and
/// [`generate_stream`].
///
/// `prompt` and `messages` are mutually exclusive ways to seed the
/// conversation: set exactly one. `prompt` is shorthand for a single
/// user-role message.
#[derive(Clone, Default)]
pub struct GenerateOptions {
    pub model: Option<String>,
    pub prompt: Option<String>,
    pub messages: Option<Vec<Message>>,
    pub system: Option<String>,
    pub tools: Vec<Tool>,
    pub tool_choice: Option<ToolChoice>,
    /// Maximum number of tool-execution rounds. `1` means: send the request,
    /// and if it asks for tools, execute them once and return — no further
    /// round-trip back to the model. Default `1`.
    pub max_tool_rounds: u32,
    /// Inspected after each round; when it returns `true` the loop stops
    /// even if the model would keep calling tools.
    pub stop_when: Option<Arc<dyn Fn(&GenerateResult) -> bool + Send + Sync>>,
    pub response_format: Option<ResponseFormat>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub provider: Option<String>,
    pub provider_options: HashMap<String, Value>,
    pub max_retries: u32,
    pub timeout: Option<Duration>,
    /// Overrides the process default client (see [`crate::client::default_client`]).
    pub client: Option<Arc<LLMClient>>,
}

impl GenerateOptions {
    pub fn new() -> Self {
        Self {
            max_tool_rounds: 1,
            max_retries: 2,
            ..Default::default()
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = Some(messages);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }
}

/// One step of the tool-calling loop: the assistant message produced by that
/// round, plus the tool results gathered while executing it (empty on the
/// final step).
#[derive(Debug, Clone)]
pub struct StepResult {
    pub message: Message,
    pub tool_results: Vec<ToolResult>,
    pub finish_reason: Option<crate::types::FinishReason>,
    pub usage: Option<TokenUsage>,
}

/// Aggregated result of a (possibly multi-round) [`generate`] call.
#[derive(Debug, Clone)]
pub struct GenerateResult {
    /// Text from the final step, concatenated in content order.
    pub text: String,
    /// Every round the loop ran, in order.
    pub steps: Vec<StepResult>,
    /// Tool calls from the final step that were never executed: either
    /// passive (no executor) or active-but-unknown.
    pub unresolved_tool_calls: Vec<ToolCall>,
    /// Usage summed across every round.
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<crate::types::FinishReason>,
    pub model: Option<String>,
    pub rounds_run: u32,
}

fn resolve_client(options: &GenerateOptions) -> Result<Arc<LLMClient>, LLMError> {
    match &options.client {
        Some(client) => Ok(Arc::clone(client)),
        None => crate::client::default_client(),
    }
}

fn seed_messages(options: &GenerateOptions) -> Result<Vec<Message>, LLMError> {
    match (&options.prompt, &options.messages) {
        (Some(_), Some(_)) => Err(LLMError::InvalidRequest {
            message: "GenerateOptions.prompt and .messages are mutually exclusive".to_string(),
        }),
        (None, None) => Err(LLMError::InvalidRequest {
            message: "GenerateOptions requires either .prompt or .messages".to_string(),
        }),
        (Some(prompt), None) => Ok(vec![Message::user_text(prompt.clone())]),
        (None, Some(messages)) => Ok(messages.clone()),
    }
}

fn build_request(
    options: &GenerateOptions,
    messages: Vec<Message>,
    response_format: Option<ResponseFormat>,
) -> ChatRequest {
    let mut all_messages = messages;
    if let Some(system) = &options.system {
        all_messages.insert(
            0,
            Message {
                role: Role::system(),
                name: None,
                content: vec![ContentPart::Text(crate::types::TextContent {
                    text: system.clone(),
                })],
                tool_call_id: None,
                metadata: None,
            },
        );
    }

    ChatRequest {
        messages: all_messages,
        options: ChatOptions {
            model: options.model.clone(),
            temperature: options.temperature,
            top_p: options.top_p,
            max_output_tokens: options.max_output_tokens,
            timeout: options.timeout,
            ..ChatOptions::default()
        },
        tools: options.tools.iter().map(|tool| tool.definition.clone()).collect(),
        tool_choice: options.tool_choice.clone(),
        response_format,
        provider: options.provider.clone(),
        provider_options: options.provider_options.clone(),
        metadata: None,
    }
}

fn retry_config(options: &GenerateOptions) -> RetryConfig {
    RetryConfig {
        max_retries: options.max_retries,
        ..RetryConfig::default()
    }
}

/// Executes every active tool call in `calls` concurrently, preserving
/// **original call order** (not completion order) in the returned results. A
/// call naming a tool the caller never declared, or a tool without an
/// executor, is returned unexecuted so the caller can decide how to handle
/// it; a failing executor produces an isolated `is_error: true` result for
/// that call only.
async fn execute_tool_calls(
    calls: &[ToolCall],
    tools: &[Tool],
) -> (Vec<ToolResult>, Vec<ToolCall>) {
    let by_name: HashMap<&str, &Tool> = tools.iter().map(|t| (t.definition.name.as_str(), t)).collect();

    let mut active_indices = Vec::new();
    let mut passive = Vec::new();
    let mut futures = Vec::new();

    for (index, call) in calls.iter().enumerate() {
        match by_name.get(call.name.as_str()) {
            Some(tool) if tool.is_active() => {
                let executor = tool.executor.clone().expect("checked is_active above");
                let arguments = call.arguments.clone();
                let call_id = call.id.clone();
                active_indices.push(index);
                futures.push(async move {
                    // Executors are synchronous; run them without blocking
                    // the async runtime's worker thread pool assumptions
                    // beyond what a typical in-process tool call requires.
                    let outcome = executor(arguments);
                    match outcome {
                        Ok(content) => ToolResult {
                            call_id,
                            content,
                            is_error: false,
                            image: None,
                            metadata: None,
                        },
                        Err(message) => ToolResult {
                            call_id,
                            content: message,
                            is_error: true,
                            image: None,
                            metadata: None,
                        },
                    }
                });
            }
            Some(_) => passive.push(call.clone()),
            None => {
                // Active-but-unknown: the caller declared no such tool.
                active_indices.push(index);
                let call_id = call.id.clone();
                let name = call.name.clone();
                futures.push(async move {
                    ToolResult {
                        call_id,
                        content: format!("no such tool: {name}"),
                        is_error: true,
                        image: None,
                        metadata: None,
                    }
                });
            }
        }
    }

    let executed = join_all(futures).await;
    let mut results = Vec::with_capacity(executed.len());
    for (position, result) in active_indices.into_iter().zip(executed.into_iter()) {
        results.push((position, result));
    }
    results.sort_by_key(|(position, _)| *position);
    let results = results.into_iter().map(|(_, result)| result).collect();

    (results, passive)
}

/// Runs the multi-round tool-calling loop described in the orchestrator
/// design: send, check `finish_reason`, execute active tool calls
/// concurrently (preserving call order), append results, repeat until the
/// model stops asking for tools, `max_tool_rounds` is reached, or
/// `stop_when` is satisfied.
pub async fn generate(options: GenerateOptions) -> Result<GenerateResult, LLMError> {
    let client = resolve_client(&options)?;
    let retry_cfg = retry_config(&options);
    let mut messages = seed_messages(&options)?;

    let mut steps = Vec::new();
    let mut usage_total: Option<TokenUsage> = None;
    let mut round = 0u32;

    loop {
        let request = build_request(&options, messages.clone(), options.response_format.clone());
        let response = client.chat_with_retry(request, retry_cfg.clone()).await?;

        usage_total = Some(match (usage_total.take(), response.usage.clone()) {
            (None, None) => TokenUsage::default(),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (Some(a), Some(b)) => a + b,
        });

        let is_tool_calls = response
            .finish_reason
            .as_ref()
            .map(|reason| reason.unified == FinishReasonKind::ToolCalls)
            .unwrap_or(false);

        round += 1;
        messages.push(response.message.clone());

        if !is_tool_calls {
            let text = response.message.text().unwrap_or_default();
            let unresolved = response.message.tool_calls().into_iter().cloned().collect();
            steps.push(StepResult {
                message: response.message.clone(),
                tool_results: Vec::new(),
                finish_reason: response.finish_reason.clone(),
                usage: response.usage.clone(),
            });
            let result = GenerateResult {
                text,
                steps,
                unresolved_tool_calls: unresolved,
                usage: usage_total,
                finish_reason: response.finish_reason,
                model: response.model,
                rounds_run: round,
            };
            return Ok(result);
        }

        // The round cap gates the *next* model round-trip, not this round's
        // tool execution: every round that asks for tools must run its
        // active calls and fill `tool_results` before the loop can stop.
        let calls = response.message.tool_calls().into_iter().cloned().collect::<Vec<_>>();
        let (tool_results, passive) = execute_tool_calls(&calls, &options.tools).await;

        for result in &tool_results {
            messages.push(Message {
                role: Role::tool(),
                name: None,
                content: vec![ContentPart::ToolResult(result.clone())],
                tool_call_id: result.call_id.clone(),
                metadata: None,
            });
        }

        steps.push(StepResult {
            message: response.message.clone(),
            tool_results: tool_results.clone(),
            finish_reason: response.finish_reason.clone(),
            usage: response.usage.clone(),
        });

        if !passive.is_empty() {
            // A passive tool call stops the loop even before `stop_when` or
            // `max_tool_rounds` are consulted: nothing can advance the
            // conversation until the caller supplies those results itself.
            let result = GenerateResult {
                text: response.message.text().unwrap_or_default(),
                unresolved_tool_calls: passive,
                usage: usage_total,
                finish_reason: response.finish_reason,
                model: response.model,
                rounds_run: round,
                steps,
            };
            return Ok(result);
        }

        if let Some(stop_when) = &options.stop_when {
            let last_text = steps
                .last()
                .map(|step| step.message.text().unwrap_or_default())
                .unwrap_or_default();
            let preview = GenerateResult {
                text: last_text,
                steps: steps.clone(),
                unresolved_tool_calls: Vec::new(),
                usage: usage_total.clone(),
                finish_reason: steps.last().and_then(|step| step.finish_reason.clone()),
                model: None,
                rounds_run: round,
            };
            if stop_when(&preview) {
                return Ok(preview);
            }
        }

        if round >= options.max_tool_rounds.max(1) {
            let last_text = steps
                .last()
                .map(|step| step.message.text().unwrap_or_default())
                .unwrap_or_default();
            let result = GenerateResult {
                text: last_text,
                unresolved_tool_calls: Vec::new(),
                usage: usage_total,
                finish_reason: steps.last().and_then(|step| step.finish_reason.clone()),
                model: response.model,
                rounds_run: round,
                steps,
            };
            return Ok(result);
        }
    }
}

/// Forces `response_format = json_schema(strict = true)` and runs a single
/// round (no tool loop), parsing the final assistant text as JSON. A parse
/// failure is a non-retryable [`LLMError::NoObjectGenerated`].
pub async fn generate_object(
    mut options: GenerateOptions,
    schema: Value,
) -> Result<Value, LLMError> {
    options.max_tool_rounds = 1;
    options.response_format = Some(ResponseFormat::strict_schema(schema));

    let result = generate(options).await?;
    serde_json::from_str(&result.text).map_err(|err| LLMError::NoObjectGenerated {
        message: format!("failed to parse model output as JSON: {err}"),
    })
}

/// Streams a single round and returns the raw event stream from the
/// underlying provider. Intentionally has no tool-loop semantics: building a
/// streaming multi-round loop would require buffering partial tool-call
/// arguments across round boundaries while still surfacing deltas live, and
/// this crate keeps that choice to implementer discretion.
pub async fn generate_stream(options: GenerateOptions) -> Result<ChatStream, LLMError> {
    let client = resolve_client(&options)?;
    let messages = seed_messages(&options)?;
    let request = build_request(&options, messages, options.response_format.clone());
    client.stream_chat(request).await
}

/// Reconstructs a [`GenerateResult`]-shaped snapshot from an in-flight
/// [`crate::types::StreamEvent`] sequence: `text_delta` appends to a text
/// buffer, `tool_call_start` registers a new call keyed by id in
/// first-seen order, `tool_call_delta` accretes into that call's argument
/// buffer, and `finish` snapshots usage and finish reason.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    tool_call_order: Vec<String>,
    tool_call_names: HashMap<String, String>,
    tool_call_args: HashMap<String, String>,
    finish_reason: Option<crate::types::FinishReason>,
    usage: Option<TokenUsage>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &crate::types::StreamEvent) {
        use crate::types::StreamEvent;
        match event {
            StreamEvent::TextDelta { text, .. } => self.text.push_str(text),
            StreamEvent::ToolCallStart { id, name, .. } => {
                if !self.tool_call_names.contains_key(id) {
                    self.tool_call_order.push(id.clone());
                }
                self.tool_call_names.insert(id.clone(), name.clone());
                self.tool_call_args.entry(id.clone()).or_default();
            }
            StreamEvent::ToolCallDelta {
                id,
                arguments_delta,
                ..
            } => {
                self.tool_call_args
                    .entry(id.clone())
                    .or_default()
                    .push_str(arguments_delta);
            }
            StreamEvent::Finish {
                finish_reason,
                usage,
            } => {
                self.finish_reason = Some(finish_reason.clone());
                self.usage = usage.clone();
            }
            _ => {}
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Tool calls seen so far, in first-seen order, with whatever argument
    /// text has accumulated (which may not yet be valid JSON mid-stream).
    pub fn tool_calls(&self) -> Vec<(String, String, String)> {
        self.tool_call_order
            .iter()
            .map(|id| {
                (
                    id.clone(),
                    self.tool_call_names.get(id).cloned().unwrap_or_default(),
                    self.tool_call_args.get(id).cloned().unwrap_or_default(),
                )
            })
            .collect()
    }

    pub fn finish_reason(&self) -> Option<&crate::types::FinishReason> {
        self.finish_reason.as_ref()
    }

    pub fn usage(&self) -> Option<&TokenUsage> {
        self.usage.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::client::LLMClientBuilder;
    use crate::error::LLMError;
    use crate::provider::LLMProvider;
    use crate::types::{
        CapabilityDescriptor, ChatResponse, FinishReason, ProviderMetadata, ToolCallKind,
        ToolDefinition, ToolKind,
    };

    struct ScriptedProvider {
        responses: std::sync::Mutex<Vec<ChatResponse>>,
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, LLMError> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                panic!("ScriptedProvider ran out of scripted responses");
            }
            Ok(responses.remove(0))
        }

        async fn stream_chat(&self, _request: ChatRequest) -> Result<ChatStream, LLMError> {
            Ok(Box::pin(futures_util::stream::empty()))
        }

        fn capabilities(&self) -> CapabilityDescriptor {
            CapabilityDescriptor::default()
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn assistant_text(text: &str, finish: FinishReasonKind) -> ChatResponse {
        ChatResponse {
            message: Message {
                role: Role::assistant(),
                name: None,
                content: vec![ContentPart::Text(crate::types::TextContent {
                    text: text.to_string(),
                })],
                tool_call_id: None,
                metadata: None,
            },
            usage: Some(TokenUsage {
                prompt_tokens: Some(10),
                completion_tokens: Some(5),
                ..Default::default()
            }),
            finish_reason: Some(FinishReason::new(finish, "stop")),
            model: Some("test-model".to_string()),
            provider: ProviderMetadata::default(),
            rate_limit: None,
        }
    }

    fn assistant_tool_call(id: &str, name: &str, arguments: Value) -> ChatResponse {
        ChatResponse {
            message: Message {
                role: Role::assistant(),
                name: None,
                content: vec![ContentPart::ToolCall(ToolCall {
                    id: Some(id.to_string()),
                    name: name.to_string(),
                    arguments,
                    kind: ToolCallKind::Function,
                })],
                tool_call_id: None,
                metadata: None,
            },
            usage: Some(TokenUsage {
                prompt_tokens: Some(10),
                completion_tokens: Some(5),
                ..Default::default()
            }),
            finish_reason: Some(FinishReason::new(FinishReasonKind::ToolCalls, "tool_calls")),
            model: Some("test-model".to_string()),
            provider: ProviderMetadata::default(),
            rate_limit: None,
        }
    }

    fn client_with(provider: ScriptedProvider) -> Arc<LLMClient> {
        Arc::new(
            LLMClientBuilder::new()
                .register("scripted", Arc::new(provider))
                .unwrap()
                .with_default("scripted")
                .build(),
        )
    }

    #[tokio::test]
    async fn single_round_without_tool_calls_returns_immediately() {
        let client = client_with(ScriptedProvider {
            responses: std::sync::Mutex::new(vec![assistant_text(
                "hello there",
                FinishReasonKind::Stop,
            )]),
        });
        let options = GenerateOptions::new().with_prompt("hi").with_model("test-model");
        let mut options = options;
        options.client = Some(client);

        let result = generate(options).await.unwrap();
        assert_eq!(result.text, "hello there");
        assert_eq!(result.rounds_run, 1);
        assert!(result.unresolved_tool_calls.is_empty());
    }

    #[tokio::test]
    async fn active_tool_call_executes_and_feeds_back_into_second_round() {
        let client = client_with(ScriptedProvider {
            responses: std::sync::Mutex::new(vec![
                assistant_tool_call("call_1", "get_weather", serde_json::json!({"city": "nyc"})),
                assistant_text("it is sunny", FinishReasonKind::Stop),
            ]),
        });

        let tool = Tool::active(
            ToolDefinition {
                name: "get_weather".to_string(),
                description: None,
                input_schema: None,
                kind: ToolKind::Function,
                metadata: None,
            },
            Arc::new(|_args| Ok("sunny".to_string())),
        );

        let mut options = GenerateOptions::new().with_prompt("weather?").with_tools(vec![tool]);
        options.max_tool_rounds = 2;
        options.client = Some(client);

        let result = generate(options).await.unwrap();
        assert_eq!(result.text, "it is sunny");
        assert_eq!(result.rounds_run, 2);
        assert_eq!(result.steps[0].tool_results.len(), 1);
        assert!(!result.steps[0].tool_results[0].is_error);
        assert_eq!(result.usage.unwrap().prompt_tokens, Some(20));
    }

    #[tokio::test]
    async fn unknown_tool_call_synthesizes_error_result_without_panicking() {
        let client = client_with(ScriptedProvider {
            responses: std::sync::Mutex::new(vec![
                assistant_tool_call("call_1", "does_not_exist", serde_json::json!({})),
                assistant_text("done", FinishReasonKind::Stop),
            ]),
        });

        let mut options = GenerateOptions::new().with_prompt("go");
        options.max_tool_rounds = 2;
        options.client = Some(client);

        let result = generate(options).await.unwrap();
        assert_eq!(result.steps[0].tool_results.len(), 1);
        assert!(result.steps[0].tool_results[0].is_error);
        assert!(result.steps[0].tool_results[0].content.contains("does_not_exist"));
    }

    #[tokio::test]
    async fn passive_tool_call_stops_the_loop_and_surfaces_unresolved_call() {
        let client = client_with(ScriptedProvider {
            responses: std::sync::Mutex::new(vec![assistant_tool_call(
                "call_1",
                "needs_human",
                serde_json::json!({"question": "continue?"}),
            )]),
        });

        let tool = Tool::passive(ToolDefinition {
            name: "needs_human".to_string(),
            description: None,
            input_schema: None,
            kind: ToolKind::Function,
            metadata: None,
        });

        let mut options = GenerateOptions::new().with_prompt("go").with_tools(vec![tool]);
        options.max_tool_rounds = 5;
        options.client = Some(client);

        let result = generate(options).await.unwrap();
        assert_eq!(result.unresolved_tool_calls.len(), 1);
        assert_eq!(result.unresolved_tool_calls[0].name, "needs_human");
        assert_eq!(result.rounds_run, 1);
    }

    #[tokio::test]
    async fn failing_executor_is_isolated_to_its_own_call() {
        let client = client_with(ScriptedProvider {
            responses: std::sync::Mutex::new(vec![assistant_tool_call(
                "call_1",
                "always_fails",
                serde_json::json!({}),
            )]),
        });

        let tool = Tool::active(
            ToolDefinition {
                name: "always_fails".to_string(),
                description: None,
                input_schema: None,
                kind: ToolKind::Function,
                metadata: None,
            },
            Arc::new(|_args| Err("boom".to_string())),
        );

        let mut options = GenerateOptions::new().with_prompt("go").with_tools(vec![tool]);
        options.max_tool_rounds = 1;
        options.client = Some(client);

        let result = generate(options).await.unwrap();
        assert_eq!(result.steps[0].tool_results.len(), 1);
        assert!(result.steps[0].tool_results[0].is_error);
        assert_eq!(result.steps[0].tool_results[0].content, "boom");
    }

    #[test]
    fn build_request_threads_timeout_into_chat_options() {
        let mut options = GenerateOptions::new()
            .with_prompt("hi")
            .with_model("test-model");
        options.timeout = Some(Duration::from_secs(5));
        let messages = seed_messages(&options).unwrap();
        let request = build_request(&options, messages, None);
        assert_eq!(request.options.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn both_prompt_and_messages_is_a_configuration_error() {
        let options = GenerateOptions {
            prompt: Some("a".to_string()),
            messages: Some(vec![Message::user_text("b")]),
            ..GenerateOptions::new()
        };
        let err = seed_messages(&options).unwrap_err();
        assert!(matches!(err, LLMError::InvalidRequest { .. }));
    }

    #[test]
    fn neither_prompt_nor_messages_is_a_configuration_error() {
        let options = GenerateOptions::new();
        let err = seed_messages(&options).unwrap_err();
        assert!(matches!(err, LLMError::InvalidRequest { .. }));
    }

    #[test]
    fn generate_object_parse_failure_is_non_retryable() {
        assert!(!LLMError::NoObjectGenerated {
            message: "bad json".to_string(),
        }
        .is_retryable());
    }

    #[test]
    fn stream_accumulator_tracks_text_and_tool_calls_in_first_seen_order() {
        use crate::types::StreamEvent;
        let mut acc = StreamAccumulator::new();
        acc.apply(&StreamEvent::TextDelta {
            index: 0,
            text: "hel".to_string(),
        });
        acc.apply(&StreamEvent::TextDelta {
            index: 0,
            text: "lo".to_string(),
        });
        acc.apply(&StreamEvent::ToolCallStart {
            index: 1,
            id: "call_1".to_string(),
            name: "search".to_string(),
        });
        acc.apply(&StreamEvent::ToolCallDelta {
            index: 1,
            id: "call_1".to_string(),
            arguments_delta: "{\"q\":".to_string(),
        });
        acc.apply(&StreamEvent::ToolCallDelta {
            index: 1,
            id: "call_1".to_string(),
            arguments_delta: "\"rust\"}".to_string(),
        });
        acc.apply(&StreamEvent::Finish {
            finish_reason: FinishReason::new(FinishReasonKind::ToolCalls, "tool_calls"),
            usage: None,
        });

        assert_eq!(acc.text(), "hello");
        let calls = acc.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "search");
        assert_eq!(calls[0].2, "{\"q\":\"rust\"}");
        assert!(acc.finish_reason().unwrap().is_tool_calls());
    }

    #[test]
    fn executor_clone_counter_smoke() {
        // Exercises that Tool's Arc<dyn Fn> executor is Clone-safe when
        // shared across concurrently-executed calls.
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        let executor: crate::types::ToolExecutor = Arc::new(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            Ok("ok".to_string())
        });
        let tool = Tool::active(
            ToolDefinition {
                name: "noop".to_string(),
                description: None,
                input_schema: None,
                kind: ToolKind::Function,
                metadata: None,
            },
            executor,
        );
        let cloned = tool.clone();
        assert!(cloned.is_active());
        (cloned.executor.unwrap())(Value::Null).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
