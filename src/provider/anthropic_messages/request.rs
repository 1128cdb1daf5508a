use serde_json::{Map, Value, json};

use crate::base::{extract_system, merge_consecutive};
use crate::error::LLMError;
use crate::types::{
    ChatRequest, ContentPart, ImageContent, ImageSource, Message, ReasoningEffort, ToolCall,
    ToolChoice, ToolDefinition, ToolKind, ToolResult,
};

/// Anthropic requires `max_tokens`; callers who omit it get this default.
const DEFAULT_MAX_TOKENS: u64 = 4096;

/// Builds an Anthropic Messages request body.
pub(crate) fn build_anthropic_body(
    request: &ChatRequest,
    model: &str,
    stream: bool,
) -> Result<Value, LLMError> {
    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(model.to_string()));

    let (system, rest) = extract_system(&request.messages);
    // Anthropic has no `tool` role of its own: tool results are sent back as a
    // `user`-role message. Group on the wire role, not the unified one, so a
    // tool-result message immediately followed by a real user message merges
    // into the single `user` turn Anthropic's strict alternation requires.
    let rest: Vec<Message> = rest
        .into_iter()
        .map(|mut message| {
            if message.role != crate::types::Role::assistant() {
                message.role = crate::types::Role::user();
            }
            message
        })
        .collect();
    let rest = merge_consecutive(rest);

    let mut messages = Vec::with_capacity(rest.len());
    for message in &rest {
        messages.push(convert_message(message)?);
    }

    if messages.is_empty() {
        return Err(LLMError::InvalidRequest {
            message: "Anthropic Messages request requires at least one user/assistant message"
                .to_string(),
        });
    }
    body.insert("messages".to_string(), Value::Array(messages));

    if let Some(system) = system {
        body.insert("system".to_string(), Value::String(system));
    }

    let max_tokens = request
        .options
        .max_output_tokens
        .map(|tokens| tokens as u64)
        .unwrap_or(DEFAULT_MAX_TOKENS);
    body.insert("max_tokens".to_string(), Value::from(max_tokens));

    if let Some(temperature) = request.options.temperature {
        body.insert("temperature".to_string(), Value::from(temperature));
    }
    if let Some(top_p) = request.options.top_p {
        body.insert("top_p".to_string(), Value::from(top_p));
    }
    if !request.options.stop_sequences.is_empty() {
        body.insert(
            "stop_sequences".to_string(),
            Value::Array(
                request
                    .options
                    .stop_sequences
                    .iter()
                    .cloned()
                    .map(Value::String)
                    .collect(),
            ),
        );
    }

    if let Some(thinking) = build_thinking(request) {
        body.insert("thinking".to_string(), thinking);
    }

    // Anthropic has no `tool_choice: "none"` mode; the only way to stop the
    // model from calling tools is to not advertise any, so `ToolChoice::None`
    // drops the `tools` array entirely instead of sending it alongside an
    // omitted `tool_choice`.
    let tools_suppressed = matches!(request.tool_choice, Some(ToolChoice::None));
    if !request.tools.is_empty() && !tools_suppressed {
        body.insert(
            "tools".to_string(),
            Value::Array(convert_tools(&request.tools)?),
        );
    }
    if let Some(choice) = &request.tool_choice {
        if let Some(value) =
            convert_tool_choice(choice, request.options.parallel_tool_calls.unwrap_or(true))
        {
            body.insert("tool_choice".to_string(), value);
        }
    }

    if request.response_format.is_some() {
        return Err(LLMError::InvalidRequest {
            message: "anthropic_messages does not support response_format; use a forced tool call instead"
                .to_string(),
        });
    }

    if let Some(metadata) = &request.metadata {
        let meta: Map<String, Value> = metadata.clone().into_iter().collect();
        body.insert("metadata".to_string(), Value::Object(meta));
    }

    if let Some(anthropic_options) = request.provider_options.get("anthropic") {
        if let Some(extra) = anthropic_options.as_object() {
            for (k, v) in extra {
                if k == "beta" {
                    continue; // consumed as a header, not a body field
                }
                body.insert(k.clone(), v.clone());
            }
        }
    }

    for (k, v) in &request.options.extra {
        body.insert(k.clone(), v.clone());
    }

    body.insert("stream".to_string(), Value::Bool(stream));

    Ok(Value::Object(body))
}

fn convert_message(message: &Message) -> Result<Value, LLMError> {
    let mut obj = Map::new();

    let role = match message.role.0.as_str() {
        "assistant" => "assistant",
        _ => "user",
    };
    obj.insert("role".to_string(), Value::String(role.to_string()));

    let mut content_blocks = Vec::new();
    for part in &message.content {
        content_blocks.push(convert_content_part(part, &message.tool_call_id)?);
    }

    if content_blocks.is_empty() {
        return Err(LLMError::InvalidRequest {
            message: "message must contain at least one content part".to_string(),
        });
    }

    obj.insert("content".to_string(), Value::Array(content_blocks));
    Ok(Value::Object(obj))
}

fn convert_content_part(part: &ContentPart, tool_call_id: &Option<String>) -> Result<Value, LLMError> {
    match part {
        ContentPart::Text(text) => Ok(json!({
            "type": "text",
            "text": text.text
        })),
        ContentPart::Thinking(thinking) => Ok(json!({
            "type": "thinking",
            "thinking": thinking.text,
            "signature": thinking.signature
        })),
        ContentPart::RedactedThinking(redacted) => Ok(json!({
            "type": "redacted_thinking",
            "data": redacted.data
        })),
        ContentPart::Image(ImageContent { source, .. }) => match source {
            ImageSource::Base64 { data, mime_type } => {
                let media_type = mime_type.clone().unwrap_or_else(|| "image/png".to_string());
                Ok(json!({
                    "type": "image",
                    "source": {
                        "type": "base64",
                        "media_type": media_type,
                        "data": data
                    }
                }))
            }
            ImageSource::Url { url } => Ok(json!({
                "type": "image",
                "source": { "type": "url", "url": url }
            })),
            ImageSource::FileId { file_id } => Ok(json!({
                "type": "image",
                "source": { "type": "file", "file_id": file_id }
            })),
        },
        ContentPart::ToolCall(ToolCall { id, name, arguments, .. }) => {
            let id = id.clone().ok_or_else(|| LLMError::InvalidToolCall {
                message: "assistant tool_use block requires an id".to_string(),
            })?;
            Ok(json!({
                "type": "tool_use",
                "id": id,
                "name": name,
                "input": arguments
            }))
        }
        ContentPart::ToolResult(ToolResult {
            call_id,
            content,
            is_error,
            ..
        }) => {
            let tool_use_id = call_id
                .clone()
                .or_else(|| tool_call_id.clone())
                .ok_or_else(|| LLMError::InvalidRequest {
                    message: "tool_result content requires call_id (mapped to tool_use_id)".to_string(),
                })?;
            Ok(json!({
                "type": "tool_result",
                "tool_use_id": tool_use_id,
                "content": content,
                "is_error": is_error
            }))
        }
        ContentPart::Audio(_) | ContentPart::Video(_) | ContentPart::File(_) => {
            Err(LLMError::InvalidRequest {
                message: "anthropic_messages does not support audio/video/file content parts"
                    .to_string(),
            })
        }
        ContentPart::Data { data } => Ok(data.clone()),
    }
}

fn build_thinking(request: &ChatRequest) -> Option<Value> {
    if matches!(request.options.reasoning_effort, Some(ReasoningEffort::None) | None)
        && request.options.reasoning_budget_tokens.is_none()
    {
        return None;
    }
    let budget = request.options.reasoning_budget_tokens.unwrap_or(1024);
    Some(json!({
        "type": "enabled",
        "budget_tokens": budget
    }))
}

fn convert_tools(tools: &[ToolDefinition]) -> Result<Vec<Value>, LLMError> {
    let mut result = Vec::new();
    for tool in tools {
        match &tool.kind {
            ToolKind::Function => {
                result.push(json!({
                    "type": "custom",
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": tool.input_schema
                }));
            }
            ToolKind::Custom { name, config } => {
                if let Some(cfg) = config {
                    result.push(cfg.clone());
                } else {
                    result.push(json!({ "type": name, "name": tool.name }));
                }
            }
            ToolKind::FileSearch | ToolKind::WebSearch | ToolKind::ComputerUse => {
                return Err(LLMError::InvalidRequest {
                    message: "anthropic_messages only supports function or custom tool configs"
                        .to_string(),
                });
            }
        }
    }
    Ok(result)
}

fn convert_tool_choice(choice: &ToolChoice, parallel_tool_calls: bool) -> Option<Value> {
    let disable_parallel_tool_use = !parallel_tool_calls;
    match choice {
        ToolChoice::Auto => Some(json!({
            "type": "auto",
            "disable_parallel_tool_use": disable_parallel_tool_use
        })),
        ToolChoice::Required => Some(json!({
            "type": "any",
            "disable_parallel_tool_use": disable_parallel_tool_use
        })),
        ToolChoice::Tool { name } => Some(json!({
            "type": "tool",
            "name": name,
            "disable_parallel_tool_use": disable_parallel_tool_use
        })),
        // Anthropic has no explicit "none"; omitting tool_choice with tools still
        // attached is the closest approximation.
        ToolChoice::None => None,
        ToolChoice::Custom(value) => Some(value.clone()),
    }
}
