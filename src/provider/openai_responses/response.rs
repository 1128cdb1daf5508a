use serde_json::Value;

use crate::error::LLMError;
use crate::types::{
    ChatResponse, ContentPart, FinishReason, FinishReasonKind, Message, ProviderMetadata,
    RedactedThinkingContent, Role, TextContent, ThinkingContent, TokenUsage, ToolCall,
    ToolCallKind, ToolResult,
};

use super::types::{OpenAiResponsesResponse, OpenAiResponsesUsage};

pub(crate) fn map_responses_response(
    resp: OpenAiResponsesResponse,
    provider_name: &'static str,
    endpoint: String,
) -> Result<ChatResponse, LLMError> {
    let raw = serde_json::to_value(&resp).ok();
    let mut content = Vec::new();
    let mut has_tool_call = false;

    for item in &resp.output {
        let kind = item.get("type").and_then(|v| v.as_str()).unwrap_or_default();
        match kind {
            "message" => content.extend(convert_message_item(item)?),
            "function_call" => {
                has_tool_call = true;
                content.push(ContentPart::ToolCall(convert_function_call_item(item)?));
            }
            "function_call_output" => {
                content.push(ContentPart::ToolResult(convert_function_call_output_item(
                    item,
                )?));
            }
            "reasoning" => {
                if let Some(part) = convert_reasoning_item(item) {
                    content.push(part);
                }
            }
            _ => content.push(ContentPart::Data { data: item.clone() }),
        }
    }

    let message = Message {
        role: Role::assistant(),
        name: None,
        content,
        tool_call_id: None,
        metadata: None,
    };

    let usage = resp.usage.as_ref().map(convert_usage);
    let finish_reason = convert_finish_reason(
        resp.status.as_deref(),
        resp.incomplete_details.as_ref(),
        resp.error.as_ref(),
        has_tool_call,
    );

    Ok(ChatResponse {
        message,
        usage,
        finish_reason,
        model: Some(resp.model),
        provider: ProviderMetadata {
            provider: provider_name.to_string(),
            request_id: Some(resp.id),
            endpoint: Some(endpoint),
            raw,
        },
        rate_limit: None,
    })
}

fn convert_message_item(item: &Value) -> Result<Vec<ContentPart>, LLMError> {
    let mut parts = Vec::new();
    match item.get("content") {
        Some(Value::Array(items)) => {
            for part in items {
                let part_type = part.get("type").and_then(|v| v.as_str()).unwrap_or_default();
                match part_type {
                    "output_text" => {
                        if let Some(text) = part.get("text").and_then(|v| v.as_str()) {
                            parts.push(ContentPart::Text(TextContent {
                                text: text.to_string(),
                            }));
                        }
                    }
                    // refusal / file_citation / url_citation and other annotated
                    // content types have no dedicated unified representation yet.
                    _ => parts.push(ContentPart::Data { data: part.clone() }),
                }
            }
        }
        Some(Value::String(text)) => {
            parts.push(ContentPart::Text(TextContent {
                text: text.to_string(),
            }));
        }
        _ => {}
    }
    Ok(parts)
}

fn convert_function_call_item(item: &Value) -> Result<ToolCall, LLMError> {
    let call_id = item
        .get("call_id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let name = item
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let arguments_raw = item
        .get("arguments")
        .and_then(|v| v.as_str())
        .unwrap_or("{}");
    let arguments =
        serde_json::from_str(arguments_raw).unwrap_or_else(|_| Value::String(arguments_raw.to_string()));

    Ok(ToolCall {
        id: call_id,
        name,
        arguments,
        kind: ToolCallKind::Function,
    })
}

fn convert_function_call_output_item(item: &Value) -> Result<ToolResult, LLMError> {
    let call_id = item
        .get("call_id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let content = match item.get("output") {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };

    Ok(ToolResult {
        call_id,
        content,
        is_error: false,
        image: None,
        metadata: None,
    })
}

fn convert_reasoning_item(item: &Value) -> Option<ContentPart> {
    let summary = item.get("summary")?.as_array()?;
    let mut buffer = String::new();
    for entry in summary {
        if let Some(text) = entry.get("text").and_then(|v| v.as_str()) {
            if !buffer.is_empty() {
                buffer.push('\n');
            }
            buffer.push_str(text);
        }
    }
    if buffer.is_empty() {
        let encrypted = item.get("encrypted_content").and_then(|v| v.as_str())?;
        Some(ContentPart::RedactedThinking(RedactedThinkingContent {
            data: encrypted.to_string(),
        }))
    } else {
        Some(ContentPart::Thinking(ThinkingContent {
            text: buffer,
            signature: None,
        }))
    }
}

/// Maps `status`/`incomplete_details`/`error` to a unified finish reason. A
/// `function_call` item anywhere in the output always wins over the vendor's
/// own status, matching how Chat Completions and Anthropic both report
/// `tool_calls`/`tool_use` as the terminal reason whenever calls are present.
fn convert_finish_reason(
    status: Option<&str>,
    incomplete_details: Option<&Value>,
    error: Option<&Value>,
    has_tool_call: bool,
) -> Option<FinishReason> {
    if has_tool_call {
        return Some(FinishReason::new(
            FinishReasonKind::ToolCalls,
            status.unwrap_or("tool_calls"),
        ));
    }
    if let Some(err) = error {
        if !err.is_null() {
            return Some(FinishReason::new(FinishReasonKind::Error, "error"));
        }
    }
    match status {
        Some("completed") => Some(FinishReason::new(FinishReasonKind::Stop, "completed")),
        Some("incomplete") => {
            let reason = incomplete_details
                .and_then(|d| d.get("reason"))
                .and_then(|v| v.as_str())
                .unwrap_or("incomplete");
            let unified = match reason {
                "max_output_tokens" => FinishReasonKind::Length,
                "content_filter" => FinishReasonKind::ContentFilter,
                other => FinishReasonKind::Other(other.to_string()),
            };
            Some(FinishReason::new(unified, reason))
        }
        Some("failed") => Some(FinishReason::new(FinishReasonKind::Error, "failed")),
        Some(other) => Some(FinishReason::new(
            FinishReasonKind::Other(other.to_string()),
            other,
        )),
        None => None,
    }
}

pub(crate) fn convert_usage(usage: &OpenAiResponsesUsage) -> TokenUsage {
    let reasoning_tokens = usage
        .output_tokens_details
        .as_ref()
        .and_then(|details| details.get("reasoning_tokens"))
        .and_then(|v| v.as_u64());
    let cache_read_tokens = usage
        .input_tokens_details
        .as_ref()
        .and_then(|details| details.get("cached_tokens"))
        .and_then(|v| v.as_u64());

    TokenUsage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        reasoning_tokens,
        cache_read_tokens,
        cache_write_tokens: None,
        total_tokens: usage.total_tokens,
        details: None,
    }
}
