use serde_json::Value;

use crate::error::LLMError;
use crate::types::{
    ChatResponse, ContentPart, FinishReason, FinishReasonKind, ImageContent, ImageDetail,
    ImageSource, Message, ProviderMetadata, RedactedThinkingContent, Role, TextContent,
    ThinkingContent, TokenUsage, ToolCall, ToolCallKind,
};

use super::types::{AnthropicContentBlock, AnthropicMessageResponse, AnthropicUsage};

pub(crate) fn map_response(
    parsed: AnthropicMessageResponse,
    provider_name: &'static str,
    endpoint: String,
) -> Result<ChatResponse, LLMError> {
    let finish_reason = parsed.stop_reason.as_deref().map(convert_finish_reason);

    let mut content = Vec::with_capacity(parsed.content.len());
    for block in &parsed.content {
        content.push(convert_content_block(block)?);
    }

    let message = Message {
        role: Role::assistant(),
        name: None,
        content,
        tool_call_id: None,
        metadata: None,
    };

    let usage = parsed.usage.as_ref().map(convert_usage);
    let raw = serde_json::to_value(&parsed).ok();

    Ok(ChatResponse {
        message,
        usage,
        finish_reason,
        model: Some(parsed.model),
        provider: ProviderMetadata {
            provider: provider_name.to_string(),
            request_id: parsed.id.clone(),
            endpoint: Some(endpoint),
            raw,
        },
        rate_limit: None,
    })
}

fn convert_content_block(block: &AnthropicContentBlock) -> Result<ContentPart, LLMError> {
    match block.kind.as_str() {
        "text" => Ok(ContentPart::Text(TextContent {
            text: block.text.clone().unwrap_or_default(),
        })),
        "thinking" => Ok(ContentPart::Thinking(ThinkingContent {
            text: block.text.clone().unwrap_or_default(),
            signature: block
                .extra
                .get("signature")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        })),
        "redacted_thinking" => Ok(ContentPart::RedactedThinking(RedactedThinkingContent {
            data: block
                .extra
                .get("data")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        })),
        "tool_use" => Ok(ContentPart::ToolCall(ToolCall {
            id: block.id.clone(),
            name: block.name.clone().unwrap_or_default(),
            arguments: block.input.clone().unwrap_or(Value::Null),
            kind: ToolCallKind::Function,
        })),
        "image" => {
            let source = block.source.as_ref().map(|s| ImageSource::Base64 {
                data: s.data.clone(),
                mime_type: Some(s.media_type.clone()),
            });
            Ok(ContentPart::Image(ImageContent {
                source: source.unwrap_or(ImageSource::Base64 {
                    data: String::new(),
                    mime_type: None,
                }),
                detail: Some(ImageDetail::Auto),
                metadata: None,
            }))
        }
        _ => Ok(ContentPart::Data {
            data: serde_json::to_value(block).unwrap_or(Value::Null),
        }),
    }
}

pub(crate) fn convert_finish_reason(reason: &str) -> FinishReason {
    let unified = match reason {
        "end_turn" | "stop_sequence" => FinishReasonKind::Stop,
        "max_tokens" => FinishReasonKind::Length,
        "tool_use" => FinishReasonKind::ToolCalls,
        other => FinishReasonKind::Other(other.to_string()),
    };
    FinishReason::new(unified, reason)
}

pub(crate) fn convert_usage(usage: &AnthropicUsage) -> TokenUsage {
    let prompt_tokens = usage.input_tokens;
    let completion_tokens = usage.output_tokens;
    let total_tokens = match (prompt_tokens, completion_tokens) {
        (Some(p), Some(c)) => Some(p + c),
        (Some(p), None) => Some(p),
        (None, Some(c)) => Some(c),
        (None, None) => None,
    };
    TokenUsage {
        prompt_tokens,
        completion_tokens,
        reasoning_tokens: None,
        cache_read_tokens: usage.cache_read_input_tokens,
        cache_write_tokens: usage.cache_creation_input_tokens,
        total_tokens,
        details: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parsed_with(content: Vec<AnthropicContentBlock>, stop_reason: Option<&str>) -> AnthropicMessageResponse {
        AnthropicMessageResponse {
            id: Some("msg_1".to_string()),
            r#type: "message".to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            role: "assistant".to_string(),
            content,
            stop_reason: stop_reason.map(str::to_string),
            stop_sequence: None,
            usage: Some(AnthropicUsage {
                input_tokens: Some(10),
                output_tokens: Some(5),
                cache_creation_input_tokens: Some(2),
                cache_read_input_tokens: Some(1),
            }),
            extra: HashMap::new(),
        }
    }

    fn block(kind: &str) -> AnthropicContentBlock {
        AnthropicContentBlock {
            kind: kind.to_string(),
            text: Some("hello".to_string()),
            id: None,
            name: None,
            input: None,
            tool_use_id: None,
            content: None,
            source: None,
            extra: HashMap::new(),
        }
    }

    #[test]
    fn maps_tool_use_finish_reason_and_embeds_tool_call_in_message() {
        let mut tool_block = block("tool_use");
        tool_block.id = Some("toolu_1".to_string());
        tool_block.name = Some("get_weather".to_string());
        tool_block.input = Some(serde_json::json!({"city": "nyc"}));

        let parsed = parsed_with(vec![tool_block], Some("tool_use"));
        let response = map_response(
            parsed,
            "anthropic_messages",
            "https://api.anthropic.com/v1/messages".to_string(),
        )
        .expect("map");

        let reason = response.finish_reason.expect("finish reason");
        assert!(reason.is_tool_calls());
        assert_eq!(reason.raw.as_deref(), Some("tool_use"));
        assert_eq!(response.message.tool_calls().len(), 1);
    }

    #[test]
    fn maps_cache_tokens_onto_unified_usage_fields() {
        let parsed = parsed_with(vec![block("text")], Some("end_turn"));
        let response = map_response(parsed, "anthropic_messages", "endpoint".to_string()).expect("map");
        let usage = response.usage.expect("usage");
        assert_eq!(usage.cache_read_tokens, Some(1));
        assert_eq!(usage.cache_write_tokens, Some(2));
        assert_eq!(usage.total_tokens, Some(15));
    }
}
