use std::collections::HashMap;

use serde_json::Value;

use crate::base::CallIdMinter;
use crate::error::LLMError;
use crate::types::{
    ChatResponse, ContentPart, FinishReason, FinishReasonKind, Message, ProviderMetadata, Role,
    TextContent, TokenUsage, ToolCall, ToolCallKind, ToolResult,
};

use super::types::{GeminiContent, GeminiGenerateContentResponse, GeminiUsageMetadata};

/// Maps a Gemini `GenerateContentResponse` onto the unified [`ChatResponse`].
///
/// Gemini reports at most one candidate in the non-streaming path this crate
/// uses (`candidateCount` is never set above 1), so only the first candidate
/// is translated; function calls and function responses are embedded as
/// `ContentPart::ToolCall`/`ContentPart::ToolResult` inside the message
/// content rather than surfaced separately.
pub(crate) fn map_response(
    resp: GeminiGenerateContentResponse,
    provider: &'static str,
    endpoint: String,
) -> Result<ChatResponse, LLMError> {
    let raw = serde_json::to_value(&resp).ok();
    let minter = CallIdMinter::new();

    let message = match resp.candidates.first().and_then(|c| c.content.as_ref()) {
        Some(content) => convert_candidate_content(content, provider, &minter)?,
        None => Message {
            role: Role::assistant(),
            name: None,
            content: Vec::new(),
            tool_call_id: None,
            metadata: None,
        },
    };

    // A functionCall part anywhere in the candidate always means `tool_calls`,
    // regardless of what Gemini itself reports as the finish reason (it
    // sometimes still reports STOP alongside a function call).
    let has_tool_call = message
        .content
        .iter()
        .any(|part| matches!(part, ContentPart::ToolCall(_)));
    let finish_reason = match resp
        .candidates
        .first()
        .and_then(|c| c.finish_reason.as_deref())
    {
        Some(reason) if has_tool_call => Some(FinishReason::new(
            FinishReasonKind::ToolCalls,
            reason.to_string(),
        )),
        Some(reason) => Some(convert_finish_reason(reason)),
        None if has_tool_call => Some(FinishReason::new(FinishReasonKind::ToolCalls, "STOP")),
        None => None,
    };
    let usage = resp.usage_metadata.as_ref().map(convert_usage);
    let model = resp.model_version.clone();

    Ok(ChatResponse {
        message,
        usage,
        finish_reason,
        model,
        provider: ProviderMetadata {
            provider: provider.to_string(),
            request_id: resp.response_id,
            endpoint: Some(endpoint),
            raw,
        },
        rate_limit: None,
    })
}

fn convert_candidate_content(
    content: &GeminiContent,
    provider: &'static str,
    minter: &CallIdMinter,
) -> Result<Message, LLMError> {
    let role = content
        .role
        .as_deref()
        .map(|r| match r {
            "model" => Role::assistant(),
            other => Role(other.to_string()),
        })
        .unwrap_or_else(Role::assistant);

    let mut parts = Vec::with_capacity(content.parts.len());

    for part in &content.parts {
        if let Some(call) = &part.function_call {
            let id = minter.mint(&call.name);
            parts.push(ContentPart::ToolCall(ToolCall {
                id: Some(id),
                name: call.name.clone(),
                arguments: call.args.clone(),
                kind: ToolCallKind::Function,
            }));
            continue;
        }

        if let Some(resp) = &part.function_response {
            // Gemini's functionResponse carries the function's name, not a
            // call id; mint one so `ToolResult.call_id` stays populated and
            // consistent with how the matching `ToolCall` above was minted.
            let call_id = minter.mint(&resp.name);
            parts.push(ContentPart::ToolResult(ToolResult {
                call_id: Some(call_id),
                content: resp.response.to_string(),
                is_error: false,
                image: None,
                metadata: None,
            }));
            continue;
        }

        if let Some(text) = &part.text {
            if !text.is_empty() {
                parts.push(ContentPart::Text(TextContent { text: text.clone() }));
                continue;
            }
        }

        // Inline data, file data, executable code, and code execution
        // results have no dedicated unified representation; pass them
        // through as opaque data for callers that need them.
        let data = serde_json::to_value(part).map_err(|err| LLMError::Provider {
            provider,
            message: format!("failed to serialize Gemini part: {err}"),
        })?;
        parts.push(ContentPart::Data { data });
    }

    Ok(Message {
        role,
        name: None,
        content: parts,
        tool_call_id: None,
        metadata: None,
    })
}

/// Maps a Gemini `finishReason` string onto the unified [`FinishReason`].
pub(crate) fn convert_finish_reason(reason: &str) -> FinishReason {
    let unified = match reason {
        "STOP" => FinishReasonKind::Stop,
        "MAX_TOKENS" => FinishReasonKind::Length,
        "MALFORMED_FUNCTION_CALL" => FinishReasonKind::ToolCalls,
        "SAFETY" | "RECITATION" | "LANGUAGE" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII"
        | "IMAGE_SAFETY" => FinishReasonKind::ContentFilter,
        other => FinishReasonKind::Other(other.to_string()),
    };
    FinishReason::new(unified, reason)
}

/// Maps `usageMetadata` onto the unified [`TokenUsage`].
pub(crate) fn convert_usage(usage: &GeminiUsageMetadata) -> TokenUsage {
    let mut details = HashMap::new();

    if let Some(v) = usage.tool_use_prompt_token_count {
        details.insert("tool_use_prompt_token_count".to_string(), Value::from(v));
    }
    for (k, v) in &usage.extra {
        details.insert(k.clone(), v.clone());
    }

    TokenUsage {
        prompt_tokens: usage.prompt_token_count,
        completion_tokens: usage.candidates_token_count,
        reasoning_tokens: usage.thoughts_token_count,
        cache_read_tokens: usage.cached_content_token_count,
        cache_write_tokens: None,
        total_tokens: usage.total_token_count,
        details: if details.is_empty() { None } else { Some(details) },
    }
}

#[cfg(test)]
mod tests {
    use super::super::types::{GeminiCandidate, GeminiPart, GeminiUsageMetadata};
    use super::*;

    #[test]
    fn map_basic_text_response() {
        let candidate = GeminiCandidate {
            content: Some(GeminiContent {
                parts: vec![GeminiPart {
                    text: Some("hello, world".to_string()),
                    inline_data: None,
                    file_data: None,
                    function_call: None,
                    function_response: None,
                    executable_code: None,
                    code_execution_result: None,
                    extra: HashMap::new(),
                }],
                role: Some("model".to_string()),
                extra: HashMap::new(),
            }),
            finish_reason: Some("STOP".to_string()),
            index: Some(0),
            extra: HashMap::new(),
        };

        let resp = GeminiGenerateContentResponse {
            candidates: vec![candidate],
            prompt_feedback: None,
            usage_metadata: Some(GeminiUsageMetadata {
                prompt_token_count: Some(4),
                cached_content_token_count: None,
                candidates_token_count: Some(7),
                total_token_count: Some(11),
                tool_use_prompt_token_count: None,
                thoughts_token_count: None,
                extra: HashMap::new(),
            }),
            model_version: Some("gemini-2.0-flash".to_string()),
            response_id: Some("resp-1".to_string()),
            extra: HashMap::new(),
        };

        let mapped =
            map_response(resp, "google_gemini", "endpoint".to_string()).expect("map succeeds");

        assert_eq!(mapped.model.as_deref(), Some("gemini-2.0-flash"));
        let reason = mapped.finish_reason.expect("finish reason");
        assert_eq!(reason.unified, FinishReasonKind::Stop);
        assert_eq!(reason.raw.as_deref(), Some("STOP"));
        assert_eq!(mapped.provider.provider, "google_gemini");
        assert_eq!(mapped.provider.endpoint.as_deref(), Some("endpoint"));

        assert_eq!(mapped.message.role.0, "assistant");
        assert_eq!(mapped.message.text().as_deref(), Some("hello, world"));

        let usage = mapped.usage.expect("usage should exist");
        assert_eq!(usage.prompt_tokens, Some(4));
        assert_eq!(usage.completion_tokens, Some(7));
        assert_eq!(usage.total_tokens, Some(11));
    }

    #[test]
    fn embeds_function_call_as_tool_call_content_part() {
        let candidate = GeminiCandidate {
            content: Some(GeminiContent {
                parts: vec![GeminiPart {
                    text: None,
                    inline_data: None,
                    file_data: None,
                    function_call: Some(super::super::types::GeminiFunctionCall {
                        name: "get_weather".to_string(),
                        args: serde_json::json!({"city": "nyc"}),
                    }),
                    function_response: None,
                    executable_code: None,
                    code_execution_result: None,
                    extra: HashMap::new(),
                }],
                role: Some("model".to_string()),
                extra: HashMap::new(),
            }),
            finish_reason: None,
            index: Some(0),
            extra: HashMap::new(),
        };

        let resp = GeminiGenerateContentResponse {
            candidates: vec![candidate],
            prompt_feedback: None,
            usage_metadata: None,
            model_version: None,
            response_id: None,
            extra: HashMap::new(),
        };

        let mapped =
            map_response(resp, "google_gemini", "endpoint".to_string()).expect("map succeeds");
        let calls = mapped.message.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "get_weather");
        assert!(calls[0].id.is_some());
    }

    #[test]
    fn embeds_function_response_as_tool_result_content_part() {
        let candidate = GeminiCandidate {
            content: Some(GeminiContent {
                parts: vec![GeminiPart {
                    text: None,
                    inline_data: None,
                    file_data: None,
                    function_call: None,
                    function_response: Some(super::super::types::GeminiFunctionResponse {
                        name: "get_weather".to_string(),
                        response: serde_json::json!({"temp": 25}),
                    }),
                    executable_code: None,
                    code_execution_result: None,
                    extra: HashMap::new(),
                }],
                role: Some("model".to_string()),
                extra: HashMap::new(),
            }),
            finish_reason: None,
            index: Some(0),
            extra: HashMap::new(),
        };

        let resp = GeminiGenerateContentResponse {
            candidates: vec![candidate],
            prompt_feedback: None,
            usage_metadata: None,
            model_version: None,
            response_id: None,
            extra: HashMap::new(),
        };

        let mapped =
            map_response(resp, "google_gemini", "endpoint".to_string()).expect("map succeeds");
        let results: Vec<&ToolResult> = mapped
            .message
            .content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolResult(result) => Some(result),
                _ => None,
            })
            .collect();
        assert_eq!(results.len(), 1);
        assert!(!results[0].is_error);
        assert!(results[0].call_id.is_some());
    }

    #[test]
    fn function_call_overrides_stop_finish_reason() {
        let candidate = GeminiCandidate {
            content: Some(GeminiContent {
                parts: vec![GeminiPart {
                    text: None,
                    inline_data: None,
                    file_data: None,
                    function_call: Some(super::super::types::GeminiFunctionCall {
                        name: "get_weather".to_string(),
                        args: serde_json::json!({"city": "nyc"}),
                    }),
                    function_response: None,
                    executable_code: None,
                    code_execution_result: None,
                    extra: HashMap::new(),
                }],
                role: Some("model".to_string()),
                extra: HashMap::new(),
            }),
            // Gemini sometimes reports STOP even though a function call is present.
            finish_reason: Some("STOP".to_string()),
            index: Some(0),
            extra: HashMap::new(),
        };

        let resp = GeminiGenerateContentResponse {
            candidates: vec![candidate],
            prompt_feedback: None,
            usage_metadata: None,
            model_version: None,
            response_id: None,
            extra: HashMap::new(),
        };

        let mapped =
            map_response(resp, "google_gemini", "endpoint".to_string()).expect("map succeeds");
        let reason = mapped.finish_reason.expect("finish reason");
        assert!(reason.is_tool_calls());
    }

    #[test]
    fn convert_finish_reason_variants() {
        assert_eq!(convert_finish_reason("STOP").unified, FinishReasonKind::Stop);
        assert_eq!(
            convert_finish_reason("MAX_TOKENS").unified,
            FinishReasonKind::Length
        );
        assert_eq!(
            convert_finish_reason("MALFORMED_FUNCTION_CALL").unified,
            FinishReasonKind::ToolCalls
        );
        assert_eq!(
            convert_finish_reason("SAFETY").unified,
            FinishReasonKind::ContentFilter
        );
        assert_eq!(
            convert_finish_reason("BLOCKLIST").unified,
            FinishReasonKind::ContentFilter
        );
        assert_eq!(
            convert_finish_reason("OTHER").unified,
            FinishReasonKind::Other("OTHER".to_string())
        );
    }
}
