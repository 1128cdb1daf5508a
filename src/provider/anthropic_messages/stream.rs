use std::collections::HashMap;

use futures_util::StreamExt;
use serde_json::Value;

use crate::error::LLMError;
use crate::http::HttpBodyStream;
use crate::provider::ChatStream;
use crate::sse::{SseDecoder, SseEvent};
use crate::types::{ChatChunk, ProviderMetadata, StreamEvent};

use super::response::convert_finish_reason;
use super::response::convert_usage;
use super::types::AnthropicUsage;

/// What kind of content block a `content_block_start` opened, so that the
/// matching `content_block_delta`/`content_block_stop` (which repeat only the
/// index, not the type) can be converted into the right unified event.
#[derive(Clone)]
struct OpenBlock {
    kind: BlockKind,
    /// `tool_use` blocks carry an id at `content_block_start` time that
    /// `content_block_delta`/`content_block_stop` never repeat.
    tool_call_id: String,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    Thinking,
    ToolUse,
    Other,
}

#[derive(Default)]
struct StreamState {
    open_blocks: HashMap<usize, OpenBlock>,
}

pub(crate) fn create_stream(
    body: HttpBodyStream,
    provider: &'static str,
    endpoint: String,
) -> ChatStream {
    let decoder = SseDecoder::new(body, provider);
    let mut state = StreamState::default();

    let stream = decoder.filter_map(move |event| {
        let result = match event {
            Ok(event) => convert_event(&event, provider, &endpoint, &mut state),
            Err(err) => Err(err),
        };
        async move {
            match result {
                Ok(Some(chunk)) => Some(Ok(chunk)),
                Ok(None) => None,
                Err(err) => Some(Err(err)),
            }
        }
    });
    Box::pin(stream)
}

pub(crate) async fn collect_stream_text(
    mut body: HttpBodyStream,
    provider: &'static str,
) -> Result<String, LLMError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = body.next().await {
        bytes.extend_from_slice(&chunk?);
    }
    String::from_utf8(bytes).map_err(|err| LLMError::Provider {
        provider,
        message: format!("failed to decode stream error body: {err}"),
    })
}

fn index_of(value: &Value) -> usize {
    value.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as usize
}

fn convert_event(
    event: &SseEvent,
    provider: &'static str,
    endpoint: &str,
    state: &mut StreamState,
) -> Result<Option<ChatChunk>, LLMError> {
    if event.data.is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(&event.data).map_err(|err| LLMError::Stream {
        message: format!("invalid Anthropic stream event JSON: {err}"),
    })?;

    let events = match value.get("type").and_then(|v| v.as_str()).unwrap_or_default() {
        "message_start" => {
            let usage = value
                .get("message")
                .and_then(|m| m.get("usage"))
                .and_then(|u| serde_json::from_value::<AnthropicUsage>(u.clone()).ok())
                .map(|u| convert_usage(&u));
            vec![StreamEvent::StreamStart { usage }]
        }
        "content_block_start" => {
            let index = index_of(&value);
            let block = value.get("content_block");
            let block_type = block
                .and_then(|b| b.get("type"))
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            match block_type {
                "text" => {
                    state.open_blocks.insert(
                        index,
                        OpenBlock {
                            kind: BlockKind::Text,
                            tool_call_id: String::new(),
                        },
                    );
                    vec![StreamEvent::TextStart { index }]
                }
                "thinking" => {
                    state.open_blocks.insert(
                        index,
                        OpenBlock {
                            kind: BlockKind::Thinking,
                            tool_call_id: String::new(),
                        },
                    );
                    vec![StreamEvent::ReasoningStart { index }]
                }
                "tool_use" => {
                    let id = block
                        .and_then(|b| b.get("id"))
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    let name = block
                        .and_then(|b| b.get("name"))
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    state.open_blocks.insert(
                        index,
                        OpenBlock {
                            kind: BlockKind::ToolUse,
                            tool_call_id: id.clone(),
                        },
                    );
                    vec![StreamEvent::ToolCallStart { index, id, name }]
                }
                _ => {
                    state.open_blocks.insert(
                        index,
                        OpenBlock {
                            kind: BlockKind::Other,
                            tool_call_id: String::new(),
                        },
                    );
                    Vec::new()
                }
            }
        }
        "content_block_delta" => {
            let index = index_of(&value);
            let delta = value.get("delta");
            match delta.and_then(|d| d.get("type")).and_then(|v| v.as_str()) {
                Some("text_delta") => {
                    let text = delta
                        .and_then(|d| d.get("text"))
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    vec![StreamEvent::TextDelta { index, text }]
                }
                Some("thinking_delta") => {
                    let text = delta
                        .and_then(|d| d.get("thinking"))
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    vec![StreamEvent::ReasoningDelta { index, text }]
                }
                Some("input_json_delta") => {
                    let arguments_delta = delta
                        .and_then(|d| d.get("partial_json"))
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    let id = state
                        .open_blocks
                        .get(&index)
                        .map(|b| b.tool_call_id.clone())
                        .unwrap_or_default();
                    vec![StreamEvent::ToolCallDelta {
                        index,
                        id,
                        arguments_delta,
                    }]
                }
                // signature_delta carries a thinking-block signature with no
                // unified representation; the signature surfaces on the
                // non-streaming response path instead.
                _ => Vec::new(),
            }
        }
        "content_block_stop" => {
            let index = index_of(&value);
            match state.open_blocks.remove(&index) {
                Some(OpenBlock { kind: BlockKind::Text, .. }) => vec![StreamEvent::TextEnd { index }],
                Some(OpenBlock {
                    kind: BlockKind::Thinking,
                    ..
                }) => vec![StreamEvent::ReasoningEnd { index }],
                Some(OpenBlock {
                    kind: BlockKind::ToolUse,
                    tool_call_id: id,
                }) => vec![StreamEvent::ToolCallEnd { index, id }],
                _ => Vec::new(),
            }
        }
        "message_delta" => {
            let delta = value.get("delta");
            let finish_reason = delta
                .and_then(|d| d.get("stop_reason"))
                .and_then(|v| v.as_str())
                .map(convert_finish_reason);
            let usage = value
                .get("usage")
                .and_then(|u| serde_json::from_value::<AnthropicUsage>(u.clone()).ok())
                .map(|u| convert_usage(&u));
            match finish_reason {
                Some(finish_reason) => vec![StreamEvent::Finish { finish_reason, usage }],
                None => Vec::new(),
            }
        }
        // `message_stop` ends the stream with no further content; the SSE
        // decoder itself signals end-of-stream once the body closes.
        "message_stop" | "ping" => Vec::new(),
        "error" => {
            let message = value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown Anthropic stream error")
                .to_string();
            vec![StreamEvent::Error { message }]
        }
        _ => Vec::new(),
    };

    if events.is_empty() {
        return Ok(None);
    }

    Ok(Some(ChatChunk {
        events,
        provider: ProviderMetadata {
            provider: provider.to_string(),
            request_id: None,
            endpoint: Some(endpoint.to_string()),
            raw: Some(value),
        },
    }))
}
