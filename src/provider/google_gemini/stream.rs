use futures_util::StreamExt;
use serde_json::Value;

use crate::base::CallIdMinter;
use crate::error::LLMError;
use crate::http::HttpBodyStream;
use crate::provider::ChatStream;
use crate::sse::{SseDecoder, SseEvent};
use crate::types::{ChatChunk, FinishReason, FinishReasonKind, ProviderMetadata, StreamEvent};

use super::response::convert_usage;
use super::types::GeminiGenerateContentResponse;

/// Gemini never assigns call ids, and each `functionCall` part arrives
/// whole rather than incrementally, so each one mints a fresh id and is
/// immediately started, delta'd, and ended within the same chunk.
#[derive(Default)]
struct StreamState {
    text_started: bool,
    next_tool_index: usize,
    minter: CallIdMinter,
    saw_tool_call: bool,
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

fn convert_event(
    event: &SseEvent,
    provider: &'static str,
    endpoint: &str,
    state: &mut StreamState,
) -> Result<Option<ChatChunk>, LLMError> {
    if event.data.is_empty() {
        return Ok(None);
    }
    let chunk: GeminiGenerateContentResponse =
        serde_json::from_str(&event.data).map_err(|err| LLMError::Stream {
            message: format!("invalid Gemini stream chunk JSON: {err}"),
        })?;

    let mut events = Vec::new();
    let candidate = chunk.candidates.first();

    if let Some(candidate) = candidate {
        if let Some(content) = &candidate.content {
            for part in &content.parts {
                if let Some(call) = &part.function_call {
                    let index = state.next_tool_index;
                    state.next_tool_index += 1;
                    state.saw_tool_call = true;
                    let id = state.minter.mint(&call.name);
                    let arguments_delta =
                        serde_json::to_string(&call.args).unwrap_or_else(|_| "{}".to_string());
                    events.push(StreamEvent::ToolCallStart {
                        index,
                        id: id.clone(),
                        name: call.name.clone(),
                    });
                    events.push(StreamEvent::ToolCallDelta {
                        index,
                        id: id.clone(),
                        arguments_delta,
                    });
                    events.push(StreamEvent::ToolCallEnd { index, id });
                    continue;
                }

                if let Some(text) = &part.text {
                    if !text.is_empty() {
                        if !state.text_started {
                            state.text_started = true;
                            events.push(StreamEvent::TextStart { index: 0 });
                        }
                        events.push(StreamEvent::TextDelta {
                            index: 0,
                            text: text.clone(),
                        });
                    }
                    continue;
                }

                // Inline data, executable code, and code execution results
                // have no dedicated streaming representation yet.
                events.push(StreamEvent::ProviderEvent {
                    raw: serde_json::to_value(part).unwrap_or(Value::Null),
                });
            }
        }

        if let Some(reason) = &candidate.finish_reason {
            if state.text_started {
                state.text_started = false;
                events.push(StreamEvent::TextEnd { index: 0 });
            }
            let usage = chunk.usage_metadata.as_ref().map(convert_usage);
            let finish_reason = if state.saw_tool_call {
                FinishReason::new(FinishReasonKind::ToolCalls, reason.clone())
            } else {
                super::response::convert_finish_reason(reason)
            };
            events.push(StreamEvent::Finish { finish_reason, usage });
        }
    }

    if events.is_empty() {
        return Ok(None);
    }

    let raw = serde_json::to_value(&chunk).ok();
    Ok(Some(ChatChunk {
        events,
        provider: ProviderMetadata {
            provider: provider.to_string(),
            request_id: chunk.response_id,
            endpoint: Some(endpoint.to_string()),
            raw,
        },
    }))
}
