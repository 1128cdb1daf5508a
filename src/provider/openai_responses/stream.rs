use std::collections::{HashMap, HashSet};

use futures_util::StreamExt;
use serde_json::Value;

use crate::error::LLMError;
use crate::http::HttpBodyStream;
use crate::provider::ChatStream;
use crate::sse::{SseDecoder, SseEvent};
use crate::types::{ChatChunk, FinishReasonKind, ProviderMetadata, StreamEvent};

use super::response::convert_usage;
use super::types::OpenAiResponsesUsage;

#[derive(Default)]
struct StreamState {
    text_started: HashSet<usize>,
    tool_call_ids: HashMap<usize, String>,
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
    if event.data.is_empty() || event.data.trim() == "[DONE]" {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(&event.data).map_err(|err| LLMError::Stream {
        message: format!("invalid OpenAI Responses stream event JSON: {err}"),
    })?;

    let event_type = value.get("type").and_then(|v| v.as_str()).unwrap_or_default();
    let events = match event_type {
        "response.output_item.added" => {
            let index = value.get("output_index").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
            let item = value.get("item");
            let item_type = item
                .and_then(|i| i.get("type"))
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            if item_type == "function_call" {
                let id = item
                    .and_then(|i| i.get("call_id"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let name = item
                    .and_then(|i| i.get("name"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                state.tool_call_ids.insert(index, id.clone());
                state.saw_tool_call = true;
                vec![StreamEvent::ToolCallStart { index, id, name }]
            } else {
                Vec::new()
            }
        }
        "response.output_text.delta" => {
            let index = value
                .get("content_index")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as usize;
            let delta = value.get("delta").and_then(|v| v.as_str()).unwrap_or_default();
            let mut out = Vec::new();
            if state.text_started.insert(index) {
                out.push(StreamEvent::TextStart { index });
            }
            if !delta.is_empty() {
                out.push(StreamEvent::TextDelta {
                    index,
                    text: delta.to_string(),
                });
            }
            out
        }
        "response.output_text.done" => {
            let index = value
                .get("content_index")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as usize;
            if state.text_started.remove(&index) {
                vec![StreamEvent::TextEnd { index }]
            } else {
                Vec::new()
            }
        }
        "response.function_call_arguments.delta" => {
            let index = value.get("output_index").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
            let id = state.tool_call_ids.get(&index).cloned().unwrap_or_default();
            let arguments_delta = value
                .get("delta")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            vec![StreamEvent::ToolCallDelta {
                index,
                id,
                arguments_delta,
            }]
        }
        "response.function_call_arguments.done" => {
            let index = value.get("output_index").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
            match state.tool_call_ids.remove(&index) {
                Some(id) => vec![StreamEvent::ToolCallEnd { index, id }],
                None => Vec::new(),
            }
        }
        "response.completed" | "response.incomplete" | "response.failed" => {
            let response = value.get("response");
            let usage = response
                .and_then(|r| r.get("usage"))
                .and_then(|u| serde_json::from_value::<OpenAiResponsesUsage>(u.clone()).ok())
                .map(|u| convert_usage(&u));
            let finish_reason = infer_finish_reason(event_type, response, state.saw_tool_call);
            vec![StreamEvent::Finish { finish_reason, usage }]
        }
        "error" => {
            let message = value
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown OpenAI Responses stream error")
                .to_string();
            vec![StreamEvent::Error { message }]
        }
        // response.created / response.in_progress / reasoning summary events /
        // output_item.done for message items carry no unified representation.
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

fn infer_finish_reason(
    event_type: &str,
    response: Option<&Value>,
    saw_tool_call: bool,
) -> crate::types::FinishReason {
    use crate::types::FinishReason;

    if saw_tool_call {
        return FinishReason::new(FinishReasonKind::ToolCalls, "tool_calls");
    }
    match event_type {
        "response.completed" => FinishReason::new(FinishReasonKind::Stop, "completed"),
        "response.incomplete" => {
            let reason = response
                .and_then(|r| r.get("incomplete_details"))
                .and_then(|d| d.get("reason"))
                .and_then(|v| v.as_str())
                .unwrap_or("incomplete");
            let unified = match reason {
                "max_output_tokens" => FinishReasonKind::Length,
                "content_filter" => FinishReasonKind::ContentFilter,
                other => FinishReasonKind::Other(other.to_string()),
            };
            FinishReason::new(unified, reason)
        }
        _ => FinishReason::new(FinishReasonKind::Error, "failed"),
    }
}
