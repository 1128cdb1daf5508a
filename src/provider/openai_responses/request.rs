use serde_json::{Map, Value, json};

use crate::error::LLMError;
use crate::types::{
    AudioContent, ChatRequest, ContentPart, FileContent, ImageContent, ImageDetail, ImageSource,
    MediaSource, Message, ReasoningEffort, ResponseFormat, TextContent, ToolChoice, ToolDefinition,
    ToolKind, VideoContent,
};

/// Builds the request body expected by the OpenAI Responses API.
pub(crate) fn build_openai_responses_body(
    request: &ChatRequest,
    model: &str,
    stream: bool,
) -> Result<Value, LLMError> {
    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(model.to_string()));

    // Fold system/developer messages into `instructions` and translate the
    // rest into `input` items. Assistant messages with tool calls and tool
    // messages both expand into more than one input item, so this collects
    // a flat list rather than one item per source message.
    let mut instructions_parts = Vec::new();
    let mut input_items = Vec::new();
    for message in &request.messages {
        match message.role.0.as_str() {
            "system" | "developer" => {
                if let Some(text) = extract_text_from_message(message) {
                    instructions_parts.push(text);
                }
            }
            "assistant" => input_items.extend(convert_assistant_message(message)?),
            "tool" => input_items.extend(convert_tool_message(message)?),
            _ => input_items.push(convert_plain_input_message(message)?),
        }
    }

    if !input_items.is_empty() {
        body.insert("input".to_string(), Value::Array(input_items));
    }

    if !instructions_parts.is_empty() {
        let instructions = instructions_parts.join("\n");
        body.insert("instructions".to_string(), Value::String(instructions));
    }

    // Sampling and control parameters.
    if let Some(temperature) = request.options.temperature {
        body.insert("temperature".to_string(), Value::from(temperature));
    }
    if let Some(top_p) = request.options.top_p {
        body.insert("top_p".to_string(), Value::from(top_p));
    }
    if let Some(max_tokens) = request.options.max_output_tokens {
        body.insert("max_output_tokens".to_string(), Value::from(max_tokens));
    }
    if let Some(parallel) = request.options.parallel_tool_calls {
        body.insert("parallel_tool_calls".to_string(), Value::from(parallel));
    }

    // Map reasoning options; Responses documents `effort` under a `reasoning` object.
    if let Some(effort) = &request.options.reasoning_effort {
        if !matches!(effort, ReasoningEffort::None) {
            let mut reasoning_obj = Map::new();
            reasoning_obj.insert(
                "effort".to_string(),
                Value::String(format_reasoning_effort(effort).to_string()),
            );
            body.insert("reasoning".to_string(), Value::Object(reasoning_obj));
        }
    }

    // tools & tool_choice
    if !request.tools.is_empty() {
        body.insert(
            "tools".to_string(),
            Value::Array(convert_tools(&request.tools)?),
        );
    }
    if let Some(choice) = &request.tool_choice {
        if let Some(value) = convert_tool_choice(choice)? {
            body.insert("tool_choice".to_string(), value);
        }
    }

    // Response format maps to `text.format`.
    if let Some(format) = &request.response_format {
        // If callers already set `text` via `extra`, honor that configuration first.
        if !body.contains_key("text") {
            body.insert("text".to_string(), convert_text_config(format));
        }
    }

    // Metadata is mapped directly.
    if let Some(metadata) = &request.metadata {
        let meta: Map<String, Value> = metadata.clone().into_iter().collect();
        body.insert("metadata".to_string(), Value::Object(meta));
    }

    // Extra provider settings (include, service_tier, user, previous_response_id, etc.).
    for (k, v) in &request.options.extra {
        body.insert(k.clone(), v.clone());
    }

    body.insert("stream".to_string(), Value::Bool(stream));

    Ok(Value::Object(body))
}

fn extract_text_from_message(message: &Message) -> Option<String> {
    let mut buffer = String::new();
    for part in &message.content {
        if let ContentPart::Text(TextContent { text }) = part {
            if !buffer.is_empty() {
                buffer.push('\n');
            }
            buffer.push_str(text);
        }
    }
    if buffer.is_empty() {
        None
    } else {
        Some(buffer)
    }
}

fn convert_plain_input_message(message: &Message) -> Result<Value, LLMError> {
    let mut obj = Map::new();
    obj.insert("type".to_string(), Value::String("message".to_string()));
    obj.insert("role".to_string(), Value::String(message.role.0.clone()));

    let mut content_items = Vec::new();
    for part in &message.content {
        match part {
            ContentPart::ToolCall(_) | ContentPart::ToolResult(_) => {
                return Err(LLMError::InvalidRequest {
                    message: "tool contents are only allowed in assistant or tool role messages"
                        .to_string(),
                });
            }
            _ => content_items.push(convert_content_part(part)?),
        }
    }

    // Responses accepts strings or arrays for content; always use arrays to support multimodal input.
    obj.insert("content".to_string(), Value::Array(content_items));

    Ok(Value::Object(obj))
}

/// Splits an assistant message into a `message` item carrying its non-tool
/// content (if any) followed by one `function_call` item per tool call, in
/// original order. Reasoning content has no input-side representation in the
/// Responses API and is dropped when replaying history back to the model.
fn convert_assistant_message(message: &Message) -> Result<Vec<Value>, LLMError> {
    let mut items = Vec::new();
    let mut content_items = Vec::new();

    for part in &message.content {
        match part {
            ContentPart::ToolCall(call) => {
                let call_id = call.id.clone().ok_or_else(|| LLMError::InvalidToolCall {
                    message: "assistant tool call is missing an id".to_string(),
                })?;
                if !content_items.is_empty() {
                    items.push(json!({
                        "type": "message",
                        "role": "assistant",
                        "content": std::mem::take(&mut content_items),
                    }));
                }
                items.push(json!({
                    "type": "function_call",
                    "call_id": call_id,
                    "name": call.name,
                    "arguments": serde_json::to_string(&call.arguments)
                        .unwrap_or_else(|_| "{}".to_string()),
                }));
            }
            ContentPart::Thinking(_) | ContentPart::RedactedThinking(_) => {}
            other => content_items.push(convert_content_part(other)?),
        }
    }

    if !content_items.is_empty() {
        items.push(json!({
            "type": "message",
            "role": "assistant",
            "content": content_items,
        }));
    }

    Ok(items)
}

/// Converts a `tool` role message's `tool_result` content parts into
/// `function_call_output` items, one per part.
fn convert_tool_message(message: &Message) -> Result<Vec<Value>, LLMError> {
    let mut items = Vec::new();
    for part in &message.content {
        if let ContentPart::ToolResult(result) = part {
            let call_id = result
                .call_id
                .clone()
                .or_else(|| message.tool_call_id.clone())
                .ok_or_else(|| LLMError::InvalidRequest {
                    message: "tool result is missing a call_id".to_string(),
                })?;
            items.push(json!({
                "type": "function_call_output",
                "call_id": call_id,
                "output": result.content,
            }));
        }
    }
    if items.is_empty() {
        return Err(LLMError::InvalidRequest {
            message: "tool message must contain at least one tool_result content part"
                .to_string(),
        });
    }
    Ok(items)
}

fn convert_content_part(part: &ContentPart) -> Result<Value, LLMError> {
    match part {
        ContentPart::Text(TextContent { text }) => {
            Ok(json!({ "type": "input_text", "text": text }))
        }
        ContentPart::Image(ImageContent { source, detail, .. }) => {
            let detail = detail.as_ref().map(format_image_detail).unwrap_or("auto");
            match source {
                ImageSource::Url { url } => Ok(json!({
                    "type": "input_image",
                    "image_url": url,
                    "detail": detail
                })),
                ImageSource::Base64 { data, mime_type } => {
                    // Match the Chat API by constructing `data:` URLs for inline content.
                    let mime = mime_type.as_deref().unwrap_or("image/png");
                    Ok(json!({
                        "type": "input_image",
                        "image_url": format!("data:{mime};base64,{data}"),
                        "detail": detail
                    }))
                }
                ImageSource::FileId { file_id } => Ok(json!({
                    "type": "input_image",
                    "file_id": file_id,
                    "detail": detail
                })),
            }
        }
        ContentPart::Audio(AudioContent {
            source, mime_type, ..
        }) => Ok(json!({
            "type": "input_audio",
            "input_audio": {
                "data": match source {
                    MediaSource::Inline { data } => data.clone(),
                    MediaSource::FileId { file_id } => file_id.clone(),
                    MediaSource::Url { url } => url.clone(),
                },
                "format": mime_type.clone().unwrap_or_else(|| "wav".to_string())
            }
        })),
        ContentPart::Video(VideoContent {
            source, mime_type, ..
        }) => Ok(json!({
            "type": "input_video",
            "input_video": {
                "source": match source {
                    MediaSource::Inline { data } => json!({"data": data}),
                    MediaSource::FileId { file_id } => json!({"file_id": file_id}),
                    MediaSource::Url { url } => json!({"url": url}),
                },
                "format": mime_type
            }
        })),
        ContentPart::File(FileContent { file_id, .. }) => Ok(json!({
            "type": "input_file",
            "file_id": file_id
        })),
        ContentPart::Data { data } => Ok(data.clone()),
        ContentPart::ToolCall(_) | ContentPart::ToolResult(_) => Err(LLMError::InvalidRequest {
            message: "tool content must use dedicated input items, not inline content parts"
                .to_string(),
        }),
    }
}

fn convert_tools(tools: &[ToolDefinition]) -> Result<Vec<Value>, LLMError> {
    tools
        .iter()
        .map(|tool| match &tool.kind {
            ToolKind::Function => {
                let mut obj = Map::new();
                obj.insert("type".to_string(), Value::String("function".to_string()));
                obj.insert("name".to_string(), Value::String(tool.name.clone()));
                if let Some(description) = &tool.description {
                    obj.insert(
                        "description".to_string(),
                        Value::String(description.clone()),
                    );
                }
                if let Some(schema) = &tool.input_schema {
                    obj.insert("parameters".to_string(), schema.clone());
                }
                // Responses sets function tools to strict=true by default; metadata can override when necessary.
                obj.insert("strict".to_string(), Value::Bool(true));
                if let Some(meta) = &tool.metadata {
                    for (k, v) in meta {
                        if k == "type" || k == "name" || k == "parameters" {
                            continue;
                        }
                        obj.insert(k.clone(), v.clone());
                    }
                }
                Ok(Value::Object(obj))
            }
            ToolKind::FileSearch | ToolKind::WebSearch | ToolKind::ComputerUse => {
                let mut obj: Map<String, Value> = tool
                    .metadata
                    .clone()
                    .unwrap_or_default()
                    .into_iter()
                    .collect();
                let default_type = match tool.kind {
                    ToolKind::FileSearch => "file_search",
                    ToolKind::WebSearch => "web_search_preview",
                    ToolKind::ComputerUse => "computer_use_preview",
                    ToolKind::Function | ToolKind::Custom { .. } => unreachable!(),
                };
                obj.entry("type".to_string())
                    .or_insert_with(|| Value::String(default_type.to_string()));
                Ok(Value::Object(obj))
            }
            ToolKind::Custom { name, config } => {
                if let Some(config) = config {
                    Ok(config.clone())
                } else {
                    Ok(json!({ "type": name, "name": tool.name }))
                }
            }
        })
        .collect()
}

fn convert_tool_choice(choice: &ToolChoice) -> Result<Option<Value>, LLMError> {
    match choice {
        ToolChoice::Auto => Ok(Some(Value::String("auto".to_string()))),
        ToolChoice::Required => Ok(Some(Value::String("required".to_string()))),
        ToolChoice::None => Ok(Some(Value::String("none".to_string()))),
        ToolChoice::Tool { name } => Ok(Some(json!({
            "type": "function",
            "name": name
        }))),
        ToolChoice::Custom(value) => Ok(Some(value.clone())),
    }
}

fn convert_text_config(format: &ResponseFormat) -> Value {
    match format {
        ResponseFormat::Text => json!({
            "format": { "type": "text" }
        }),
        ResponseFormat::JsonObject => json!({
            "format": { "type": "json_object" }
        }),
        ResponseFormat::JsonSchema { schema, strict } => json!({
            "format": {
                "type": "json_schema",
                // Use a fixed name for simplicity; callers can fully customize via the Custom variant.
                "name": "response",
                "schema": schema,
                "strict": strict
            }
        }),
        // Treat Custom as the full `text` object so callers can set `format` or extra fields.
        ResponseFormat::Custom(value) => value.clone(),
    }
}

fn format_reasoning_effort(effort: &ReasoningEffort) -> &'static str {
    match effort {
        ReasoningEffort::None => "none",
        ReasoningEffort::Low => "low",
        ReasoningEffort::Medium => "medium",
        ReasoningEffort::High => "high",
    }
}

fn format_image_detail(detail: &ImageDetail) -> &'static str {
    match detail {
        ImageDetail::Low => "low",
        ImageDetail::High => "high",
        ImageDetail::Auto => "auto",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ChatOptions, ChatRequest, ContentPart, ImageContent, ImageDetail, ImageSource, Message,
        Role, ToolCall, ToolCallKind, ToolResult,
    };

    /// Builds the minimal payload containing a single user text message.
    #[test]
    fn build_body_with_basic_text_input() {
        let request = ChatRequest {
            messages: vec![Message {
                role: Role::user(),
                name: Some("user-1".to_string()),
                content: vec![ContentPart::Text(TextContent {
                    text: "hello".to_string(),
                })],
                tool_call_id: None,
                metadata: None,
            }],
            options: ChatOptions::default(),
            ..ChatRequest::default()
        };

        let body =
            build_openai_responses_body(&request, "gpt-4.1", false).expect("body should be built");

        assert_eq!(body["model"], json!("gpt-4.1"));
        assert_eq!(body["stream"], json!(false));

        let input = body["input"].as_array().expect("input should be array");
        assert_eq!(input.len(), 1);
        let msg = &input[0];
        assert_eq!(msg["type"], json!("message"));
        assert_eq!(msg["role"], json!("user"));
        let content = msg["content"].as_array().expect("content should be array");
        assert_eq!(content.len(), 1);
        assert_eq!(content[0], json!({ "type": "input_text", "text": "hello" }));
    }

    /// system / developer are folded into `instructions`, the rest go into `input`
    #[test]
    fn build_body_with_instructions_and_input_messages() {
        let mut options = ChatOptions {
            model: Some("gpt-4.1".to_string()),
            temperature: Some(0.3),
            top_p: Some(0.9),
            max_output_tokens: Some(256),
            parallel_tool_calls: Some(true),
            reasoning_effort: Some(ReasoningEffort::High),
            ..ChatOptions::default()
        };
        options
            .extra
            .insert("service_tier".to_string(), json!("default"));

        let request = ChatRequest {
            messages: vec![
                Message {
                    role: Role::system(),
                    name: None,
                    content: vec![ContentPart::Text(TextContent {
                        text: "You are a helpful assistant.".to_string(),
                    })],
                    tool_call_id: None,
                    metadata: None,
                },
                Message {
                    role: Role("developer".to_string()),
                    name: None,
                    content: vec![ContentPart::Text(TextContent {
                        text: "Please answer in English.".to_string(),
                    })],
                    tool_call_id: None,
                    metadata: None,
                },
                Message {
                    role: Role::user(),
                    name: None,
                    content: vec![ContentPart::Text(TextContent {
                        text: "Hello!".to_string(),
                    })],
                    tool_call_id: None,
                    metadata: None,
                },
            ],
            options,
            response_format: Some(ResponseFormat::Text),
            ..ChatRequest::default()
        };

        let body =
            build_openai_responses_body(&request, "gpt-4.1", true).expect("body should be built");

        assert_eq!(body["model"], json!("gpt-4.1"));
        // Compare floating-point values approximately.
        let temperature = body["temperature"].as_f64().unwrap();
        assert!((temperature - 0.3).abs() < 1e-6);
        let top_p = body["top_p"].as_f64().unwrap();
        assert!((top_p - 0.9).abs() < 1e-6);
        assert_eq!(body["max_output_tokens"], json!(256));
        assert_eq!(body["parallel_tool_calls"], json!(true));
        assert_eq!(body["service_tier"], json!("default"));

        // reasoning
        let reasoning = body["reasoning"]
            .as_object()
            .expect("reasoning should be object");
        assert_eq!(reasoning["effort"], json!("high"));

        // `instructions` contains the folded system and developer text, newline-joined.
        let instructions = body["instructions"]
            .as_str()
            .expect("instructions should be string");
        assert_eq!(
            instructions,
            "You are a helpful assistant.\nPlease answer in English."
        );

        // `input` contains user messages only.
        let input = body["input"].as_array().expect("input should be array");
        assert_eq!(input.len(), 1);
        assert_eq!(input[0]["role"], json!("user"));

        // text.format
        let text_cfg = body["text"].as_object().expect("text should be object");
        assert_eq!(text_cfg["format"]["type"], json!("text"));
    }

    /// Verifies that image input is mapped to `input_image` entries.
    #[test]
    fn convert_image_content_to_input_image() {
        let request = ChatRequest {
            messages: vec![Message {
                role: Role::user(),
                name: None,
                content: vec![ContentPart::Image(ImageContent {
                    source: ImageSource::Url {
                        url: "https://example.com/image.png".to_string(),
                    },
                    detail: Some(ImageDetail::High),
                    metadata: None,
                })],
                tool_call_id: None,
                metadata: None,
            }],
            options: ChatOptions::default(),
            ..ChatRequest::default()
        };

        let body =
            build_openai_responses_body(&request, "gpt-4.1", false).expect("body should be built");
        let input = body["input"].as_array().expect("input should be array");
        let msg = &input[0];
        let content = msg["content"].as_array().expect("content should be array");
        assert_eq!(content.len(), 1);
        assert_eq!(
            content[0],
            json!({
                "type": "input_image",
                "image_url": "https://example.com/image.png",
                "detail": "high"
            })
        );
    }

    /// An assistant message mixing text with a tool call splits into a
    /// `message` item followed by a `function_call` item.
    #[test]
    fn assistant_message_with_text_and_tool_call_splits_into_two_items() {
        let message = Message {
            role: Role::assistant(),
            name: None,
            content: vec![
                ContentPart::Text(TextContent {
                    text: "let me check".to_string(),
                }),
                ContentPart::ToolCall(ToolCall {
                    id: Some("call_1".to_string()),
                    name: "get_weather".to_string(),
                    arguments: json!({"city": "nyc"}),
                    kind: ToolCallKind::Function,
                }),
            ],
            tool_call_id: None,
            metadata: None,
        };

        let items = convert_assistant_message(&message).expect("should split");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["type"], json!("message"));
        assert_eq!(items[1]["type"], json!("function_call"));
        assert_eq!(items[1]["call_id"], json!("call_1"));
        assert_eq!(items[1]["name"], json!("get_weather"));
        let arguments: Value = serde_json::from_str(items[1]["arguments"].as_str().unwrap())
            .expect("arguments should be a JSON string");
        assert_eq!(arguments["city"], json!("nyc"));
    }

    /// A tool-role message becomes a `function_call_output` item referencing
    /// the originating call id.
    #[test]
    fn tool_message_becomes_function_call_output() {
        let message = Message {
            role: Role::tool(),
            name: None,
            content: vec![ContentPart::ToolResult(ToolResult {
                call_id: Some("call_1".to_string()),
                content: "sunny".to_string(),
                is_error: false,
                image: None,
                metadata: None,
            })],
            tool_call_id: Some("call_1".to_string()),
            metadata: None,
        };

        let items = convert_tool_message(&message).expect("should convert");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["type"], json!("function_call_output"));
        assert_eq!(items[0]["call_id"], json!("call_1"));
        assert_eq!(items[0]["output"], json!("sunny"));
    }

    #[test]
    fn required_tool_choice_maps_to_required_string() {
        let value = convert_tool_choice(&ToolChoice::Required)
            .unwrap()
            .unwrap();
        assert_eq!(value, json!("required"));
    }
}
