use std::env;
use std::sync::Arc;

use dotenvy::dotenv;
use futures_util::StreamExt;
use serde_json::json;
use unillm::http::reqwest::ReqwestTransport;
use unillm::provider::anthropic_messages::AnthropicMessagesProvider;
use unillm::types::{
    ChatOptions, ChatRequest, ContentPart, FinishReasonKind, Message, Role, TextContent,
    ToolChoice, ToolDefinition, ToolKind,
};
use unillm::LLMProvider;

#[tokio::test]
#[ignore = "requires a live Anthropic Messages endpoint"]
async fn anthropic_messages_basic_text_dialog_live() {
    dotenv().ok();
    let Some((provider, model)) = build_provider_from_env() else {
        return;
    };

    let options = ChatOptions {
        model: Some(model.clone()),
        // Anthropic Messages rejects requests that omit max_tokens.
        max_output_tokens: Some(256),
        ..ChatOptions::default()
    };

    let request = ChatRequest {
        messages: vec![
            Message {
                role: Role::system(),
                name: None,
                content: vec![ContentPart::Text(TextContent {
                    text: "You are a concise, helpful assistant.".to_string(),
                })],
                tool_call_id: None,
                metadata: None,
            },
            Message::user_text("Introduce yourself in one sentence."),
        ],
        options,
        ..ChatRequest::default()
    };

    let response = provider
        .chat(request)
        .await
        .expect("basic text dialog request should succeed");
    let text = response.message.text().expect("assistant should return text");
    assert!(!text.trim().is_empty(), "response text should not be empty");
    assert!(
        matches!(
            response.finish_reason.map(|reason| reason.unified),
            Some(FinishReasonKind::Stop)
        ),
        "a plain text answer should finish with Stop"
    );
}

#[tokio::test]
#[ignore = "requires a live Anthropic Messages endpoint"]
async fn anthropic_messages_basic_tool_call_dialog_live() {
    dotenv().ok();
    let Some((provider, model)) = build_provider_from_env() else {
        return;
    };

    let options = ChatOptions {
        model: Some(model.clone()),
        max_output_tokens: Some(256),
        ..ChatOptions::default()
    };

    let request = ChatRequest {
        messages: vec![Message::user_text(
            "What's the weather in Paris? Call get_weather with location=\"Paris\".",
        )],
        options,
        tools: vec![ToolDefinition {
            name: "get_weather".to_string(),
            description: Some("Gets the current weather for a location".to_string()),
            input_schema: Some(json!({
                "type": "object",
                "properties": {
                    "location": {
                        "type": "string",
                        "description": "City name, e.g. Paris"
                    }
                },
                "required": ["location"]
            })),
            kind: ToolKind::Function,
            metadata: None,
        }],
        tool_choice: Some(ToolChoice::Tool {
            name: "get_weather".to_string(),
        }),
        ..ChatRequest::default()
    };

    let response = provider
        .chat(request)
        .await
        .expect("tool call request should succeed");
    let tool_call = response
        .message
        .tool_calls()
        .into_iter()
        .next()
        .expect("response should contain a tool_use content block");
    assert_eq!(tool_call.name, "get_weather");
    let location = tool_call
        .arguments
        .get("location")
        .and_then(|value| value.as_str())
        .unwrap_or_default();
    assert!(
        location.contains("Paris"),
        "tool argument location should mention Paris, got: {location}"
    );
    assert!(
        matches!(
            response.finish_reason.map(|reason| reason.unified),
            Some(FinishReasonKind::ToolCalls)
        ),
        "a tool-use turn should map stop_reason to ToolCalls"
    );
}

#[tokio::test]
#[ignore = "requires a live Anthropic Messages endpoint"]
async fn anthropic_messages_live_sync_and_stream() {
    dotenv().ok();
    let Some((provider, model)) = build_provider_from_env() else {
        return;
    };

    let request = build_stream_request(&model);

    let response = provider
        .chat(request.clone())
        .await
        .expect("synchronous chat call should succeed");
    assert!(
        response.message.text().is_some(),
        "chat response should contain text content"
    );

    let mut stream = provider
        .stream_chat(request)
        .await
        .expect("streaming chat should start");
    let mut saw_event = false;
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                eprintln!("skip anthropic_messages_live_sync_and_stream (chunk error): {err}");
                return;
            }
        };
        if !chunk.events.is_empty() {
            saw_event = true;
        }
    }
    assert!(saw_event, "stream should yield at least one event");
}

fn build_stream_request(model: &str) -> ChatRequest {
    let options = ChatOptions {
        model: Some(model.to_string()),
        max_output_tokens: Some(128),
        ..ChatOptions::default()
    };

    ChatRequest {
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
            Message::user_text("Please introduce Rust in one sentence."),
        ],
        options,
        ..ChatRequest::default()
    }
}

fn build_provider_from_env() -> Option<(AnthropicMessagesProvider, String)> {
    let Some(api_key) = load_env_var("ANTHROPIC_CHAT_KEY") else {
        eprintln!("skip anthropic tests: ANTHROPIC_CHAT_KEY missing");
        return None;
    };
    let Some(model) = load_env_var("ANTHROPIC_CHAT_MODEL") else {
        eprintln!("skip anthropic tests: ANTHROPIC_CHAT_MODEL missing");
        return None;
    };

    let transport = Arc::new(ReqwestTransport::default());
    let mut provider = AnthropicMessagesProvider::new(transport, api_key).with_default_model(model.clone());
    if let Some(endpoint) = load_env_var("ANTHROPIC_CHAT_ENDPOINT") {
        provider = provider.with_base_url(endpoint);
    }
    Some((provider, model))
}

fn load_env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
