use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::LLMError;

/// Parses error responses returned by the Anthropic Messages API.
///
/// Anthropic's `error.type` is a more reliable discriminator than the bare
/// status code for `permission_error`/`not_found_error`, so it is consulted
/// before falling back to [`LLMError::from_status`].
pub(crate) fn parse_anthropic_error(
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> LLMError {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<InnerError>,
    }

    #[derive(Deserialize)]
    struct InnerError {
        message: Option<String>,
        r#type: Option<String>,
        code: Option<Value>,
    }

    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(error) = parsed.error {
            let mut message = error.message.unwrap_or_else(|| "unknown error".to_string());
            if let Some(code) = &error.code {
                message = format!("{message} ({code})");
            }

            return match error.r#type.as_deref() {
                Some("permission_error") => LLMError::AccessDenied { message },
                Some("not_found_error") => LLMError::NotFound { message },
                Some("invalid_request_error") if message.to_ascii_lowercase().contains("context") => {
                    LLMError::ContextLength {
                        message,
                        estimated: None,
                        limit: None,
                    }
                }
                Some("overloaded_error") => LLMError::Server { message },
                _ => LLMError::from_status(status, message, retry_after),
            };
        }
    }

    LLMError::Provider {
        provider: "anthropic_messages",
        message: format!("status {status}: {body}"),
    }
}
