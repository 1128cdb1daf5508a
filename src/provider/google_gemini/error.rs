use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::LLMError;

/// Parses error responses returned by Google's GenerateContent API.
///
/// Gemini's `error.status` is a Google RPC status string (e.g. `PERMISSION_DENIED`,
/// `RESOURCE_EXHAUSTED`) and is a more reliable discriminator than the bare HTTP
/// status code, so it is consulted before falling back to [`LLMError::from_status`].
pub(crate) fn parse_gemini_error(
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
        status: Option<String>,
        #[allow(dead_code)]
        details: Option<Value>,
    }

    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(error) = parsed.error {
            let mut message = error.message.unwrap_or_else(|| "unknown error".to_string());
            if let Some(status_text) = &error.status {
                if !status_text.is_empty() {
                    message = format!("{message} ({status_text})");
                }
            }

            return match error.status.as_deref() {
                Some("UNAUTHENTICATED") => LLMError::Authentication { message },
                Some("PERMISSION_DENIED") => LLMError::AccessDenied { message },
                Some("NOT_FOUND") => LLMError::NotFound { message },
                Some("RESOURCE_EXHAUSTED") => LLMError::RateLimit {
                    message,
                    retry_after,
                },
                Some("INVALID_ARGUMENT") | Some("FAILED_PRECONDITION") => {
                    LLMError::InvalidRequest { message }
                }
                Some("UNAVAILABLE") | Some("INTERNAL") | Some("DEADLINE_EXCEEDED") => {
                    LLMError::Server { message }
                }
                _ => LLMError::from_status(status, message, retry_after),
            };
        }
    }

    LLMError::Provider {
        provider: "google_gemini",
        message: format!("status {status}: {body}"),
    }
}
