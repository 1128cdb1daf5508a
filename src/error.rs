use std::time::Duration;

use thiserror::Error;

/// Aggregates every failure mode exposed by the unified LLM client.
///
/// Each variant carries a fixed retryability classification accessible via
/// [`LLMError::is_retryable`], so callers (and the retry engine) never have to
/// guess from the message text.
#[derive(Debug, Error)]
pub enum LLMError {
    /// Invalid or missing credentials.
    #[error("authentication failed: {message}")]
    Authentication { message: String },
    /// Credentials were valid but lack permission for the requested operation.
    #[error("access denied: {message}")]
    AccessDenied { message: String },
    /// The requested model, deployment, or resource does not exist.
    #[error("not found: {message}")]
    NotFound { message: String },
    /// The request payload failed validation before or after reaching the provider.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
    /// The prompt or expected completion exceeds the allowed context window.
    #[error("context length exceeded: {message}")]
    ContextLength {
        message: String,
        estimated: Option<usize>,
        limit: Option<usize>,
    },
    /// The provider's content filter rejected the request or response.
    #[error("content filtered: {message}")]
    ContentFilter { message: String },
    /// The account's quota or billing limit has been exhausted.
    #[error("quota exceeded: {message}")]
    QuotaExceeded { message: String },
    /// The provider throttled the request.
    #[error("rate limited: {message}")]
    RateLimit {
        message: String,
        retry_after: Option<Duration>,
    },
    /// The provider reported an internal server error.
    #[error("server error: {message}")]
    Server { message: String },
    /// The request timed out waiting for a response.
    #[error("request timed out: {message}")]
    RequestTimeout { message: String },
    /// The caller explicitly cancelled the request.
    #[error("request aborted: {message}")]
    Abort { message: String },
    /// Transport-layer or DNS/connection failures.
    #[error("network error: {message}")]
    Network { message: String },
    /// The SSE/streaming channel closed unexpectedly or emitted malformed events.
    #[error("stream error: {message}")]
    Stream { message: String },
    /// A tool call could not be parsed, matched, or executed as requested.
    #[error("invalid tool call: {message}")]
    InvalidToolCall { message: String },
    /// Structured-output generation produced text that failed to parse as the
    /// requested schema.
    #[error("no object could be generated: {message}")]
    NoObjectGenerated { message: String },
    /// Library configuration (missing credentials, unknown provider handle, etc.)
    /// is invalid.
    #[error("invalid configuration for {field}: {reason}")]
    Configuration { field: String, reason: String },
    /// Catch-all for provider-defined errors that do not map to any other kind.
    #[error("provider {provider} error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },
}

impl LLMError {
    /// Returns whether the retry engine should consider this error transient.
    ///
    /// # Examples
    ///
    /// ```
    /// use unillm::error::LLMError;
    ///
    /// let err = LLMError::Server { message: "boom".into() };
    /// assert!(err.is_retryable());
    ///
    /// let err = LLMError::Authentication { message: "bad key".into() };
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LLMError::RateLimit { .. }
                | LLMError::Server { .. }
                | LLMError::RequestTimeout { .. }
                | LLMError::Network { .. }
                | LLMError::Provider { .. }
        )
    }

    /// Suggested wait duration before retrying, when the provider communicated one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LLMError::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Creates an [`LLMError::Network`] from a textual description.
    ///
    /// # Examples
    ///
    /// ```
    /// use unillm::error::LLMError;
    ///
    /// let err = LLMError::network("dns lookup failed");
    /// assert!(matches!(err, LLMError::Network { .. }));
    /// ```
    pub fn network<T: Into<String>>(message: T) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates an [`LLMError::Provider`] with the given provider name and message.
    ///
    /// # Examples
    ///
    /// ```
    /// use unillm::error::LLMError;
    ///
    /// let err = LLMError::provider("openai_responses", "bad JSON payload");
    /// assert!(matches!(err, LLMError::Provider { provider: "openai_responses", .. }));
    /// ```
    pub fn provider<T: Into<String>>(provider: &'static str, message: T) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
        }
    }

    /// Maps an HTTP status code to the appropriate error kind.
    ///
    /// `retry_after` should be parsed from the response's `Retry-After` header
    /// when present; it is only consulted for 429 responses.
    pub fn from_status(status: u16, message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        let message = message.into();
        match status {
            400 | 422 => LLMError::InvalidRequest { message },
            401 => LLMError::Authentication { message },
            403 => LLMError::AccessDenied { message },
            404 => LLMError::NotFound { message },
            408 => LLMError::RequestTimeout { message },
            413 => LLMError::ContextLength {
                message,
                estimated: None,
                limit: None,
            },
            429 => LLMError::RateLimit {
                message,
                retry_after,
            },
            500..=599 => LLMError::Server { message },
            _ => LLMError::Provider {
                provider: "unknown",
                message,
            },
        }
    }
}

/// Returns `true` when an error code or message suggests a context/window overflow.
pub(crate) fn looks_like_token_limit_error(code_hint: Option<&str>, message: &str) -> bool {
    if let Some(code) = code_hint {
        let lower = code.to_ascii_lowercase();
        if matches!(
            lower.as_str(),
            "context_length_exceeded"
                | "max_context_length_exceeded"
                | "prompt_tokens_exceeded"
                | "context_window_exceeded"
        ) || lower.contains("token")
        {
            return true;
        }
    }

    let lower_message = message.to_ascii_lowercase();
    const HINTS: [&str; 6] = [
        "context length",
        "context window",
        "token limit",
        "maximum output tokens",
        "max output tokens",
        "prompt is too long",
    ];
    HINTS.iter().any(|needle| lower_message.contains(needle))
}

/// Attempts to extract a model identifier from an error payload.
pub(crate) fn extract_model_identifier(message: &str) -> Option<String> {
    for delimiter in ['`', '"', '\''] {
        if let Some(value) = between_delimiters(message, delimiter) {
            if !value.trim().is_empty() {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

fn between_delimiters(message: &str, delimiter: char) -> Option<String> {
    let mut chars = message.char_indices();
    while let Some((start, ch)) = chars.next() {
        if ch == delimiter {
            let start_idx = start + ch.len_utf8();
            if start_idx >= message.len() {
                return None;
            }
            if let Some(rel_end) = message[start_idx..].find(delimiter) {
                let end_idx = start_idx + rel_end;
                return Some(message[start_idx..end_idx].to_string());
            }
        }
    }
    None
}
