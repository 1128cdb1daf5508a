//! Utilities shared by every provider adapter: system-message folding,
//! consecutive-message merging, rate-limit header parsing, synthetic
//! tool-call id minting for vendors (Gemini) that do not return their own,
//! and the connect/request/stream-idle timeout bundle.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use futures_core::Stream;
use futures_util::{StreamExt, stream};

use crate::error::LLMError;
use crate::types::{ContentPart, Message, RateLimitInfo, Role, TextContent};

/// The three durations every adapter's HTTP call primitive respects: time to
/// establish the connection, time for the whole request (applied at the
/// transport as [`crate::http::HttpRequest::timeout`]), and the maximum gap
/// between consecutive stream events before a streaming read is abandoned.
///
/// `connect` only has an effect when the transport is built with it (see
/// [`crate::http::reqwest::ReqwestTransport::with_connect_timeout`]); a
/// shared transport injected after construction cannot be retrofitted with
/// one.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutConfig {
    pub connect: Duration,
    pub request: Duration,
    pub stream_idle: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            request: Duration::from_secs(120),
            stream_idle: Duration::from_secs(60),
        }
    }
}

/// Wraps a body stream with an inter-item idle timeout: if no item arrives
/// within `idle`, the wrapped stream yields one [`LLMError::RequestTimeout`]
/// and then ends. Used to guard the stream-read leg of the timeout bundle,
/// since a dead connection that never closes would otherwise hang the
/// consumer forever between SSE events.
pub fn with_idle_timeout<S, T>(
    inner: S,
    idle: Duration,
    provider: &'static str,
) -> impl Stream<Item = Result<T, LLMError>>
where
    S: Stream<Item = Result<T, LLMError>> + Unpin + Send + 'static,
    T: Send + 'static,
{
    stream::unfold((inner, false), move |(mut inner, exhausted)| async move {
        if exhausted {
            return None;
        }
        match tokio::time::timeout(idle, inner.next()).await {
            Ok(Some(item)) => Some((item, (inner, false))),
            Ok(None) => None,
            Err(_) => Some((
                Err(LLMError::RequestTimeout {
                    message: format!("{provider}: no stream event within {idle:?}"),
                }),
                (inner, true),
            )),
        }
    })
}

/// Splits `system`/`developer` messages out of the message list, folding their
/// text together (newline-joined, in original order) and returning the
/// remaining conversational messages untouched.
///
/// Providers without a dedicated system-role slot (none of the three
/// supported vendors, as it happens, but adapters that need only the folded
/// text call this directly) get a single string; providers with a slot
/// (Anthropic's `system`, OpenAI's `instructions`) use it verbatim.
pub fn extract_system(messages: &[Message]) -> (Option<String>, Vec<Message>) {
    let mut system_text = String::new();
    let mut rest = Vec::with_capacity(messages.len());

    for message in messages {
        if message.role.is_system_like() {
            if let Some(text) = message.text() {
                if !system_text.is_empty() {
                    system_text.push('\n');
                }
                system_text.push_str(&text);
            }
        } else {
            rest.push(message.clone());
        }
    }

    let system = if system_text.is_empty() {
        None
    } else {
        Some(system_text)
    };
    (system, rest)
}

/// Merges consecutive messages sharing the same role into one, concatenating
/// their content parts in order. Required by vendors (Anthropic) that reject
/// back-to-back messages with identical roles.
pub fn merge_consecutive(messages: Vec<Message>) -> Vec<Message> {
    let mut merged: Vec<Message> = Vec::with_capacity(messages.len());
    for message in messages {
        match merged.last_mut() {
            Some(prev) if prev.role == message.role => {
                prev.content.extend(message.content);
                if prev.tool_call_id.is_none() {
                    prev.tool_call_id = message.tool_call_id;
                }
            }
            _ => merged.push(message),
        }
    }
    merged
}

/// Parses a `Retry-After` header value, which may be either an integer number
/// of seconds or an HTTP date. Only the integer form is handled; dates are
/// ignored since none of the supported vendors emit them.
pub fn retry_after_from_headers(headers: &HashMap<String, String>) -> Option<Duration> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("retry-after"))
        .and_then(|(_, v)| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Best-effort extraction of rate-limit accounting from common vendor header
/// names (`x-ratelimit-*`, used by OpenAI and Anthropic alike).
pub fn rate_limit_from_headers(headers: &HashMap<String, String>) -> Option<RateLimitInfo> {
    let get = |name: &str| -> Option<u64> {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.trim().parse::<u64>().ok())
    };

    let info = RateLimitInfo {
        requests_remaining: get("x-ratelimit-remaining-requests"),
        requests_limit: get("x-ratelimit-limit-requests"),
        tokens_remaining: get("x-ratelimit-remaining-tokens"),
        tokens_limit: get("x-ratelimit-limit-tokens"),
        reset_at: get("x-ratelimit-reset-requests"),
    };

    if info.requests_remaining.is_none()
        && info.requests_limit.is_none()
        && info.tokens_remaining.is_none()
        && info.tokens_limit.is_none()
    {
        None
    } else {
        Some(info)
    }
}

/// Mints synthetic tool-call identifiers and remembers which tool name each
/// one refers to, for vendors (Gemini) whose function-call parts carry a name
/// but no id of their own. The mapping is consulted when translating a
/// `tool_result` content part back into the vendor's response format, since
/// the vendor expects the function name there, not an id.
#[derive(Default)]
pub struct CallIdMinter {
    next: Mutex<u64>,
    names: Mutex<HashMap<String, String>>,
}

impl CallIdMinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a new id for a call to `name` and remembers the association.
    pub fn mint(&self, name: &str) -> String {
        let mut next = self.next.lock().expect("call id counter poisoned");
        *next += 1;
        let id = format!("call_{next}");
        self.names
            .lock()
            .expect("call id map poisoned")
            .insert(id.clone(), name.to_string());
        id
    }

    /// Looks up the tool name a previously minted id refers to.
    pub fn name_for(&self, id: &str) -> Option<String> {
        self.names.lock().expect("call id map poisoned").get(id).cloned()
    }
}

/// Convenience constructor for a plain text message, used by adapters that
/// build synthetic tool-result fallback messages.
pub fn text_message(role: Role, text: impl Into<String>) -> Message {
    Message {
        role,
        name: None,
        content: vec![ContentPart::Text(TextContent { text: text.into() })],
        tool_call_id: None,
        metadata: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContentPart;

    fn msg(role: Role, text: &str) -> Message {
        text_message(role, text)
    }

    #[test]
    fn extract_system_folds_system_and_developer_text() {
        let messages = vec![
            msg(Role::system(), "be terse"),
            msg(Role::developer(), "no markdown"),
            msg(Role::user(), "hi"),
        ];
        let (system, rest) = extract_system(&messages);
        assert_eq!(system.as_deref(), Some("be terse\nno markdown"));
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].role, Role::user());
    }

    #[test]
    fn merge_consecutive_combines_same_role_runs() {
        let messages = vec![
            msg(Role::user(), "a"),
            msg(Role::user(), "b"),
            msg(Role::assistant(), "c"),
        ];
        let merged = merge_consecutive(messages);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].content.len(), 2);
        match &merged[0].content[1] {
            ContentPart::Text(t) => assert_eq!(t.text, "b"),
            other => panic!("unexpected part: {other:?}"),
        }
    }

    #[test]
    fn call_id_minter_round_trips_name_lookup() {
        let minter = CallIdMinter::new();
        let id = minter.mint("get_weather");
        assert_eq!(minter.name_for(&id).as_deref(), Some("get_weather"));
        assert!(minter.name_for("unknown").is_none());
    }

    #[test]
    fn retry_after_parses_integer_seconds_case_insensitively() {
        let mut headers = HashMap::new();
        headers.insert("Retry-After".to_string(), "30".to_string());
        assert_eq!(retry_after_from_headers(&headers), Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn idle_timeout_passes_through_items_within_budget() {
        let source = stream::iter(vec![Ok::<_, LLMError>(1), Ok(2), Ok(3)]);
        let wrapped = with_idle_timeout(source, Duration::from_secs(5), "test");
        let items: Vec<_> = wrapped.collect().await;
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|item| item.is_ok()));
    }

    #[tokio::test]
    async fn idle_timeout_surfaces_request_timeout_and_then_ends() {
        let source = stream::unfold(0, |state| async move {
            if state == 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Some((Ok::<_, LLMError>(state), state + 1))
            } else {
                None
            }
        });
        let wrapped = with_idle_timeout(source, Duration::from_millis(1), "test");
        let items: Vec<_> = wrapped.collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(LLMError::RequestTimeout { .. })));
    }
}
