use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::LLMError;
use crate::retry::{self, RetryConfig};
use crate::types::{CapabilityDescriptor, ChatChunk, ChatRequest, ChatResponse};

pub mod anthropic_messages;
pub mod google_gemini;
pub mod openai_responses;

/// Stream alias returned by provider implementations for incremental responses.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, LLMError>> + Send>>;

/// Trait implemented by every provider integration.
///
/// Providers translate the unified [`ChatRequest`] into a vendor-specific HTTP call and
/// map the response back to [`ChatResponse`] or [`ChatChunk`] events.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Submits a request and waits for the full response body.
    ///
    /// # Examples
    ///
    /// ```
    /// # use async_trait::async_trait;
    /// # use unillm::provider::{LLMProvider, ChatStream};
    /// # use unillm::types::{ChatRequest, ChatResponse, CapabilityDescriptor};
    /// # use unillm::error::LLMError;
    /// # use futures_util::stream;
    /// struct RejectingProvider;
    ///
    /// #[async_trait]
    /// impl LLMProvider for RejectingProvider {
    ///     async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, LLMError> {
    ///         Err(LLMError::Provider { provider: "rejecting", message: "not implemented".into() })
    ///     }
    ///     async fn stream_chat(&self, _request: ChatRequest) -> Result<ChatStream, LLMError> {
    ///         Ok(Box::pin(stream::empty()))
    ///     }
    ///     async fn close(&self) -> Result<(), LLMError> { Ok(()) }
    ///     fn capabilities(&self) -> CapabilityDescriptor { CapabilityDescriptor::default() }
    ///     fn name(&self) -> &'static str { "rejecting" }
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Implementations should propagate any [`LLMError`] raised while invoking the remote
    /// provider.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError>;

    /// Submits a request and returns a stream of incremental events.
    ///
    /// # Errors
    ///
    /// Implementations should surface transport issues via [`LLMError::Network`] and
    /// vendor-specific errors through [`LLMError::Provider`].
    async fn stream_chat(&self, request: ChatRequest) -> Result<ChatStream, LLMError>;

    /// Releases any resources (connection pools, background tasks) held by the
    /// provider. The default implementation is a no-op; adapters that keep
    /// no such state need not override it.
    async fn close(&self) -> Result<(), LLMError> {
        Ok(())
    }

    /// Returns the provider's capability descriptor.
    fn capabilities(&self) -> CapabilityDescriptor;

    /// Returns the provider identifier used in logs and error reporting.
    fn name(&self) -> &'static str;
}

/// Thread-safe handle to a provider implementation.
pub type DynProvider = Arc<dyn LLMProvider>;

/// Extension trait adding retrying `chat` calls to any [`LLMProvider`].
#[async_trait]
pub trait RetryableLLMProvider {
    /// Calls [`LLMProvider::chat`], retrying retryable failures per `config`.
    async fn chat_with_retry(
        &self,
        request: ChatRequest,
        config: RetryConfig,
    ) -> Result<ChatResponse, LLMError>;
}

#[async_trait]
impl<P: LLMProvider + ?Sized> RetryableLLMProvider for P {
    async fn chat_with_retry(
        &self,
        request: ChatRequest,
        config: RetryConfig,
    ) -> Result<ChatResponse, LLMError> {
        retry::retry(&config, None, || self.chat(request.clone())).await
    }
}
