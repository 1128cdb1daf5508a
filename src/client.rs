//! Client façade: a provider registry with routing, an onion-style middleware
//! chain around synchronous `chat` calls, and a process-wide default-client
//! singleton bootstrapped from the environment.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;

use crate::config::{self, Credential, ModelConfig, ProviderKind};
use crate::error::LLMError;
use crate::http::reqwest::default_dyn_transport;
use crate::provider::anthropic_messages::AnthropicMessagesProvider;
use crate::provider::google_gemini::GoogleGeminiProvider;
use crate::provider::openai_responses::OpenAiResponsesProvider;
use crate::provider::{ChatStream, DynProvider, LLMProvider};
use crate::retry::{self, RetryConfig};
use crate::types::{CapabilityDescriptor, ChatRequest, ChatResponse};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Request-scoped context handed to every middleware layer.
#[derive(Debug, Clone)]
pub struct Context {
    /// Name of the provider the request resolved to.
    pub provider: String,
}

/// Continuation representing the remainder of the middleware chain. Calling
/// [`Next::run`] invokes the next layer, or the provider itself once every
/// layer has run.
pub struct Next<'a> {
    middlewares: &'a [Arc<dyn Middleware>],
    provider: &'a dyn LLMProvider,
    ctx: &'a Context,
}

impl<'a> Next<'a> {
    pub fn run(self, request: ChatRequest) -> BoxFuture<'a, Result<ChatResponse, LLMError>> {
        Box::pin(async move {
            match self.middlewares.split_first() {
                Some((head, rest)) => {
                    let next = Next {
                        middlewares: rest,
                        provider: self.provider,
                        ctx: self.ctx,
                    };
                    head.handle(self.ctx, request, next).await
                }
                None => self.provider.chat(request).await,
            }
        })
    }
}

/// Onion-style middleware wrapping non-streaming `chat` calls. Registration
/// order is request-phase order: the first registered middleware sees the
/// request first and the response last. Streaming bypasses this chain
/// entirely, since deltas arrive incrementally and a request/response
/// contract does not fit them.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(
        &self,
        ctx: &Context,
        request: ChatRequest,
        next: Next<'_>,
    ) -> Result<ChatResponse, LLMError>;
}

/// Builder assembling a [`LLMClient`] from registered provider adapters and
/// middleware. Registering two adapters under the same name is rejected.
#[derive(Default)]
pub struct LLMClientBuilder {
    providers: HashMap<String, DynProvider>,
    default_provider: Option<String>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl LLMClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider adapter under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`LLMError::Configuration`] if `name` is already registered.
    pub fn register(
        mut self,
        name: impl Into<String>,
        provider: DynProvider,
    ) -> Result<Self, LLMError> {
        let name = name.into();
        if self.providers.contains_key(&name) {
            return Err(LLMError::Configuration {
                field: "provider".to_string(),
                reason: format!("provider '{name}' is already registered"),
            });
        }
        self.providers.insert(name, provider);
        Ok(self)
    }

    /// Sets the provider used when a request does not name one explicitly.
    pub fn with_default(mut self, name: impl Into<String>) -> Self {
        self.default_provider = Some(name.into());
        self
    }

    /// Appends a middleware layer to the chain.
    pub fn use_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn build(self) -> LLMClient {
        LLMClient {
            providers: self.providers,
            default_provider: self.default_provider,
            middleware: self.middleware,
        }
    }
}

/// Unified client façade routing requests to one of several registered
/// provider adapters.
pub struct LLMClient {
    providers: HashMap<String, DynProvider>,
    default_provider: Option<String>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl LLMClient {
    pub fn builder() -> LLMClientBuilder {
        LLMClientBuilder::new()
    }

    /// Resolves which provider a request should go to: an explicit
    /// `request.provider` wins, otherwise the client's configured default.
    /// An unknown name is a [`LLMError::Configuration`] error.
    fn resolve(&self, request: &ChatRequest) -> Result<(&str, &DynProvider), LLMError> {
        let name = request
            .provider
            .as_deref()
            .or(self.default_provider.as_deref())
            .ok_or_else(|| LLMError::Configuration {
                field: "provider".to_string(),
                reason: "no provider specified on the request and no default configured"
                    .to_string(),
            })?;

        let provider = self.providers.get(name).ok_or_else(|| LLMError::Configuration {
            field: "provider".to_string(),
            reason: format!("unknown provider '{name}'"),
        })?;

        Ok((name, provider))
    }

    /// Sends a request through the middleware chain to its resolved provider.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError> {
        let (name, provider) = self.resolve(&request)?;
        tracing::debug!(provider = name, "routing chat request");
        let ctx = Context {
            provider: name.to_string(),
        };
        let next = Next {
            middlewares: &self.middleware,
            provider: provider.as_ref(),
            ctx: &ctx,
        };
        next.run(request).await
    }

    /// Sends a request with exponential-backoff retry wrapped around the
    /// whole middleware chain (so a middleware observes every attempt).
    pub async fn chat_with_retry(
        &self,
        request: ChatRequest,
        config: RetryConfig,
    ) -> Result<ChatResponse, LLMError> {
        retry::retry(&config, None, || self.chat(request.clone())).await
    }

    /// Streams a request directly to its resolved provider, bypassing the
    /// middleware chain.
    pub async fn stream_chat(&self, request: ChatRequest) -> Result<ChatStream, LLMError> {
        let (_, provider) = self.resolve(&request)?;
        provider.stream_chat(request).await
    }

    /// Returns the capability descriptor for a registered provider, if any.
    pub fn capabilities(&self, name: &str) -> Option<CapabilityDescriptor> {
        self.providers.get(name).map(|p| p.capabilities())
    }

    /// Lists the registered provider names.
    pub fn providers(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// Closes every registered adapter, returning the first error encountered
    /// (if any) after attempting to close all of them.
    pub async fn close(&self) -> Result<(), LLMError> {
        let mut first_error = None;
        for provider in self.providers.values() {
            if let Err(err) = provider.close().await {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn build_provider(config: &ModelConfig) -> Result<DynProvider, LLMError> {
    require_credential(config.provider, &config.credential)?;
    let transport = default_dyn_transport()?;
    match config.provider {
        ProviderKind::AnthropicMessages => Ok(Arc::new(AnthropicMessagesProvider::from_model_config(
            config, transport,
        )?)),
        ProviderKind::OpenAiResponses => Ok(Arc::new(OpenAiResponsesProvider::from_model_config(
            config, transport,
        )?)),
        ProviderKind::GoogleGemini => Ok(Arc::new(GoogleGeminiProvider::from_model_config(
            config, transport,
        )?)),
    }
}

/// Builds a ready-to-use client from the environment-bootstrapped provider
/// list (see [`config::bootstrap_from_env`]), defaulting to the first
/// bootstrapped handle.
pub fn client_from_env() -> Result<LLMClient, LLMError> {
    let configs = config::bootstrap_from_env();
    if configs.is_empty() {
        return Err(LLMError::Configuration {
            field: "environment".to_string(),
            reason: "no ANTHROPIC_API_KEY, OPENAI_API_KEY, or GEMINI_API_KEY set".to_string(),
        });
    }

    let default_handle = configs[0].handle.clone();
    let mut builder = LLMClientBuilder::new();
    for config in &configs {
        let provider = build_provider(config)?;
        builder = builder.register(config.handle.clone(), provider)?;
    }
    Ok(builder.with_default(default_handle).build())
}

static DEFAULT_CLIENT: OnceLock<Mutex<Option<Arc<LLMClient>>>> = OnceLock::new();

fn default_client_slot() -> &'static Mutex<Option<Arc<LLMClient>>> {
    DEFAULT_CLIENT.get_or_init(|| Mutex::new(None))
}

/// Returns the process-wide default client, bootstrapping it from the
/// environment on first access. A failed bootstrap attempt does not poison
/// the slot: the next call tries again from scratch.
pub fn default_client() -> Result<Arc<LLMClient>, LLMError> {
    let mut slot = default_client_slot()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(client) = slot.as_ref() {
        return Ok(Arc::clone(client));
    }
    let client = Arc::new(client_from_env()?);
    tracing::info!(providers = ?client.providers(), "bootstrapped default client from environment");
    *slot = Some(Arc::clone(&client));
    Ok(client)
}

/// Clears the default-client singleton, forcing the next [`default_client`]
/// call to re-bootstrap from the environment. Exposed for tests.
#[doc(hidden)]
pub fn reset_default_client_for_tests() {
    let mut slot = default_client_slot()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *slot = None;
}

/// `Credential::None` configs fail fast here with a clear configuration
/// error instead of surfacing as a confusing downstream authentication
/// failure from inside an adapter constructor.
fn require_credential(kind: ProviderKind, credential: &Credential) -> Result<(), LLMError> {
    if matches!(credential, Credential::None) {
        return Err(LLMError::Configuration {
            field: "credential".to_string(),
            reason: format!("provider {kind:?} requires a credential"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::types::{FinishReason, FinishReasonKind, Message, ProviderMetadata, Role};

    struct StubProvider {
        name: &'static str,
    }

    #[async_trait]
    impl LLMProvider for StubProvider {
        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, LLMError> {
            Ok(ChatResponse {
                message: Message {
                    role: Role::assistant(),
                    name: None,
                    content: Vec::new(),
                    tool_call_id: None,
                    metadata: None,
                },
                usage: None,
                finish_reason: Some(FinishReason::new(FinishReasonKind::Stop, "stop")),
                model: None,
                provider: ProviderMetadata {
                    provider: self.name.to_string(),
                    ..Default::default()
                },
                rate_limit: None,
            })
        }

        async fn stream_chat(&self, _request: ChatRequest) -> Result<ChatStream, LLMError> {
            Ok(Box::pin(futures_util::stream::empty()))
        }

        fn capabilities(&self) -> CapabilityDescriptor {
            CapabilityDescriptor::default()
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl LLMProvider for FailingProvider {
        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, LLMError> {
            Err(LLMError::Provider {
                provider: "failing",
                message: "close failed".to_string(),
            })
        }

        async fn stream_chat(&self, _request: ChatRequest) -> Result<ChatStream, LLMError> {
            Ok(Box::pin(futures_util::stream::empty()))
        }

        async fn close(&self) -> Result<(), LLMError> {
            Err(LLMError::Provider {
                provider: "failing",
                message: "close failed".to_string(),
            })
        }

        fn capabilities(&self) -> CapabilityDescriptor {
            CapabilityDescriptor::default()
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    struct CountingMiddleware {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Middleware for CountingMiddleware {
        async fn handle(
            &self,
            _ctx: &Context,
            request: ChatRequest,
            next: Next<'_>,
        ) -> Result<ChatResponse, LLMError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            next.run(request).await
        }
    }

    fn plain_request() -> ChatRequest {
        ChatRequest {
            messages: vec![Message::user_text("hi")],
            ..ChatRequest::default()
        }
    }

    #[tokio::test]
    async fn registering_duplicate_provider_name_is_rejected() {
        let builder = LLMClientBuilder::new()
            .register("a", Arc::new(StubProvider { name: "a" }))
            .unwrap();
        let err = builder.register("a", Arc::new(StubProvider { name: "a" })).unwrap_err();
        assert!(matches!(err, LLMError::Configuration { .. }));
    }

    #[tokio::test]
    async fn explicit_request_provider_overrides_default() {
        let client = LLMClientBuilder::new()
            .register("a", Arc::new(StubProvider { name: "a" }))
            .unwrap()
            .register("b", Arc::new(StubProvider { name: "b" }))
            .unwrap()
            .with_default("a")
            .build();

        let mut request = plain_request();
        request.provider = Some("b".to_string());
        let response = client.chat(request).await.unwrap();
        assert_eq!(response.provider.provider, "b");
    }

    #[tokio::test]
    async fn unknown_provider_name_is_a_configuration_error() {
        let client = LLMClientBuilder::new()
            .register("a", Arc::new(StubProvider { name: "a" }))
            .unwrap()
            .with_default("a")
            .build();
        let mut request = plain_request();
        request.provider = Some("nonexistent".to_string());
        let err = client.chat(request).await.unwrap_err();
        assert!(matches!(err, LLMError::Configuration { .. }));
    }

    #[tokio::test]
    async fn missing_provider_and_default_is_a_configuration_error() {
        let client = LLMClientBuilder::new().build();
        let err = client.chat(plain_request()).await.unwrap_err();
        assert!(matches!(err, LLMError::Configuration { .. }));
    }

    #[tokio::test]
    async fn middleware_chain_runs_in_registration_order_around_chat() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = LLMClientBuilder::new()
            .register("a", Arc::new(StubProvider { name: "a" }))
            .unwrap()
            .with_default("a")
            .use_middleware(Arc::new(CountingMiddleware {
                calls: Arc::clone(&calls),
            }))
            .use_middleware(Arc::new(CountingMiddleware {
                calls: Arc::clone(&calls),
            }))
            .build();

        client.chat(plain_request()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn close_attempts_every_adapter_and_surfaces_first_error() {
        let client = LLMClientBuilder::new()
            .register("ok", Arc::new(StubProvider { name: "ok" }))
            .unwrap()
            .register("broken", Arc::new(FailingProvider))
            .unwrap()
            .build();
        let err = client.close().await.unwrap_err();
        assert!(matches!(err, LLMError::Provider { .. }));
    }
}
