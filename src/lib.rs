//! Unified, provider-agnostic LLM client: one request/response model across
//! OpenAI, Anthropic, and Gemini, with streaming, tool-calling, and retries.

pub mod base;
pub mod client;
pub mod config;
pub mod error;
pub mod generate;
pub mod http;
pub mod provider;
pub mod retry;
pub mod sse;
pub mod types;

pub use client::LLMClient;
pub use error::LLMError;
pub use generate::{generate, generate_object, generate_stream, GenerateOptions};
pub use provider::{ChatStream, LLMProvider};
pub use retry::RetryConfig;
pub use types::*;
