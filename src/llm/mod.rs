//! LLM 层：统一客户端、协议后端（OpenAI 兼容 / Anthropic / Gemini / Cohere / Mock）、模型目录与用量统计

pub mod anthropic;
pub mod catalog;
pub mod client;
pub mod cohere;
pub mod error;
pub mod gemini;
pub mod http;
pub mod mock;
pub mod openai;
pub mod provider;
pub mod retry;
pub mod sse;
#[cfg(test)]
pub(crate) mod testing;
pub mod traits;
pub mod usage;

pub use anthropic::AnthropicBackend;
pub use catalog::{ModelCatalog, ModelInfo, Pricing, PROVIDER_PREFIXES};
pub use client::{LlmClient, TextStream};
pub use cohere::CohereBackend;
pub use error::{is_transient_message, LlmError};
pub use gemini::GeminiBackend;
pub use http::HttpBase;
pub use mock::MockBackend;
pub use openai::OpenAiBackend;
pub use provider::{Protocol, Provider, TEMPERATURE_OVERRIDES};
pub use retry::{retry_with_backoff, RetryConfig};
pub use traits::{ChatBackend, ChatRequest, EventStream, LlmResponse, Message, Role, StreamEvent};
pub use usage::{SharedUsage, Usage, UsageRecord, UsageTracker};
