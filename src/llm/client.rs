//! 统一 LLM 客户端
//!
//! 构建时按 Provider 选定协议后端（只绑定一次），对外只暴露 chat / stream：
//! - 温度覆盖表在发请求前应用
//! - chat 整体重试；stream 只重试「打开流」这一步，流中途的错误直接交给调用方
//! - 用量记录进 Session 共享的 UsageTracker，流式调用在流被完全消费后才记录

use std::pin::Pin;
use std::sync::{Arc, PoisonError};

use futures_util::{stream, Stream, StreamExt};
use serde_json::Value;

use crate::core::{system_clock, Clock};
use crate::llm::{
    retry_with_backoff, AnthropicBackend, ChatBackend, ChatRequest, CohereBackend, EventStream,
    GeminiBackend, LlmError, LlmResponse, Message, OpenAiBackend, Protocol, Provider, RetryConfig,
    SharedUsage, StreamEvent, Usage,
};

/// 文本增量流；有限、不可重启
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

pub struct LlmClient {
    provider: Provider,
    model: String,
    backend: Arc<dyn ChatBackend>,
    retry: RetryConfig,
    clock: Arc<dyn Clock>,
    usage: SharedUsage,
}

impl LlmClient {
    /// model 为 None 时使用服务商默认模型；base_url 为 None 时使用服务商默认地址
    pub fn new(
        provider: Provider,
        model: Option<&str>,
        api_key: Option<&str>,
        base_url: Option<&str>,
        usage: SharedUsage,
    ) -> Self {
        let base_url = base_url.or(provider.default_base_url());
        let backend: Arc<dyn ChatBackend> = match provider.protocol() {
            Protocol::OpenAiCompatible => {
                Arc::new(OpenAiBackend::new(provider.as_str(), base_url, api_key))
            }
            Protocol::Anthropic => Arc::new(AnthropicBackend::new(
                base_url.unwrap_or("https://api.anthropic.com/v1"),
                api_key,
            )),
            Protocol::Gemini => Arc::new(GeminiBackend::new(
                base_url.unwrap_or("https://generativelanguage.googleapis.com/v1beta"),
                api_key,
            )),
            Protocol::Cohere => Arc::new(CohereBackend::new(
                base_url.unwrap_or("https://api.cohere.ai/v1"),
                api_key,
            )),
        };
        let model = model.unwrap_or(provider.default_model());
        tracing::debug!(provider = %provider, model, "LLM client created");
        Self::with_backend(provider, model, backend, usage)
    }

    pub fn with_backend(
        provider: Provider,
        model: &str,
        backend: Arc<dyn ChatBackend>,
        usage: SharedUsage,
    ) -> Self {
        Self {
            provider,
            model: model.to_string(),
            backend,
            retry: RetryConfig::default(),
            clock: system_clock(),
            usage,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn usage(&self) -> &SharedUsage {
        &self.usage
    }

    fn request(
        &self,
        system: &str,
        messages: &[Message],
        temperature: f32,
        max_tokens: u32,
        tools: Option<Vec<Value>>,
    ) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            system: system.to_string(),
            messages: messages.to_vec(),
            temperature: self.provider.effective_temperature(temperature),
            max_tokens,
            tools,
        }
    }

    pub async fn chat(
        &self,
        system: &str,
        messages: &[Message],
        temperature: f32,
        max_tokens: u32,
        tools: Option<Vec<Value>>,
    ) -> Result<LlmResponse, LlmError> {
        let request = self.request(system, messages, temperature, max_tokens, tools);
        let backend = self.backend.as_ref();
        let response = retry_with_backoff(&self.retry, self.clock.as_ref(), "chat", || {
            backend.chat(&request)
        })
        .await?;

        record_usage(&self.usage, &self.model, response.usage);
        Ok(response)
    }

    pub async fn stream(
        &self,
        system: &str,
        messages: &[Message],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<TextStream, LlmError> {
        let request = self.request(system, messages, temperature, max_tokens, None);
        let backend = self.backend.as_ref();
        let events = retry_with_backoff(&self.retry, self.clock.as_ref(), "stream", || {
            backend.stream(&request)
        })
        .await?;

        Ok(Box::pin(text_stream(
            events,
            self.usage.clone(),
            self.model.clone(),
        )))
    }
}

fn record_usage(usage: &SharedUsage, model: &str, value: Option<Usage>) {
    usage
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .record(model, value);
}

struct StreamState {
    events: EventStream,
    seen: Option<Usage>,
    usage: SharedUsage,
    model: String,
    finished: bool,
}

/// 过滤出文本事件；用量快照按字段取最大值合并，流结束时记录一次
fn text_stream(
    events: EventStream,
    usage: SharedUsage,
    model: String,
) -> impl Stream<Item = Result<String, LlmError>> + Send {
    let state = StreamState {
        events,
        seen: None,
        usage,
        model,
        finished: false,
    };
    stream::unfold(state, |mut st| async move {
        if st.finished {
            return None;
        }
        loop {
            match st.events.next().await {
                Some(Ok(StreamEvent::Text(text))) => return Some((Ok(text), st)),
                Some(Ok(StreamEvent::Usage(u))) => {
                    st.seen = Some(st.seen.map_or(u, |prev| prev.merge_max(u)));
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
                None => {
                    record_usage(&st.usage, &st.model, st.seen);
                    return None;
                }
            }
        }
    })
}
