//! OpenAI 兼容后端
//!
//! 请求体用 async_openai 的类型构建，经共用的 HttpBase 发送到 `{base}/chat/completions`；
//! OpenAI、DeepSeek、Kimi、MiniMax、Qwen、Mistral、Groq 共用此实现。
//! 传输层不做任何重试，重试只由 LlmClient 的 RetryConfig 负责；非 2xx 保留状态码。

use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::llm::sse::data_events;
use crate::llm::{ChatBackend, ChatRequest, EventStream, HttpBase, LlmError, LlmResponse, Role, StreamEvent, Usage};

pub const OPENAI_BASE: &str = "https://api.openai.com/v1";

/// 响应与流式块共用：非流式取 message，流式取 delta
#[derive(Debug, Default, Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<Choice>,
    model: Option<String>,
    usage: Option<WireUsage>,
    error: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct Choice {
    message: Option<Content>,
    delta: Option<Content>,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl From<WireUsage> for Usage {
    fn from(u: WireUsage) -> Self {
        Usage::new(u.prompt_tokens, u.completion_tokens)
    }
}

pub struct OpenAiBackend {
    http: HttpBase,
}

impl OpenAiBackend {
    pub fn new(provider: &str, base_url: Option<&str>, api_key: Option<&str>) -> Self {
        Self {
            http: HttpBase::new(provider, base_url.unwrap_or(OPENAI_BASE), api_key),
        }
    }

    pub fn with_http(http: HttpBase) -> Self {
        Self { http }
    }

    fn build_messages(
        &self,
        request: &ChatRequest,
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        let mut out = Vec::with_capacity(request.messages.len() + 1);
        if !request.system.is_empty() {
            out.push(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(request.system.clone())
                    .build()
                    .map_err(|e| self.invalid(e))?,
            ));
        }
        for m in &request.messages {
            let message = match m.role {
                Role::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(|e| self.invalid(e))?,
                ),
                Role::Assistant => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(|e| self.invalid(e))?,
                ),
            };
            out.push(message);
        }
        Ok(out)
    }

    /// 流式用量选项与工具定义以 JSON 形式合并进请求体
    #[allow(deprecated)]
    fn build_body(&self, request: &ChatRequest, stream: bool) -> Result<Value, LlmError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&request.model)
            .messages(self.build_messages(request)?)
            .temperature(request.temperature)
            .max_tokens(request.max_tokens);
        if stream {
            args.stream(true);
        }
        let built = args.build().map_err(|e| self.invalid(e))?;

        let mut body = serde_json::to_value(&built).map_err(|e| self.invalid(e))?;
        if stream {
            body["stream_options"] = json!({ "include_usage": true });
        }
        if let Some(tools) = &request.tools {
            body["tools"] = Value::Array(tools.clone());
        }
        Ok(body)
    }

    fn request(&self, body: &Value) -> Result<reqwest::RequestBuilder, LlmError> {
        self.http
            .bearer(self.http.post(&self.http.url("chat/completions"), body))
    }

    fn invalid(&self, err: impl std::fmt::Display) -> LlmError {
        LlmError::invalid_response(&self.http.provider, err.to_string())
    }
}

/// 200 响应体里的 error 对象（部分兼容服务商流中途报错时使用）
fn body_error(provider: &str, error: &Value) -> LlmError {
    let message = error["message"].as_str().unwrap_or("unknown error");
    let kind = error["type"]
        .as_str()
        .or_else(|| error["code"].as_str())
        .unwrap_or("error");
    LlmError::classify(provider, format!("{kind}: {message}"))
}

fn parse_stream_chunk(provider: &str, data: &str) -> Result<Vec<StreamEvent>, LlmError> {
    let chunk: CompletionBody = serde_json::from_str(data)
        .map_err(|e| LlmError::invalid_response(provider, format!("bad stream chunk: {e}")))?;
    if let Some(error) = &chunk.error {
        return Err(body_error(provider, error));
    }
    let mut out: Vec<StreamEvent> = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.and_then(|d| d.content))
        .filter(|text| !text.is_empty())
        .map(StreamEvent::Text)
        .collect();
    if let Some(usage) = chunk.usage {
        out.push(StreamEvent::Usage(usage.into()));
    }
    Ok(out)
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.http.provider
    }

    async fn chat(&self, request: &ChatRequest) -> Result<LlmResponse, LlmError> {
        let body = self.build_body(request, false)?;
        let response: CompletionBody = self.http.send_json(self.request(&body)?).await?;
        if let Some(error) = &response.error {
            return Err(body_error(&self.http.provider, error));
        }

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();

        Ok(LlmResponse {
            content,
            model: response.model.unwrap_or_else(|| request.model.clone()),
            usage: response.usage.map(Usage::from),
        })
    }

    async fn stream(&self, request: &ChatRequest) -> Result<EventStream, LlmError> {
        let body = self.build_body(request, true)?;
        let response = self.http.send(self.request(&body)?).await?;
        let provider = self.http.provider.clone();

        let events = data_events(&self.http.provider, response).flat_map(move |data| {
            let batch = match data.and_then(|d| parse_stream_chunk(&provider, &d)) {
                Ok(events) => events.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            futures_util::stream::iter(batch)
        });
        Ok(Box::pin(events))
    }
}
