//! Mock LLM 后端（用于测试，无需 API）
//!
//! 按脚本依次返回预置回复或错误；脚本耗尽后回显最后一条 User 消息。
//! 记录每次收到的请求，便于断言温度覆盖、系统提示词等。

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{ChatBackend, ChatRequest, EventStream, LlmError, LlmResponse, Role, StreamEvent, Usage};

type Scripted = Result<LlmResponse, LlmError>;

#[derive(Debug, Default)]
pub struct MockBackend {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ChatRequest>>,
    /// 为 true 时回复附带 usage（input = 请求消息数 × 10，output = 回复词数）
    report_usage: bool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_usage(mut self) -> Self {
        self.report_usage = true;
        self
    }

    /// 追加一条文本回复
    pub fn reply(self, content: impl Into<String>) -> Self {
        let content = content.into();
        let usage = self.report_usage.then(|| Usage::new(10, word_count(&content)));
        self.push(Ok(LlmResponse {
            content,
            model: "mock".into(),
            usage,
        }))
    }

    pub fn fail(self, err: LlmError) -> Self {
        self.push(Err(err))
    }

    fn push(self, item: Scripted) -> Self {
        lock(&self.script).push_back(item);
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    fn next(&self, request: &ChatRequest) -> Scripted {
        lock(&self.requests).push(request.clone());
        if let Some(item) = lock(&self.script).pop_front() {
            return item;
        }
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        let content = format!("Echo from Mock: {last_user}");
        let usage = self
            .report_usage
            .then(|| Usage::new(request.messages.len() as u64 * 10, word_count(&content)));
        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            usage,
        })
    }
}

fn word_count(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl ChatBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<LlmResponse, LlmError> {
        self.next(request)
    }

    /// 按空白切分为多个文本事件，末尾附带 usage（若有）
    async fn stream(&self, request: &ChatRequest) -> Result<EventStream, LlmError> {
        let response = self.next(request)?;
        let mut events: Vec<Result<StreamEvent, LlmError>> = Vec::new();
        let mut first = true;
        for word in response.content.split(' ') {
            let chunk = if first { word.to_string() } else { format!(" {word}") };
            first = false;
            events.push(Ok(StreamEvent::Text(chunk)));
        }
        if let Some(usage) = response.usage {
            events.push(Ok(StreamEvent::Usage(usage)));
        }
        Ok(Box::pin(stream::iter(events)))
    }
}
