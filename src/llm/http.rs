//! 各协议后端共用的 HTTP 基础：POST JSON、状态码映射为 LlmError
//!
//! 只设连接超时与读间隔超时，不设总时长：合成回答的流可能持续数分钟。

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::llm::LlmError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// 两次读取之间的最长间隔；长时间流式输出不受总时长限制
const READ_TIMEOUT: Duration = Duration::from_secs(180);

fn build_client(connect: Duration, read: Duration) -> Client {
    Client::builder()
        .connect_timeout(connect)
        .read_timeout(read)
        .build()
        .unwrap_or_default()
}

#[derive(Clone)]
pub struct HttpBase {
    pub provider: String,
    pub base_url: String,
    pub api_key: Option<String>,
    client: Client,
}

impl HttpBase {
    pub fn new(provider: &str, base_url: &str, api_key: Option<&str>) -> Self {
        Self {
            provider: provider.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()).map(String::from),
            client: build_client(CONNECT_TIMEOUT, READ_TIMEOUT),
        }
    }

    /// 替换连接与读超时
    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.client = build_client(connect, read);
        self
    }

    pub fn bearer(&self, request: RequestBuilder) -> Result<RequestBuilder, LlmError> {
        Ok(request.bearer_auth(self.key()?))
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn key(&self) -> Result<&str, LlmError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| LlmError::MissingApiKey(self.provider.clone()))
    }

    pub fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> RequestBuilder {
        self.client.post(url).json(body)
    }

    /// 发送请求；非 2xx 时读取响应体并按状态码归类
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, LlmError> {
        let response = request
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(&self.provider, e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(provider = %self.provider, status = status.as_u16(), "request rejected");
        Err(LlmError::from_status(&self.provider, status.as_u16(), body))
    }

    pub async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, LlmError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| LlmError::from_reqwest(&self.provider, e))
    }
}
