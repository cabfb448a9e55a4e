//! 会话：配置、惰性构建的 LLM 客户端、用量统计与工具健康度
//!
//! 每个 (provider, model) 组合只构建一个客户端；切换模型或服务商时丢弃缓存，
//! 下次使用时按新配置重建。用量统计挂在会话上，跨模型切换持续累计。

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::agent::tool_health::{ToolHealth, ToolHealthTracker};
use crate::config::AppConfig;
use crate::core::{system_clock, AgentError, Clock};
use crate::llm::{LlmClient, ModelCatalog, Provider, SharedUsage, UsageTracker};

pub struct Session {
    id: String,
    config: AppConfig,
    catalog: Arc<ModelCatalog>,
    clock: Arc<dyn Clock>,
    usage: SharedUsage,
    llm: Mutex<Option<Arc<LlmClient>>>,
    tool_health: ToolHealthTracker,
}

impl Session {
    pub fn new(config: AppConfig, catalog: Arc<ModelCatalog>) -> Self {
        Self::with_clock(config, catalog, system_clock())
    }

    pub fn with_clock(config: AppConfig, catalog: Arc<ModelCatalog>, clock: Arc<dyn Clock>) -> Self {
        let tool_health = ToolHealthTracker::new(config.tool_health_policy(), clock.clone());
        let usage = UsageTracker::shared(catalog.clone());
        let id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(session = %id, "session created");
        Self {
            id,
            config,
            catalog,
            clock,
            usage,
            llm: Mutex::new(None),
            tool_health,
        }
    }

    /// 预置客户端（测试中注入 Mock 后端）；客户端需使用本会话的 usage()
    pub fn with_llm(self, client: LlmClient) -> Self {
        *self.llm_slot() = Some(Arc::new(client));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<ModelCatalog> {
        &self.catalog
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn usage(&self) -> &SharedUsage {
        &self.usage
    }

    fn llm_slot(&self) -> MutexGuard<'_, Option<Arc<LlmClient>>> {
        self.llm.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 获取（必要时构建）当前客户端
    pub fn get_llm(&self) -> Result<Arc<LlmClient>, AgentError> {
        let mut slot = self.llm_slot();
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = Arc::new(self.create_llm()?);
        *slot = Some(client.clone());
        Ok(client)
    }

    fn create_llm(&self) -> Result<LlmClient, AgentError> {
        let provider = self.config.provider()?;
        let api_key = self.config.llm_api_key(provider);
        let base_url = self.config.base_url(provider);
        let model = self.config.llm.model.trim();
        let model = (!model.is_empty()).then_some(model);
        Ok(LlmClient::new(
            provider,
            model,
            api_key.as_deref(),
            base_url.as_deref(),
            self.usage.clone(),
        )
        .with_clock(self.clock.clone()))
    }

    /// 切换模型；未指定服务商时按目录或前缀推断
    pub fn set_model(&mut self, model: &str, provider: Option<Provider>) -> Result<(), AgentError> {
        if let Some(provider) = provider {
            self.config.set("llm.provider", provider.as_str(), &self.catalog)?;
        }
        self.config.set("llm.model", model, &self.catalog)?;
        *self.llm_slot() = None;
        tracing::info!(model, provider = %self.config.llm.provider, "model switched");
        Ok(())
    }

    /// 更新凭据并丢弃缓存客户端
    pub fn set_api_key(&mut self, provider: Provider, key: &str) {
        self.config.set_api_key(provider, key);
        *self.llm_slot() = None;
    }

    /// 修改回答语言等会话内配置；客户端不受影响
    pub fn set_language(&mut self, language: &str) -> Result<(), AgentError> {
        self.config.set("ui.language", language, &self.catalog)
    }

    pub fn current_model(&self) -> String {
        if let Some(client) = self.llm_slot().as_ref() {
            return client.model().to_string();
        }
        match self.config.llm.model.trim() {
            "" => "claude-sonnet-4-5-20250929".to_string(),
            model => model.to_string(),
        }
    }

    pub fn record_tool_success(&self, tool: &str) {
        self.tool_health.record_success(tool);
    }

    pub fn record_tool_failure(&self, tool: &str, error_text: &str) -> bool {
        self.tool_health.record_failure(tool, error_text)
    }

    pub fn tool_health_suppressed_tools(&self) -> BTreeSet<String> {
        self.tool_health.suppressed_tools()
    }

    pub fn tool_health_report(&self) -> Vec<(String, ToolHealth)> {
        self.tool_health.report()
    }

    pub fn usage_summary(&self) -> String {
        self.usage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .summary()
    }

    pub fn reset_usage(&self) {
        self.usage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MockClock;
    use crate::llm::{Message, MockBackend, Usage};

    fn session() -> Session {
        let mut cfg = AppConfig::default();
        cfg.set_api_key(Provider::Anthropic, "sk-ant-test");
        Session::with_clock(cfg, Arc::new(ModelCatalog::builtin()), Arc::new(MockClock::new()))
    }

    #[test]
    fn test_client_cached_until_model_switch() {
        let mut s = session();
        let first = s.get_llm().unwrap();
        let again = s.get_llm().unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(first.provider(), Provider::Anthropic);

        s.set_model("gpt-4o-mini", None).unwrap();
        assert_eq!(s.current_model(), "gpt-4o-mini");
        let rebuilt = s.get_llm().unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(rebuilt.provider(), Provider::OpenAi);
        assert_eq!(rebuilt.model(), "gpt-4o-mini");
    }

    #[test]
    fn test_explicit_provider_for_unknown_model() {
        let mut s = session();
        s.set_model("my-finetune", Some(Provider::Groq)).unwrap();
        assert_eq!(s.get_llm().unwrap().provider(), Provider::Groq);
    }

    #[test]
    fn test_bad_provider_in_config_is_error() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "ollama".into();
        let s = Session::new(cfg, Arc::new(ModelCatalog::builtin()));
        assert!(matches!(s.get_llm(), Err(AgentError::Config(_))));
    }

    #[tokio::test]
    async fn test_usage_survives_model_switch() {
        let mut s = session();
        let backend = Arc::new(MockBackend::new().with_usage().reply("一"));
        let client = LlmClient::with_backend(Provider::Anthropic, "claude-sonnet-4-5-20250929", backend, s.usage().clone());
        s = s.with_llm(client);
        s.get_llm()
            .unwrap()
            .chat("sys", &[Message::user("q")], 0.1, 64, None)
            .await
            .unwrap();

        s.set_model("gpt-4o", None).unwrap();
        s.usage()
            .lock()
            .unwrap()
            .record("gpt-4o", Some(Usage::new(10, 5)));
        assert_eq!(s.usage().lock().unwrap().calls().len(), 2);
        assert!(s.usage_summary().starts_with("2 LLM calls"));

        s.reset_usage();
        assert_eq!(s.usage_summary(), "No LLM calls made.");
    }

    #[test]
    fn test_client_builds_without_key() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mistral".into();
        cfg.llm.model = "mistral-large-latest".into();
        // 缺少 Key 时在调用时才报 MissingApiKey
        let s = Session::new(cfg, Arc::new(ModelCatalog::builtin()));
        let client = s.get_llm().unwrap();
        assert_eq!(client.provider(), Provider::Mistral);
    }

    #[test]
    fn test_tool_health_delegation() {
        let s = session();
        s.record_tool_failure("herbs.lookup", "503 service unavailable");
        s.record_tool_failure("herbs.lookup", "503 service unavailable");
        assert!(s.tool_health_suppressed_tools().contains("herbs.lookup"));
        s.record_tool_success("herbs.lookup");
        assert!(s.tool_health_suppressed_tools().is_empty());
    }
}
