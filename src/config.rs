//! 应用配置：从 config/default.toml、~/.tcm/config.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TCM__*` 覆盖（双下划线表示嵌套，如 `TCM__LLM__PROVIDER=openai`）。
//! 数值型 agent 配置以有符号整数读入，经访问器按下限修正后再使用，避免 0 或负数破坏时间窗口逻辑。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::ToolHealthPolicy;
use crate::core::AgentError;
use crate::llm::{ModelCatalog, Provider};

pub const LANGUAGES: [&str; 3] = ["en", "zh", "bi"];

/// 应用配置根（对应 TOML 的顶层）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub ui: UiSection,
}

/// [llm] 段：服务商、模型与各服务商凭据
///
/// 采样温度不可配置：规划与综合各用固定温度。旧配置里的 temperature 键在加载时被忽略。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub provider: String,
    pub model: String,
    /// 服务商 → API Key；缺失时回退到服务商环境变量
    pub api_keys: BTreeMap<String, String>,
    /// 服务商 → base_url 覆盖
    pub base_urls: BTreeMap<String, String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "anthropic".into(),
            model: "claude-sonnet-4-5-20250929".into(),
            api_keys: BTreeMap::new(),
            base_urls: BTreeMap::new(),
        }
    }
}

/// [agent] 段：执行器重试、单步超时、综合输出长度与工具健康度
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 每步总尝试次数（含首次）
    pub executor_max_retries: i64,
    pub step_timeout_secs: i64,
    pub synthesis_max_tokens: i64,
    pub planner_max_tokens: i64,
    pub tool_health_enabled: bool,
    pub tool_health_fail_threshold: i64,
    pub tool_health_failure_window_s: i64,
    pub tool_health_suppress_seconds: i64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            executor_max_retries: 2,
            step_timeout_secs: 30,
            synthesis_max_tokens: 8192,
            planner_max_tokens: 2048,
            tool_health_enabled: true,
            tool_health_fail_threshold: 2,
            tool_health_failure_window_s: 1800,
            tool_health_suppress_seconds: 900,
        }
    }
}

/// [ui] 段：回答语言 en / zh / bi（双语）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiSection {
    pub language: String,
}

impl Default for UiSection {
    fn default() -> Self {
        Self {
            language: "en".into(),
        }
    }
}

fn floor_u32(value: i64, min: u32) -> u32 {
    value.clamp(min as i64, u32::MAX as i64) as u32
}

impl AppConfig {
    pub fn executor_attempts(&self) -> u32 {
        floor_u32(self.agent.executor_max_retries, 1)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(floor_u32(self.agent.step_timeout_secs, 1) as u64)
    }

    pub fn synthesis_max_tokens(&self) -> u32 {
        floor_u32(self.agent.synthesis_max_tokens, 1)
    }

    pub fn planner_max_tokens(&self) -> u32 {
        floor_u32(self.agent.planner_max_tokens, 1)
    }

    pub fn tool_health_policy(&self) -> ToolHealthPolicy {
        ToolHealthPolicy::from_raw(
            self.agent.tool_health_enabled,
            self.agent.tool_health_fail_threshold,
            self.agent.tool_health_failure_window_s,
            self.agent.tool_health_suppress_seconds,
        )
    }

    pub fn provider(&self) -> Result<Provider, AgentError> {
        self.llm
            .provider
            .parse()
            .map_err(|e: crate::llm::LlmError| AgentError::Config(e.to_string()))
    }

    /// 配置文件优先，其次服务商环境变量；空字符串视为未设置
    pub fn llm_api_key(&self, provider: Provider) -> Option<String> {
        self.llm
            .api_keys
            .get(provider.as_str())
            .filter(|k| !k.trim().is_empty())
            .cloned()
            .or_else(|| {
                std::env::var(provider.api_key_env())
                    .ok()
                    .filter(|k| !k.trim().is_empty())
            })
    }

    pub fn set_api_key(&mut self, provider: Provider, key: &str) {
        self.llm
            .api_keys
            .insert(provider.as_str().to_string(), key.trim().to_string());
    }

    pub fn base_url(&self, provider: Provider) -> Option<String> {
        self.llm.base_urls.get(provider.as_str()).cloned()
    }

    /// `tcm config set <key> <value>`：按键校验并写入
    ///
    /// 设置 llm.model 时顺带推断并更新 llm.provider；目录外的模型仅告警。
    pub fn set(&mut self, key: &str, value: &str, catalog: &ModelCatalog) -> Result<(), AgentError> {
        let value = value.trim();
        match key {
            "llm.provider" => {
                let provider: Provider = value.parse().map_err(|_| {
                    AgentError::Config(format!(
                        "Invalid provider '{value}'. Valid: {}",
                        Provider::ALL.map(|p| p.as_str()).join(", ")
                    ))
                })?;
                self.llm.provider = provider.as_str().to_string();
            }
            "llm.model" => {
                if let Some(provider) = catalog.resolve_provider(value) {
                    self.llm.provider = provider.as_str().to_string();
                }
                if !catalog.contains(value) {
                    tracing::warn!(
                        model = value,
                        "model is not in the catalog, it may still work if the provider supports it"
                    );
                }
                self.llm.model = value.to_string();
            }
            "ui.language" => {
                let lang = value.to_lowercase();
                if !LANGUAGES.contains(&lang.as_str()) {
                    return Err(AgentError::Config("ui.language must be one of: en, zh, bi".into()));
                }
                self.ui.language = lang;
            }
            "agent.tool_health_enabled" => self.agent.tool_health_enabled = parse_value(key, value)?,
            "agent.executor_max_retries" => self.agent.executor_max_retries = parse_value(key, value)?,
            "agent.step_timeout_secs" => self.agent.step_timeout_secs = parse_value(key, value)?,
            "agent.synthesis_max_tokens" => self.agent.synthesis_max_tokens = parse_value(key, value)?,
            "agent.planner_max_tokens" => self.agent.planner_max_tokens = parse_value(key, value)?,
            "agent.tool_health_fail_threshold" => {
                self.agent.tool_health_fail_threshold = parse_value(key, value)?
            }
            "agent.tool_health_failure_window_s" => {
                self.agent.tool_health_failure_window_s = parse_value(key, value)?
            }
            "agent.tool_health_suppress_seconds" => {
                self.agent.tool_health_suppress_seconds = parse_value(key, value)?
            }
            other => {
                if let Some(provider) = other.strip_prefix("llm.base_urls.") {
                    let provider: Provider = provider
                        .parse()
                        .map_err(|e: crate::llm::LlmError| AgentError::Config(e.to_string()))?;
                    self.llm
                        .base_urls
                        .insert(provider.as_str().to_string(), value.to_string());
                } else {
                    return Err(AgentError::Config(format!("Unknown config key '{other}'")));
                }
            }
        }
        Ok(())
    }

    /// 返回人类可读的问题列表；为空表示配置可用
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.provider().is_err() {
            issues.push(format!(
                "Unknown llm.provider '{}' (valid: {})",
                self.llm.provider,
                Provider::ALL.map(|p| p.as_str()).join(", ")
            ));
        }
        if self.llm.model.trim().is_empty() {
            issues.push("llm.model is empty".into());
        }
        if !LANGUAGES.contains(&self.ui.language.as_str()) {
            issues.push(format!(
                "ui.language '{}' must be one of: en, zh, bi",
                self.ui.language
            ));
        }
        for name in self.llm.api_keys.keys().chain(self.llm.base_urls.keys()) {
            if name.parse::<Provider>().is_err() {
                issues.push(format!("Unknown provider '{name}' in [llm] tables (possible typo)"));
            }
        }
        issues
    }

    /// 用于 `tcm config show`：API Key 打码
    pub fn masked(&self) -> AppConfig {
        let mut shown = self.clone();
        for key in shown.llm.api_keys.values_mut() {
            *key = mask_key(key);
        }
        shown
    }

    pub fn to_toml(&self) -> Result<String, AgentError> {
        toml::to_string_pretty(self).map_err(|e| AgentError::Config(e.to_string()))
    }

    pub fn save_to(&self, path: &Path) -> Result<(), AgentError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AgentError::Config(format!("{}: {e}", parent.display())))?;
        }
        std::fs::write(path, self.to_toml()?)
            .map_err(|e| AgentError::Config(format!("{}: {e}", path.display())))
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, AgentError> {
    value
        .parse()
        .map_err(|_| AgentError::Config(format!("Invalid value '{value}' for '{key}'")))
}

pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 11 {
        let head: String = chars[..7].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "***".into()
    }
}

/// 用户级配置文件：~/.tcm/config.toml
pub fn default_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".tcm").join("config.toml"))
}

/// 加载配置，环境变量 TCM__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 用户级 ~/.tcm/config.toml（存在时）
/// 3. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 4. 最后叠加环境变量 TCM__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(user) = default_config_path().filter(|p| p.exists()) {
        builder = builder.add_source(config::File::from(user).required(false));
    }

    if let Some(path) = config_path.filter(|p| p.exists()) {
        builder = builder.add_source(config::File::from(path).required(false));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TCM")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

/// 只读取单个文件（不叠加默认文件与环境变量），供修改后写回；文件不存在时返回默认值
pub fn load_file(path: &Path) -> Result<AppConfig, config::ConfigError> {
    config::Config::builder()
        .add_source(config::File::from(path.to_path_buf()).required(false))
        .build()?
        .try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.provider().unwrap(), Provider::Anthropic);
        assert_eq!(cfg.executor_attempts(), 2);
        assert_eq!(cfg.synthesis_max_tokens(), 8192);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn test_floors_guard_misconfiguration() {
        let mut cfg = AppConfig::default();
        cfg.agent.executor_max_retries = 0;
        cfg.agent.step_timeout_secs = -5;
        cfg.agent.tool_health_fail_threshold = 0;
        cfg.agent.tool_health_failure_window_s = -1;
        cfg.agent.tool_health_suppress_seconds = 10;
        assert_eq!(cfg.executor_attempts(), 1);
        assert_eq!(cfg.step_timeout(), Duration::from_secs(1));
        let policy = cfg.tool_health_policy();
        assert_eq!(policy.fail_threshold, 1);
        assert_eq!(policy.failure_window, Duration::from_secs(60));
        assert_eq!(policy.suppress_for, Duration::from_secs(60));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[llm]
provider = "openai"
model = "gpt-4o"

[llm.api_keys]
openai = "sk-from-file"

[agent]
executor_max_retries = 3
tool_health_enabled = false

[ui]
language = "zh"
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.provider().unwrap(), Provider::OpenAi);
        assert_eq!(cfg.executor_attempts(), 3);
        assert!(!cfg.agent.tool_health_enabled);
        assert_eq!(cfg.ui.language, "zh");
        assert_eq!(cfg.llm_api_key(Provider::OpenAi).as_deref(), Some("sk-from-file"));
        // 未写入文件的键保持默认
        assert_eq!(cfg.agent.tool_health_suppress_seconds, 900);
    }

    #[test]
    fn test_set_model_updates_provider() {
        let catalog = ModelCatalog::builtin();
        let mut cfg = AppConfig::default();
        cfg.set("llm.model", "gemini-2.5-pro", &catalog).unwrap();
        assert_eq!(cfg.llm.provider, "google");

        cfg.set("llm.model", "deepseek-coder-next", &catalog).unwrap();
        assert_eq!(cfg.llm.provider, "deepseek");

        assert!(cfg.set("llm.provider", "ollama", &catalog).is_err());
        assert!(cfg.set("ui.language", "fr", &catalog).is_err());
        assert!(cfg.set("agent.executor_max_retries", "many", &catalog).is_err());
        assert!(cfg.set("data.tcmsp", "/tmp", &catalog).is_err());

        cfg.set("ui.language", " ZH ", &catalog).unwrap();
        assert_eq!(cfg.ui.language, "zh");
    }

    #[test]
    fn test_validate_reports_issues() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "ollama".into();
        cfg.ui.language = "fr".into();
        cfg.llm.api_keys.insert("opneai".into(), "sk".into());
        let issues = cfg.validate();
        assert_eq!(issues.len(), 3);
    }

    #[test]
    fn test_save_roundtrip_and_mask() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = AppConfig::default();
        cfg.set_api_key(Provider::Anthropic, "sk-ant-1234567890abcd");
        cfg.save_to(&path).unwrap();

        let loaded = load_config(Some(path)).unwrap();
        assert_eq!(
            loaded.llm.api_keys.get("anthropic").map(String::as_str),
            Some("sk-ant-1234567890abcd")
        );
        assert_eq!(loaded.masked().llm.api_keys["anthropic"], "sk-ant-...abcd");
        assert_eq!(mask_key("short"), "***");
    }

    #[test]
    fn test_temperature_is_not_a_setting() {
        let catalog = ModelCatalog::builtin();
        let mut cfg = AppConfig::default();
        let err = cfg.set("llm.temperature", "0.7", &catalog).unwrap_err();
        assert!(err.to_string().contains("Unknown config key 'llm.temperature'"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.toml");
        std::fs::write(&path, "[llm]\nprovider = \"qwen\"\ntemperature = 0.7\n").unwrap();
        let loaded = load_file(&path).unwrap();
        assert_eq!(loaded.llm.provider, "qwen");
        assert!(!loaded.to_toml().unwrap().contains("temperature"));
    }

    #[test]
    fn test_load_file_ignores_env_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.llm.provider, "anthropic");
        assert!(cfg.llm.api_keys.is_empty());
    }
}
