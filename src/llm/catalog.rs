//! 模型目录：模型 ID → 服务商、上下文窗口、单价（美元 / 百万 token）
//!
//! 进程启动时构建一次（ModelCatalog::builtin），以 Arc 注入 Session 与 UsageTracker。
//! 目录外的模型按前缀推断服务商，未来的新模型无需更新目录即可路由。

use crate::llm::Provider;

#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub id: String,
    pub provider: Provider,
    pub display_name: String,
    pub context_window: u64,
    /// 美元 / 百万输入 token
    pub input_price: f64,
    /// 美元 / 百万输出 token
    pub output_price: f64,
    pub description: String,
}

impl ModelInfo {
    pub fn new(
        id: &str,
        provider: Provider,
        display_name: &str,
        context_window: u64,
        input_price: f64,
        output_price: f64,
        description: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            provider,
            display_name: display_name.to_string(),
            context_window,
            input_price,
            output_price,
            description: description.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub input: f64,
    pub output: f64,
}

/// 前缀 → 服务商，按顺序匹配（小写比较）
pub const PROVIDER_PREFIXES: &[(&str, Provider)] = &[
    ("claude-", Provider::Anthropic),
    ("gpt-", Provider::OpenAi),
    ("o1-", Provider::OpenAi),
    ("o3-", Provider::OpenAi),
    ("o4-", Provider::OpenAi),
    ("deepseek-", Provider::DeepSeek),
    ("kimi-", Provider::Kimi),
    ("minimax", Provider::MiniMax),
    ("qwen", Provider::Qwen),
    ("gemini-", Provider::Google),
];

/// 只读模型目录（保持注册顺序，便于列表展示）
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: Vec<ModelInfo>,
}

impl ModelCatalog {
    pub fn new(models: Vec<ModelInfo>) -> Self {
        Self { models }
    }

    pub fn builtin() -> Self {
        use Provider::*;
        let m = ModelInfo::new;
        Self::new(vec![
            m("claude-sonnet-4-5-20250929", Anthropic, "Claude Sonnet 4.5", 200_000, 3.00, 15.00, "Best balance of speed and intelligence"),
            m("claude-haiku-4-5-20251001", Anthropic, "Claude Haiku 4.5", 200_000, 0.80, 4.00, "Fastest and most affordable"),
            m("claude-opus-4-6", Anthropic, "Claude Opus 4.6", 200_000, 15.00, 75.00, "Most capable for complex research"),
            m("gpt-4o", OpenAi, "GPT-4o", 128_000, 2.50, 10.00, "High-intelligence flagship model"),
            m("gpt-4o-mini", OpenAi, "GPT-4o Mini", 128_000, 0.15, 0.60, "Fast and affordable small model"),
            m("o3-mini", OpenAi, "o3-mini", 200_000, 1.10, 4.40, "Reasoning model, good for analysis"),
            m("gpt-4.1", OpenAi, "GPT-4.1", 1_047_576, 2.00, 8.00, "Latest flagship with 1M context"),
            m("gpt-4.1-mini", OpenAi, "GPT-4.1 Mini", 1_047_576, 0.40, 1.60, "Balanced speed and intelligence"),
            m("gpt-4.1-nano", OpenAi, "GPT-4.1 Nano", 1_047_576, 0.10, 0.40, "Fastest, most cost-effective"),
            m("deepseek-v3.2", DeepSeek, "DeepSeek V3.2", 128_000, 0.00, 0.00, "Latest general model"),
            m("deepseek-r1", DeepSeek, "DeepSeek R1", 128_000, 0.00, 0.00, "Reasoning model"),
            m("kimi-k2.5", Kimi, "Kimi K2.5", 200_000, 0.00, 0.00, "Flagship Kimi model"),
            m("minimax-m2.5", MiniMax, "MiniMax M2.5", 200_000, 0.00, 0.00, "Flagship MiniMax model"),
            m("qwen3-max", Qwen, "Qwen3-Max", 1_000_000, 0.00, 0.00, "Flagship Qwen model"),
            m("qwen-plus", Qwen, "Qwen-Plus", 200_000, 0.00, 0.00, "Balanced speed/cost"),
            m("gemini-2.5-pro", Google, "Gemini 2.5 Pro", 1_048_576, 1.25, 10.00, "Most capable Gemini, best for complex reasoning"),
            m("gemini-2.5-flash", Google, "Gemini 2.5 Flash", 1_048_576, 0.15, 0.60, "Fast mid-size multimodal model"),
            m("gemini-2.5-flash-lite", Google, "Gemini 2.5 Flash-Lite", 1_048_576, 0.075, 0.30, "Cost-efficient Gemini 2.5 model"),
            m("gemini-2.0-flash", Google, "Gemini 2.0 Flash", 1_048_576, 0.10, 0.40, "Fast, versatile next-gen multimodal model"),
            m("gemini-2.0-flash-lite", Google, "Gemini 2.0 Flash-Lite", 1_048_576, 0.075, 0.30, "Most cost-efficient Gemini 2.0 model"),
            m("gemini-3-pro-preview", Google, "Gemini 3 Pro Preview", 1_048_576, 0.00, 0.00, "Frontier Gemini 3 Pro, early access"),
            m("gemini-3-flash-preview", Google, "Gemini 3 Flash Preview", 1_048_576, 0.00, 0.00, "Frontier Gemini 3 Flash, early access"),
            m("gemini-pro-latest", Google, "Gemini Pro Latest", 1_048_576, 0.00, 0.00, "Alias to latest stable Gemini Pro"),
            m("gemini-flash-latest", Google, "Gemini Flash Latest", 1_048_576, 0.00, 0.00, "Alias to latest stable Gemini Flash"),
        ])
    }

    pub fn get(&self, id: &str) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// 目录优先，其次前缀匹配；都不命中返回 None
    pub fn resolve_provider(&self, model: &str) -> Option<Provider> {
        if let Some(info) = self.get(model) {
            return Some(info.provider);
        }
        let lower = model.to_lowercase();
        PROVIDER_PREFIXES
            .iter()
            .find(|(prefix, _)| lower.starts_with(prefix))
            .map(|(_, provider)| *provider)
    }

    pub fn list(&self, provider: Option<Provider>) -> Vec<&ModelInfo> {
        self.models
            .iter()
            .filter(|m| provider.map_or(true, |p| m.provider == p))
            .collect()
    }

    pub fn pricing(&self, model: &str) -> Option<Pricing> {
        self.get(model).map(|m| Pricing {
            input: m.input_price,
            output: m.output_price,
        })
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
