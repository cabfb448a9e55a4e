//! Token 用量与成本统计
//!
//! 只追加：每次 LLM 调用记一条；成本按模型目录单价估算，目录外模型成本为 0。

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::llm::ModelCatalog;

/// 单次调用的 token 数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// 合并流式事件中的用量快照：逐字段取最大值
    pub fn merge_max(self, other: Usage) -> Usage {
        Usage {
            input_tokens: self.input_tokens.max(other.input_tokens),
            output_tokens: self.output_tokens.max(other.output_tokens),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
}

/// Session 内共享的用量统计（LLM 客户端重建后继续累计）
pub type SharedUsage = Arc<Mutex<UsageTracker>>;

#[derive(Debug, Clone)]
pub struct UsageTracker {
    catalog: Arc<ModelCatalog>,
    calls: Vec<UsageRecord>,
}

impl UsageTracker {
    pub fn new(catalog: Arc<ModelCatalog>) -> Self {
        Self {
            catalog,
            calls: Vec::new(),
        }
    }

    pub fn shared(catalog: Arc<ModelCatalog>) -> SharedUsage {
        Arc::new(Mutex::new(Self::new(catalog)))
    }

    /// 记录一次调用；usage 缺失时不记
    pub fn record(&mut self, model: &str, usage: Option<Usage>) {
        let Some(usage) = usage else {
            return;
        };
        let cost = self.estimate_cost(model, usage);
        self.calls.push(UsageRecord {
            model: model.to_string(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost,
        });
    }

    fn estimate_cost(&self, model: &str, usage: Usage) -> f64 {
        match self.catalog.pricing(model) {
            Some(price) => {
                (usage.input_tokens as f64 / 1_000_000.0) * price.input
                    + (usage.output_tokens as f64 / 1_000_000.0) * price.output
            }
            None => 0.0,
        }
    }

    pub fn calls(&self) -> &[UsageRecord] {
        &self.calls
    }

    pub fn total_input_tokens(&self) -> u64 {
        self.calls.iter().map(|c| c.input_tokens).sum()
    }

    pub fn total_output_tokens(&self) -> u64 {
        self.calls.iter().map(|c| c.output_tokens).sum()
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_input_tokens() + self.total_output_tokens()
    }

    pub fn total_cost(&self) -> f64 {
        self.calls.iter().map(|c| c.cost).sum()
    }

    /// 一行摘要，如 `2 LLM calls | 1,200 in + 300 out tokens | $0.0081 | models: gpt-4o`
    pub fn summary(&self) -> String {
        if self.calls.is_empty() {
            return "No LLM calls made.".to_string();
        }
        let mut models: Vec<&str> = Vec::new();
        for call in &self.calls {
            if !models.contains(&call.model.as_str()) {
                models.push(&call.model);
            }
        }
        format!(
            "{} LLM calls | {} in + {} out tokens | ${:.4} | models: {}",
            self.calls.len(),
            group_thousands(self.total_input_tokens()),
            group_thousands(self.total_output_tokens()),
            self.total_cost(),
            models.join(", ")
        )
    }

    /// 仅用于用户主动重置会话
    pub fn reset(&mut self) {
        self.calls.clear();
    }
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> UsageTracker {
        UsageTracker::new(Arc::new(ModelCatalog::builtin()))
    }

    #[test]
    fn test_cost_from_price_table() {
        let mut usage = tracker();
        usage.record("gpt-4o", Some(Usage::new(1_000_000, 0)));
        assert!((usage.total_cost() - 2.50).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_model_costs_nothing() {
        let mut usage = tracker();
        usage.record("my-local-model", Some(Usage::new(5_000, 5_000)));
        assert_eq!(usage.calls().len(), 1);
        assert_eq!(usage.total_cost(), 0.0);
        assert_eq!(usage.total_tokens(), 10_000);
    }

    #[test]
    fn test_absent_usage_is_noop() {
        let mut usage = tracker();
        usage.record("gpt-4o", None);
        assert!(usage.calls().is_empty());
        assert_eq!(usage.summary(), "No LLM calls made.");
    }

    #[test]
    fn test_summary_and_reset() {
        let mut usage = tracker();
        usage.record("gpt-4o", Some(Usage::new(1_200, 300)));
        usage.record("claude-opus-4-6", Some(Usage::new(1_000, 0)));
        let summary = usage.summary();
        assert!(summary.starts_with("2 LLM calls | 2,200 in + 300 out tokens"));
        assert!(summary.ends_with("models: gpt-4o, claude-opus-4-6"));

        usage.reset();
        assert!(usage.calls().is_empty());
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1_000_000), "1,000,000");
    }
}
