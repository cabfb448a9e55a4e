//! `tcm doctor`：环境与配置自检

use std::fmt;

use crate::config::AppConfig;
use crate::llm::ModelCatalog;
use crate::tools::ToolRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    Info,
    Warn,
    Error,
}

impl CheckStatus {
    fn icon(&self) -> &'static str {
        match self {
            CheckStatus::Ok => "✓",
            CheckStatus::Info => "○",
            CheckStatus::Warn => "⚠",
            CheckStatus::Error => "✗",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

impl Check {
    fn new(name: impl Into<String>, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:<24} {}", self.status.icon(), self.name, self.detail)
    }
}

pub fn run_checks(config: &AppConfig, registry: &ToolRegistry, catalog: &ModelCatalog) -> Vec<Check> {
    let mut checks = Vec::new();

    let issues = config.validate();
    if issues.is_empty() {
        checks.push(Check::new("Configuration", CheckStatus::Ok, "valid"));
    } else {
        for issue in issues {
            checks.push(Check::new("Configuration", CheckStatus::Error, issue));
        }
    }

    match config.provider() {
        Ok(provider) => {
            let key = config.llm_api_key(provider);
            checks.push(Check::new(
                format!("{} API key", provider.label()),
                if key.is_some() { CheckStatus::Ok } else { CheckStatus::Error },
                match key {
                    Some(_) => "configured".to_string(),
                    None => format!(
                        "missing, run `tcm keys set {provider} <key>` or set {}",
                        provider.api_key_env()
                    ),
                },
            ));
        }
        Err(_) => checks.push(Check::new(
            "API key",
            CheckStatus::Error,
            "cannot check without a valid llm.provider",
        )),
    }

    let model = config.llm.model.as_str();
    checks.push(if catalog.contains(model) {
        Check::new("Model", CheckStatus::Ok, format!("{model} (in catalog)"))
    } else {
        Check::new(
            "Model",
            CheckStatus::Warn,
            format!("{model} is not in the catalog, cost tracking reports $0"),
        )
    });

    checks.push(if registry.is_empty() {
        Check::new("Tool modules", CheckStatus::Error, "no tools registered")
    } else {
        Check::new(
            "Tool modules",
            CheckStatus::Ok,
            format!(
                "{} tools loaded in {} categories",
                registry.len(),
                registry.categories().len()
            ),
        )
    });

    let policy = config.tool_health_policy();
    checks.push(Check::new(
        "Tool health tracking",
        CheckStatus::Info,
        if policy.enabled {
            format!(
                "enabled (threshold {}, window {}s, suppress {}s)",
                policy.fail_threshold,
                policy.failure_window.as_secs(),
                policy.suppress_for.as_secs()
            )
        } else {
            "disabled".to_string()
        },
    ));

    checks
}

pub fn has_errors(checks: &[Check]) -> bool {
    checks.iter().any(|c| c.status == CheckStatus::Error)
}
