//! Agent 错误类型
//!
//! 计划执行本身不向外抛错（每步失败都落入 StepResult）；AgentError 只出现在
//! Planner / Synthesizer 调 LLM、Session 构建客户端与配置读取等边界上。

use thiserror::Error;

use crate::llm::LlmError;

/// Agent 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Tool '{0}' not found.")]
    ToolNotFound(String),

    #[error("Tool '{name}' timed out after {secs}s")]
    ToolTimeout { name: String, secs: u64 },

    #[error("Plan parse error: {0}")]
    PlanParse(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Config error: {0}")]
    Config(String),
}

impl AgentError {
    /// 是否为认证失败（供 CLI 触发「重新设置 API Key」提示）
    pub fn is_authentication(&self) -> bool {
        match self {
            AgentError::Llm(e) => e.is_authentication(),
            _ => false,
        }
    }
}
