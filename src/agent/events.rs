//! 研究流程事件：供 CLI 实时展示规划、步骤执行与回答流

use serde::Serialize;
use tokio::sync::mpsc;

use crate::agent::plan::StepStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// 正在调用 LLM 生成计划
    Planning,
    /// 计划已生成
    PlanReady { reasoning: String, steps: usize },
    StepStarted {
        step: u32,
        tool: String,
        purpose: String,
    },
    /// 某次尝试失败，稍后以相同参数重试
    StepRetry {
        step: u32,
        tool: String,
        attempt: u32,
        error: String,
    },
    StepFinished {
        step: u32,
        tool: String,
        status: StepStatus,
    },
    /// 开始综合回答
    Synthesizing,
    /// 回答的一小段（流式输出）
    AnswerChunk { text: String },
    AnswerDone,
}

pub type EventSender = mpsc::UnboundedSender<AgentEvent>;

/// 发送事件；接收端已关闭时静默丢弃
pub(crate) fn emit(events: Option<&EventSender>, event: AgentEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}
