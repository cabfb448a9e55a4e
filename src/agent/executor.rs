//! 计划执行器
//!
//! 按计划顺序逐步执行，不因前面步骤失败而中断：
//! 1. 工具不存在：直接记为错误，不调用也不重试
//! 2. 用已有结果解析 `$stepN` 引用（每步只解析一次，重试沿用同一组参数）
//! 3. 调用工具（带单步超时）；失败时记入工具健康度，尚有次数则固定间隔后重试
//! 4. 成功时清空该工具的健康度记录
//!
//! 每步失败都写入 StepResult，执行本身不返回错误。

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::agent::events::{emit, AgentEvent, EventSender};
use crate::agent::plan::{Plan, Step, StepResult};
use crate::agent::reference::resolve_params;
use crate::agent::session::Session;
use crate::config::AppConfig;
use crate::core::AgentError;
use crate::tools::{Tool, ToolExecutor, ToolRegistry};

/// 重试间隔（固定）
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct PlanExecutor {
    registry: Arc<ToolRegistry>,
    invoker: ToolExecutor,
    max_attempts: u32,
    retry_delay: Duration,
}

impl PlanExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            invoker: ToolExecutor::default(),
            max_attempts: 2,
            retry_delay: RETRY_DELAY,
        }
    }

    /// 从 [agent] 配置读取总尝试次数与单步超时
    pub fn from_config(registry: Arc<ToolRegistry>, config: &AppConfig) -> Self {
        Self::new(registry)
            .with_max_attempts(config.executor_attempts())
            .with_step_timeout(config.step_timeout())
    }

    /// 总尝试次数（含首次），至少 1
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.invoker = ToolExecutor::new(timeout);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn execute(&self, session: &Session, plan: &Plan) -> Vec<StepResult> {
        self.execute_with_events(session, plan, None).await
    }

    /// 执行计划，每个输入步骤恰好对应一个结果且顺序一致
    pub async fn execute_with_events(
        &self,
        session: &Session,
        plan: &Plan,
        events: Option<&EventSender>,
    ) -> Vec<StepResult> {
        if plan.is_direct() {
            return vec![StepResult::direct(&plan.reasoning)];
        }

        let mut results: Vec<StepResult> = Vec::with_capacity(plan.steps.len());
        for (index, step) in plan.steps.iter().enumerate() {
            let number = step.step.unwrap_or(index as u32 + 1);
            emit(
                events,
                AgentEvent::StepStarted {
                    step: number,
                    tool: step.tool.clone(),
                    purpose: step.purpose.clone(),
                },
            );
            let result = self.run_step(session, number, step, &results, events).await;
            emit(
                events,
                AgentEvent::StepFinished {
                    step: number,
                    tool: step.tool.clone(),
                    status: result.status,
                },
            );
            results.push(result);
        }
        results
    }

    async fn run_step(
        &self,
        session: &Session,
        number: u32,
        step: &Step,
        previous: &[StepResult],
        events: Option<&EventSender>,
    ) -> StepResult {
        let Some(tool) = self.registry.get(&step.tool) else {
            tracing::warn!(step = number, tool = %step.tool, "unknown tool in plan");
            return StepResult::error(
                number,
                &step.tool,
                &step.purpose,
                AgentError::ToolNotFound(step.tool.clone()).to_string(),
            );
        };

        let params = Value::Object(resolve_params(&step.parameters, previous));
        match self
            .invoke_with_retry(session, number, tool.as_ref(), params, events)
            .await
        {
            Ok(output) => StepResult::success(number, &step.tool, &step.purpose, output),
            Err(error) => StepResult::error(number, &step.tool, &step.purpose, error),
        }
    }

    async fn invoke_with_retry(
        &self,
        session: &Session,
        number: u32,
        tool: &dyn Tool,
        params: Value,
        events: Option<&EventSender>,
    ) -> Result<Value, String> {
        let mut attempt = 1;
        loop {
            match self.invoker.invoke(tool, params.clone()).await {
                Ok(output) => {
                    session.record_tool_success(tool.name());
                    return Ok(output);
                }
                Err(error) => {
                    tracing::warn!(
                        tool = tool.name(),
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %error,
                        "tool failed"
                    );
                    session.record_tool_failure(tool.name(), &error);
                    if attempt >= self.max_attempts {
                        return Err(error);
                    }
                    emit(
                        events,
                        AgentEvent::StepRetry {
                            step: number,
                            tool: tool.name().to_string(),
                            attempt,
                            error,
                        },
                    );
                    session.clock().sleep(self.retry_delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// 按会话配置执行计划
pub async fn execute_plan(session: &Session, registry: Arc<ToolRegistry>, plan: &Plan) -> Vec<StepResult> {
    PlanExecutor::from_config(registry, session.config())
        .execute(session, plan)
        .await
}
