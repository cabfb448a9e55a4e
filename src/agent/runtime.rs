//! 研究问答运行时：规划 → 执行 → 综合
//!
//! CLI 的一次提问对应一次 ask；过程事件可通过 mpsc 推送给前端实时展示。
//! 计划与步骤结果只在本次调用内存活，不做持久化。

use std::sync::Arc;

use futures_util::StreamExt;

use crate::agent::events::{emit, AgentEvent, EventSender};
use crate::agent::executor::PlanExecutor;
use crate::agent::plan::{Plan, StepResult};
use crate::agent::planner::create_plan;
use crate::agent::session::Session;
use crate::agent::synthesizer::synthesize_stream;
use crate::core::AgentError;
use crate::tools::ToolRegistry;

/// 一次提问的完整产物
#[derive(Debug, Clone)]
pub struct Answer {
    pub plan: Plan,
    pub results: Vec<StepResult>,
    pub text: String,
}

pub struct ResearchAgent {
    session: Session,
    registry: Arc<ToolRegistry>,
}

impl ResearchAgent {
    pub fn new(session: Session, registry: Arc<ToolRegistry>) -> Self {
        Self { session, registry }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub async fn ask(&self, query: &str) -> Result<Answer, AgentError> {
        self.ask_with_events(query, None, None).await
    }

    /// 处理单个问题；user_context 追加到规划提示词末尾
    pub async fn ask_with_events(
        &self,
        query: &str,
        user_context: Option<&str>,
        events: Option<&EventSender>,
    ) -> Result<Answer, AgentError> {
        emit(events, AgentEvent::Planning);
        let plan = create_plan(&self.session, &self.registry, query, user_context).await?;
        emit(
            events,
            AgentEvent::PlanReady {
                reasoning: plan.reasoning.clone(),
                steps: plan.steps.len(),
            },
        );

        let executor = PlanExecutor::from_config(self.registry.clone(), self.session.config());
        let results = executor
            .execute_with_events(&self.session, &plan, events)
            .await;
        let failed = results.iter().filter(|r| !r.is_success()).count();
        tracing::info!(session = %self.session.id(), steps = results.len(), failed, "plan executed");

        emit(events, AgentEvent::Synthesizing);
        let mut stream = synthesize_stream(&self.session, query, &plan, &results).await?;
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            emit(events, AgentEvent::AnswerChunk { text: chunk.clone() });
            text.push_str(&chunk);
        }
        emit(events, AgentEvent::AnswerDone);

        Ok(Answer { plan, results, text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::core::MockClock;
    use crate::llm::{LlmClient, LlmError, MockBackend, ModelCatalog, Provider};
    use crate::tools::builtin_registry;

    fn agent(backend: Arc<MockBackend>) -> ResearchAgent {
        let session = Session::with_clock(
            AppConfig::default(),
            Arc::new(ModelCatalog::builtin()),
            Arc::new(MockClock::new()),
        );
        let client = LlmClient::with_backend(
            Provider::Anthropic,
            "claude-sonnet-4-5-20250929",
            backend,
            session.usage().clone(),
        )
        .with_clock(session.clock().clone());
        ResearchAgent::new(session.with_llm(client), Arc::new(builtin_registry()))
    }

    #[tokio::test]
    async fn test_ask_plans_executes_and_synthesizes() {
        let backend = Arc::new(
            MockBackend::new()
                .with_usage()
                .reply(r#"```json
{"reasoning": "look up then check", "steps": [
  {"step": 1, "tool": "herbs.lookup", "parameters": {"query": "黄芪"}, "purpose": "basics"},
  {"step": 2, "tool": "safety.pregnancy_check", "parameters": {"herbs": "$step1.output.herb.chinese_name"}, "purpose": "safety"}
]}
```"#)
                .reply("Huang Qi tonifies qi"),
        );
        let agent = agent(backend.clone());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let answer = agent
            .ask_with_events("Is 黄芪 safe in pregnancy?", None, Some(&tx))
            .await
            .unwrap();
        drop(tx);

        assert_eq!(answer.results.len(), 2);
        assert!(answer.results.iter().all(|r| r.is_success()));
        assert_eq!(answer.results[1].output.as_ref().unwrap()["safe"], serde_json::json!(["黄芪"]));
        assert_eq!(answer.text, "Huang Qi tonifies qi");
        assert_eq!(agent.session().usage().lock().unwrap().calls().len(), 2);

        let mut events = Vec::new();
        while let Some(e) = rx.recv().await {
            events.push(e);
        }
        assert_eq!(events.first(), Some(&AgentEvent::Planning));
        assert_eq!(events.last(), Some(&AgentEvent::AnswerDone));
    }

    #[tokio::test]
    async fn test_direct_plan_needs_one_llm_call() {
        let backend = Arc::new(MockBackend::new().reply(r#"{"reasoning": "黄芪甘温", "steps": []}"#));
        let answer = agent(backend.clone()).ask("黄芪性味？").await.unwrap();
        assert_eq!(answer.text, "黄芪甘温");
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_auth_error_propagates_typed() {
        let backend = Arc::new(
            MockBackend::new().fail(LlmError::from_status("anthropic", 401, "invalid x-api-key")),
        );
        let err = agent(backend).ask("q").await.unwrap_err();
        assert!(err.is_authentication());
    }
}
