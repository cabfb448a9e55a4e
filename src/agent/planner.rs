//! 规划器：把用户问题与工具目录交给 LLM，得到有序的工具调用计划
//!
//! 被屏蔽的工具不出现在目录中。parse_plan 从回复中提取 JSON（```json 代码块、普通代码块或首尾花括号）；
//! 缺少 steps 视为直接回答，无法解析时以原文作为 reasoning 返回零步骤计划。

use serde_json::Value;

use crate::agent::plan::Plan;
use crate::agent::session::Session;
use crate::core::AgentError;
use crate::llm::Message;
use crate::tools::ToolRegistry;

pub const PLANNER_TEMPERATURE: f32 = 0.1;

pub const PLANNER_SYSTEM: &str = r#"You are an expert Traditional Chinese Medicine (TCM) research assistant.
You have access to a set of computational tools for TCM research.

Given a user's research question, create a step-by-step execution plan.

RULES:
1. Select only the tools needed to answer the question.
2. Order steps logically. Later steps can depend on earlier results.
3. Each step must specify exactly one tool and its parameters.
4. Be conservative. Only include steps that directly help answer the question.
5. If the question is simple and can be answered with 1-2 tools, keep the plan short.
6. To pass an earlier result into a later step, use a string parameter like "$step1.output.field".
7. If no tool is needed, return an empty "steps" list and put the answer in "reasoning".

OUTPUT FORMAT (strict JSON):
{
  "reasoning": "Brief explanation of your approach",
  "steps": [
    {
      "step": 1,
      "tool": "category.tool_name",
      "parameters": {"param1": "value1"},
      "purpose": "Why this step is needed"
    }
  ]
}

AVAILABLE TOOLS:
"#;

/// 生成计划；LLM 调用失败时返回错误，解析失败不算错误
pub async fn create_plan(
    session: &Session,
    registry: &ToolRegistry,
    query: &str,
    user_context: Option<&str>,
) -> Result<Plan, AgentError> {
    let suppressed = session.tool_health_suppressed_tools();
    if !suppressed.is_empty() {
        tracing::info!(suppressed = ?suppressed, "excluding suppressed tools from planning");
    }
    let mut system = format!("{PLANNER_SYSTEM}{}", registry.describe_for_planner(&suppressed));
    if let Some(ctx) = user_context.filter(|c| !c.trim().is_empty()) {
        system.push_str("\n\nUSER CONTEXT:\n");
        system.push_str(ctx);
    }

    let llm = session.get_llm()?;
    let response = llm
        .chat(
            &system,
            &[Message::user(query)],
            PLANNER_TEMPERATURE,
            session.config().planner_max_tokens(),
            None,
        )
        .await?;

    let plan = parse_plan(&response.content);
    tracing::info!(steps = plan.steps.len(), raw = plan.raw_response, "plan created");
    Ok(plan)
}

/// 提取回复中的 JSON 文本
fn extract_json(content: &str) -> &str {
    let trimmed = content.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return rest.find("```").map_or(rest, |end| &rest[..end]).trim();
    }
    if let Some(start) = trimmed.find("```") {
        let rest = &trimmed[start + 3..];
        return rest.find("```").map_or(rest, |end| &rest[..end]).trim();
    }
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

pub fn parse_plan(content: &str) -> Plan {
    let raw = || Plan {
        reasoning: content.to_string(),
        steps: Vec::new(),
        raw_response: true,
    };

    let value: Value = match serde_json::from_str(extract_json(content)) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "failed to parse plan JSON, returning raw response");
            return raw();
        }
    };
    let no_steps = match value.get("steps") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => true,
        Some(Value::Array(steps)) => steps.is_empty(),
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        Some(_) => false,
    };
    if no_steps {
        let reasoning = value
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or("Direct response");
        return Plan::direct(reasoning);
    }
    match serde_json::from_value::<Plan>(value) {
        Ok(plan) => plan,
        Err(e) => {
            tracing::warn!(error = %e, "plan JSON has unexpected shape, returning raw response");
            raw()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::core::MockClock;
    use crate::llm::{LlmClient, MockBackend, ModelCatalog, Provider};
    use crate::tools::builtin_registry;
    use std::sync::Arc;

    #[test]
    fn test_parse_fenced_plan() {
        let content = "Here is the plan:\n```json\n{\"reasoning\": \"look it up\", \"steps\": [{\"step\": 1, \"tool\": \"herbs.lookup\", \"parameters\": {\"herb_name\": \"人参\"}, \"purpose\": \"basics\"}]}\n```\nDone.";
        let plan = parse_plan(content);
        assert_eq!(plan.reasoning, "look it up");
        assert_eq!(plan.steps[0].tool, "herbs.lookup");
        assert_eq!(plan.steps[0].parameters["herb_name"], "人参");
    }

    #[test]
    fn test_parse_bare_and_plain_fence() {
        let plan = parse_plan("```\n{\"reasoning\": \"r\", \"steps\": []}\n```");
        assert!(plan.is_direct());
        assert!(!plan.raw_response);
        let plan = parse_plan("Sure. {\"reasoning\": \"r\", \"steps\": [{\"tool\": \"meridians.list_all\"}]}");
        assert_eq!(plan.steps.len(), 1);
    }

    #[test]
    fn test_missing_steps_is_direct() {
        let plan = parse_plan("{\"answer\": 42}");
        assert!(plan.is_direct());
        assert_eq!(plan.reasoning, "Direct response");
    }

    #[test]
    fn test_null_or_empty_steps_is_direct() {
        let plan = parse_plan(r#"{"reasoning": "常识问题", "steps": null}"#);
        assert!(plan.is_direct());
        assert!(!plan.raw_response);
        assert_eq!(plan.reasoning, "常识问题");

        for steps in ["false", "\"\"", "0"] {
            let plan = parse_plan(&format!(r#"{{"steps": {steps}}}"#));
            assert!(plan.is_direct(), "steps = {steps}");
            assert!(!plan.raw_response);
            assert_eq!(plan.reasoning, "Direct response");
        }
    }

    #[test]
    fn test_step_number_may_be_a_string() {
        let plan = parse_plan(
            r#"{"reasoning": null, "steps": [
                {"step": "1", "tool": "herbs.lookup", "parameters": {"query": "黄芪"}, "purpose": null},
                {"step": "second", "tool": "meridians.list_all", "parameters": null}
            ]}"#,
        );
        assert!(!plan.raw_response);
        assert_eq!(plan.reasoning, "");
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].step, Some(1));
        assert_eq!(plan.steps[0].purpose, "");
        assert_eq!(plan.steps[1].step, None);
        assert!(plan.steps[1].parameters.is_empty());
    }

    #[test]
    fn test_unparsable_keeps_raw_text() {
        let text = "黄芪性微温，味甘，归脾、肺经。";
        let plan = parse_plan(text);
        assert!(plan.raw_response);
        assert!(plan.steps.is_empty());
        assert_eq!(plan.reasoning, text);
    }

    #[tokio::test]
    async fn test_create_plan_excludes_suppressed_tools() {
        let clock = Arc::new(MockClock::new());
        let session = Session::with_clock(AppConfig::default(), Arc::new(ModelCatalog::builtin()), clock);
        let backend = Arc::new(MockBackend::new().reply(
            r#"{"reasoning": "r", "steps": [{"tool": "herbs.lookup", "parameters": {"herb_name": "黄芪"}}]}"#,
        ));
        let client = LlmClient::with_backend(
            Provider::Anthropic,
            "claude-sonnet-4-5-20250929",
            backend.clone(),
            session.usage().clone(),
        );
        let session = session.with_llm(client);
        session.record_tool_failure("literature.pubmed_search", "timeout");
        session.record_tool_failure("literature.pubmed_search", "timeout");

        let plan = create_plan(&session, &builtin_registry(), "黄芪的功效？", Some("pregnant patient"))
            .await
            .unwrap();
        assert_eq!(plan.steps.len(), 1);

        let request = &backend.requests()[0];
        assert!(request.system.contains("herbs.lookup"));
        assert!(!request.system.contains("literature.pubmed_search"));
        assert!(request.system.ends_with("USER CONTEXT:\npregnant patient"));
        assert!((request.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(request.max_tokens, 2048);
    }
}
