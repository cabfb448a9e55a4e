//! 计划执行集成测试：内置工具 + 故障工具，走公开 API

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use tcm::agent::{execute_plan, Plan, Session, Step, StepStatus};
use tcm::config::AppConfig;
use tcm::core::MockClock;
use tcm::llm::ModelCatalog;
use tcm::tools::{builtin_registry, Tool, ToolRegistry};

/// 始终返回 503 的外部服务
struct Unavailable {
    calls: AtomicUsize,
}

#[async_trait]
impl Tool for Unavailable {
    fn name(&self) -> &str {
        "literature.mirror"
    }
    fn description(&self) -> &str {
        "always unavailable"
    }
    fn category(&self) -> &str {
        "literature"
    }
    async fn execute(&self, _args: Value) -> Result<Value, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err("HTTP 503 service unavailable".into())
    }
}

fn setup() -> (Session, Arc<ToolRegistry>, Arc<Unavailable>, Arc<MockClock>) {
    let clock = Arc::new(MockClock::new());
    let session = Session::with_clock(
        AppConfig::default(),
        Arc::new(ModelCatalog::builtin()),
        clock.clone(),
    );
    let flaky = Arc::new(Unavailable {
        calls: AtomicUsize::new(0),
    });
    let mut registry = builtin_registry();
    registry.register_arc(flaky.clone());
    (session, Arc::new(registry), flaky, clock)
}

fn plan(steps: Vec<Step>) -> Plan {
    Plan {
        reasoning: "test".into(),
        steps,
        raw_response: false,
    }
}

#[tokio::test]
async fn test_references_flow_between_builtin_tools() {
    let (session, registry, _, _) = setup();
    let plan = plan(vec![
        Step::new("herbs.lookup", json!({"query": "甘草"})).with_purpose("basics"),
        Step::new(
            "safety.pregnancy_check",
            json!({"herbs": "$step1.output.herb.chinese_name"}),
        ),
    ]);

    let results = execute_plan(&session, registry, &plan).await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].step, 1);
    assert_eq!(results[0].purpose, "basics");
    assert_eq!(results[1].status, StepStatus::Success);
}

#[tokio::test]
async fn test_failures_are_recorded_and_do_not_stop_the_plan() {
    let (session, registry, flaky, clock) = setup();
    let plan = plan(vec![
        Step::new("literature.mirror", json!({})),
        Step::new("herbs.nonexistent", json!({})),
        Step::new("meridians.list_all", json!({})),
    ]);

    let results = execute_plan(&session, registry, &plan).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].status, StepStatus::Error);
    assert_eq!(results[0].error.as_deref(), Some("HTTP 503 service unavailable"));
    assert_eq!(results[1].error.as_deref(), Some("Tool 'herbs.nonexistent' not found."));
    assert!(results[2].is_success());

    // 默认 2 次尝试，间隔 1 秒（虚拟时钟）
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);

    // 两次瞬时失败达到默认阈值，工具被抑制
    assert!(session
        .tool_health_suppressed_tools()
        .contains("literature.mirror"));
}

#[tokio::test]
async fn test_unresolvable_reference_passes_literal() {
    let (session, registry, _, _) = setup();
    let plan = plan(vec![Step::new("herbs.lookup", json!({"query": "$step9.output"}))]);

    let results = execute_plan(&session, registry, &plan).await;

    assert_eq!(results.len(), 1);
    // 字面量 "$step9.output" 原样传给工具，查不到草药但调用本身不因引用失败而跳过
    assert_eq!(results[0].tool, "herbs.lookup");
}
