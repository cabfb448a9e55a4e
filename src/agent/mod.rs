//! Agent 层：会话、工具健康度、计划执行、规划与综合

pub mod doctor;
pub mod events;
pub mod executor;
pub mod plan;
pub mod planner;
pub mod reference;
pub mod runtime;
pub mod session;
pub mod synthesizer;
pub mod tool_health;

pub use doctor::{has_errors, run_checks, Check, CheckStatus};
pub use events::{AgentEvent, EventSender};
pub use executor::{execute_plan, PlanExecutor};
pub use plan::{Plan, Step, StepResult, StepStatus, DIRECT_TOOL};
pub use planner::{create_plan, parse_plan};
pub use reference::{resolve_params, resolve_value};
pub use runtime::{Answer, ResearchAgent};
pub use session::Session;
pub use synthesizer::{format_results, synthesize, synthesize_stream};
pub use tool_health::{is_transient_tool_error, ToolHealth, ToolHealthPolicy, ToolHealthTracker};
