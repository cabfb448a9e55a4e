//! 工具健康度：滑动窗口内的瞬时失败计数与定时屏蔽
//!
//! 只有瞬时错误（超时、连接、限流、5xx）计入；同一工具在窗口内失败次数达到阈值后，
//! 从触发那次失败起屏蔽固定时长，期间不出现在规划器的工具目录里。
//! 任何一次成功立即清空该工具的失败历史与屏蔽。过期数据在读取时惰性清理，没有后台定时器。

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::core::Clock;

const TRANSIENT_TOOL_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "connection",
    "dns",
    "service unavailable",
    "rate limit",
    "429",
    "500",
    "502",
    "503",
    "504",
];

/// 工具错误文本是否属于瞬时失败（大小写不敏感的子串匹配）
pub fn is_transient_tool_error(error_text: &str) -> bool {
    let text = error_text.to_lowercase();
    TRANSIENT_TOOL_MARKERS.iter().any(|m| text.contains(m))
}

/// 健康度策略（已按下限修正）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolHealthPolicy {
    pub enabled: bool,
    pub fail_threshold: usize,
    pub failure_window: Duration,
    pub suppress_for: Duration,
}

impl ToolHealthPolicy {
    /// 由原始配置值构建：阈值至少 1，窗口与屏蔽时长至少 60 秒
    pub fn from_raw(enabled: bool, fail_threshold: i64, window_secs: i64, suppress_secs: i64) -> Self {
        Self {
            enabled,
            fail_threshold: fail_threshold.max(1) as usize,
            failure_window: Duration::from_secs(window_secs.max(60) as u64),
            suppress_for: Duration::from_secs(suppress_secs.max(60) as u64),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

impl Default for ToolHealthPolicy {
    fn default() -> Self {
        Self::from_raw(true, 2, 1800, 900)
    }
}

/// 某工具当前的健康状态（由失败历史推导，不单独存储）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolHealth {
    Healthy,
    Degraded { failures: usize },
    Suppressed { remaining: Duration },
}

impl fmt::Display for ToolHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolHealth::Healthy => write!(f, "healthy"),
            ToolHealth::Degraded { failures } => write!(f, "degraded ({failures} recent failures)"),
            ToolHealth::Suppressed { remaining } => {
                write!(f, "suppressed ({}s remaining)", remaining.as_secs())
            }
        }
    }
}

#[derive(Debug, Default)]
struct HealthState {
    failures: HashMap<String, Vec<Instant>>,
    suppressed_until: HashMap<String, Instant>,
}

impl HealthState {
    /// 清理已到期的屏蔽；到期时连同失败历史一起清除
    fn expire(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .suppressed_until
            .iter()
            .filter(|(_, until)| now >= **until)
            .map(|(name, _)| name.clone())
            .collect();
        for name in expired {
            self.suppressed_until.remove(&name);
            self.failures.remove(&name);
            tracing::info!(tool = %name, "tool suppression expired");
        }
    }

    fn prune(&mut self, tool: &str, now: Instant, window: Duration) -> usize {
        let Some(history) = self.failures.get_mut(tool) else {
            return 0;
        };
        history.retain(|t| now.saturating_duration_since(*t) <= window);
        if history.is_empty() {
            self.failures.remove(tool);
            0
        } else {
            history.len()
        }
    }
}

/// 会话级工具健康度跟踪器；内部加锁，可在 &self 上记录
pub struct ToolHealthTracker {
    policy: ToolHealthPolicy,
    clock: Arc<dyn Clock>,
    state: Mutex<HealthState>,
}

impl ToolHealthTracker {
    pub fn new(policy: ToolHealthPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            clock,
            state: Mutex::new(HealthState::default()),
        }
    }

    pub fn policy(&self) -> ToolHealthPolicy {
        self.policy
    }

    fn state(&self) -> MutexGuard<'_, HealthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_success(&self, tool: &str) {
        if tool.is_empty() {
            return;
        }
        let mut state = self.state();
        let had_failures = state.failures.remove(tool).is_some();
        let was_suppressed = state.suppressed_until.remove(tool).is_some();
        if had_failures || was_suppressed {
            tracing::debug!(tool, was_suppressed, "tool health reset after success");
        }
    }

    /// 记录一次失败；返回该失败是否计入健康度（功能关闭或非瞬时错误时为 false）
    pub fn record_failure(&self, tool: &str, error_text: &str) -> bool {
        if !self.policy.enabled || tool.is_empty() || !is_transient_tool_error(error_text) {
            return false;
        }
        let now = self.clock.now();
        let mut state = self.state();
        state.expire(now);
        state.prune(tool, now, self.policy.failure_window);
        let history = state.failures.entry(tool.to_string()).or_default();
        history.push(now);
        let count = history.len();

        if count >= self.policy.fail_threshold && !state.suppressed_until.contains_key(tool) {
            state
                .suppressed_until
                .insert(tool.to_string(), now + self.policy.suppress_for);
            tracing::warn!(
                tool,
                failures = count,
                suppress_secs = self.policy.suppress_for.as_secs(),
                "tool suppressed after repeated transient failures"
            );
        }
        true
    }

    /// 当前被屏蔽的工具；功能关闭时总为空
    pub fn suppressed_tools(&self) -> BTreeSet<String> {
        if !self.policy.enabled {
            return BTreeSet::new();
        }
        let now = self.clock.now();
        let mut state = self.state();
        state.expire(now);
        state.suppressed_until.keys().cloned().collect()
    }

    pub fn health(&self, tool: &str) -> ToolHealth {
        if !self.policy.enabled {
            return ToolHealth::Healthy;
        }
        let now = self.clock.now();
        let mut state = self.state();
        state.expire(now);
        if let Some(until) = state.suppressed_until.get(tool) {
            return ToolHealth::Suppressed {
                remaining: until.saturating_duration_since(now),
            };
        }
        match state.prune(tool, now, self.policy.failure_window) {
            0 => ToolHealth::Healthy,
            failures => ToolHealth::Degraded { failures },
        }
    }

    /// 所有非健康工具的状态（按名称排序），供 /health 展示
    pub fn report(&self) -> Vec<(String, ToolHealth)> {
        let names: BTreeSet<String> = {
            let state = self.state();
            state
                .failures
                .keys()
                .chain(state.suppressed_until.keys())
                .cloned()
                .collect()
        };
        names
            .into_iter()
            .map(|name| {
                let health = self.health(&name);
                (name, health)
            })
            .filter(|(_, health)| *health != ToolHealth::Healthy)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MockClock;

    const X: &str = "literature.pubmed_search";

    fn tracker(policy: ToolHealthPolicy) -> (ToolHealthTracker, Arc<MockClock>) {
        let clock = Arc::new(MockClock::new());
        (ToolHealthTracker::new(policy, clock.clone()), clock)
    }

    #[test]
    fn test_transient_markers() {
        assert!(is_transient_tool_error("Connection refused"));
        assert!(is_transient_tool_error("HTTP 503 Service Unavailable"));
        assert!(is_transient_tool_error("Tool 'x' timed out after 30s"));
        assert!(!is_transient_tool_error("invalid parameter"));
        assert!(!is_transient_tool_error(""));
    }

    #[test]
    fn test_policy_floors() {
        let p = ToolHealthPolicy::from_raw(true, 0, 0, -3);
        assert_eq!(p.fail_threshold, 1);
        assert_eq!(p.failure_window, Duration::from_secs(60));
        assert_eq!(p.suppress_for, Duration::from_secs(60));
    }

    #[test]
    fn test_threshold_suppresses_and_success_clears() {
        let (t, _clock) = tracker(ToolHealthPolicy::default());
        assert!(t.record_failure(X, "timeout"));
        assert_eq!(t.health(X), ToolHealth::Degraded { failures: 1 });
        assert!(t.suppressed_tools().is_empty());

        t.record_failure(X, "HTTP 502");
        assert!(t.suppressed_tools().contains(X));

        t.record_success(X);
        assert!(t.suppressed_tools().is_empty());
        assert_eq!(t.health(X), ToolHealth::Healthy);
    }

    #[test]
    fn test_suppression_expires_with_history() {
        let (t, clock) = tracker(ToolHealthPolicy::default());
        t.record_failure(X, "connection reset");
        t.record_failure(X, "connection reset");
        clock.advance(Duration::from_secs(899));
        assert!(t.suppressed_tools().contains(X));

        clock.advance(Duration::from_secs(2));
        assert!(t.suppressed_tools().is_empty());
        // 到期后失败历史也清空，单次失败不会立刻再次屏蔽
        t.record_failure(X, "connection reset");
        assert!(t.suppressed_tools().is_empty());
    }

    #[test]
    fn test_failures_outside_window_are_pruned() {
        let (t, clock) = tracker(ToolHealthPolicy::default());
        t.record_failure(X, "timeout");
        clock.advance(Duration::from_secs(1801));
        t.record_failure(X, "timeout");
        assert!(t.suppressed_tools().is_empty());
        assert_eq!(t.health(X), ToolHealth::Degraded { failures: 1 });
    }

    #[test]
    fn test_non_transient_never_suppresses() {
        let (t, _clock) = tracker(ToolHealthPolicy::default());
        for _ in 0..10 {
            assert!(!t.record_failure(X, "invalid parameter"));
        }
        assert!(t.suppressed_tools().is_empty());
        assert_eq!(t.health(X), ToolHealth::Healthy);
    }

    #[test]
    fn test_suppression_measured_from_trigger() {
        let (t, clock) = tracker(ToolHealthPolicy::default());
        t.record_failure(X, "429 rate limit");
        t.record_failure(X, "429 rate limit");
        clock.advance(Duration::from_secs(600));
        t.record_failure(X, "429 rate limit");
        clock.advance(Duration::from_secs(301));
        assert!(t.suppressed_tools().is_empty());
    }

    #[test]
    fn test_disabled_is_noop() {
        let (t, _clock) = tracker(ToolHealthPolicy::disabled());
        assert!(!t.record_failure(X, "timeout"));
        assert!(!t.record_failure(X, "timeout"));
        assert!(t.suppressed_tools().is_empty());
        assert!(t.report().is_empty());
    }

    #[test]
    fn test_report_lists_unhealthy() {
        let (t, _clock) = tracker(ToolHealthPolicy::from_raw(true, 1, 1800, 900));
        t.record_failure(X, "dns lookup failed");
        let report = t.report();
        assert_eq!(report.len(), 1);
        assert!(matches!(report[0].1, ToolHealth::Suppressed { .. }));
        assert!(report[0].1.to_string().starts_with("suppressed"));
    }
}
