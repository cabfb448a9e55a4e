//! LLM 调用重试：指数退避，只重试瞬时错误
//!
//! delay = base * 2^(attempt-1)；非瞬时错误首次即返回；重试用尽返回最后一次错误。

use std::future::Future;
use std::time::Duration;

use crate::core::Clock;
use crate::llm::LlmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// 总尝试次数（含首次）
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryConfig {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

pub async fn retry_with_backoff<T, F, Fut>(
    config: &RetryConfig,
    clock: &dyn Clock,
    label: &str,
    mut op: F,
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = config.delay_for(attempt);
                tracing::warn!(
                    call = label,
                    attempt,
                    max_attempts,
                    delay_secs = delay.as_secs_f64(),
                    "LLM call failed: {}, retrying",
                    err
                );
                clock.sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
