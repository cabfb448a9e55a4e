//! 时钟抽象
//!
//! LLM 重试退避、工具重试间隔与工具健康窗口都经由 Clock 取时间和睡眠；
//! 测试中使用 MockClock：sleep 不真正阻塞，只推进虚拟时间并记录时长。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;

/// 时钟 trait：当前时刻 + 异步睡眠
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

/// 真实时钟（tokio 睡眠）
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// 进程默认时钟
pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

/// 虚拟时钟：now = 创建时刻 + 已推进的偏移；sleep 记录时长并推进偏移
#[derive(Debug)]
pub struct MockClock {
    origin: Instant,
    offset: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// 手动推进虚拟时间（不计入 sleeps）
    pub fn advance(&self, by: Duration) {
        *lock(&self.offset) += by;
    }

    /// 已记录的全部 sleep 时长（按调用顺序）
    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }

    pub fn elapsed(&self) -> Duration {
        *lock(&self.offset)
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.origin + *lock(&self.offset)
    }

    async fn sleep(&self, duration: Duration) {
        lock(&self.sleeps).push(duration);
        *lock(&self.offset) += duration;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
