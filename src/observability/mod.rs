//! 日志初始化
//!
//! 日志统一写到 stderr，stdout 只输出回答正文，便于 `tcm "..." > answer.md`。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 默认级别：普通模式 warn，`-v` 为 info；RUST_LOG 优先
pub fn init(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}
