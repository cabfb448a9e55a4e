//! 核心层：错误类型与时钟抽象

pub mod clock;
pub mod error;

pub use clock::{system_clock, Clock, MockClock, SystemClock};
pub use error::AgentError;
