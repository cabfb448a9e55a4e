//! TCM - 中医药研究助手
//!
//! 模块划分：
//! - **agent**: 会话、规划、计划执行（含 `$stepN` 引用与重试）、综合、工具健康度、自检
//! - **cli**: 命令行子命令与交互模式
//! - **config**: 应用配置加载与持久化（TOML + 环境变量）
//! - **core**: 错误类型与可替换时钟
//! - **llm**: 多服务商 LLM 客户端、模型目录与用量统计
//! - **observability**: 日志初始化
//! - **tools**: 工具 trait、注册表与内置中医药工具

pub mod agent;
pub mod cli;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod tools;
