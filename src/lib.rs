//! Cata - 自主演进的记忆与任务守护进程
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、brain 目录布局、原子写文件、优雅关闭
//! - **evolution**: 任务队列、演进日志、状态分析、执行器与决策循环
//! - **llm**: 决策 oracle 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: markdown 记忆存储、索引、决策历史
//! - **observability**: tracing 初始化
//! - **server**: 本地 Unix socket 控制协议与守护进程装配
//! - **skills**: 技能注册表、内置 / 脚本技能、每日调度

pub mod config;
pub mod core;
pub mod evolution;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod server;
pub mod skills;

pub use config::{load_config, AppConfig};
pub use core::{CataError, Result};
pub use evolution::EvolutionEngine;
