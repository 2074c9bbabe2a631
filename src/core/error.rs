//! 守护进程错误类型
//!
//! 按错误来源划分：任务队列（未知 ID、非法状态迁移）、执行器（未知任务类型、参数不足）、
//! 技能（未知 / 重复 / 非法调度）、oracle（不可用、调用失败）、记忆协作方、配置与 I/O。

use thiserror::Error;

use crate::evolution::TaskStatus;

/// 库内统一 Result
pub type Result<T> = std::result::Result<T, CataError>;

#[derive(Error, Debug)]
pub enum CataError {
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("invalid status transition for task {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("invalid task input: {0}")]
    InvalidTaskInput(String),

    #[error("skill not found: {0}")]
    UnknownSkill(String),

    #[error("skill {0} already registered")]
    DuplicateSkill(String),

    #[error("skill name cannot be empty")]
    EmptySkillName,

    #[error("invalid schedule '{schedule}': {reason}")]
    InvalidSchedule { schedule: String, reason: String },

    #[error("skill {name} failed: {message}")]
    SkillFailed { name: String, message: String },

    /// 没有任何可用的 oracle 配置：决策循环与 learn / custom 无法工作，构造时即失败
    #[error("decision oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("memory error: {0}")]
    Memory(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<config::ConfigError> for CataError {
    fn from(e: config::ConfigError) -> Self {
        CataError::Config(e.to_string())
    }
}
