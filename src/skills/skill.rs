//! Skill trait：可被定时器、oracle 或命令直接调用的命名能力

use std::fmt;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::Result;

/// 调用来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Scheduled,
    Oracle,
    Command,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Scheduled => f.write_str("scheduled"),
            Trigger::Oracle => f.write_str("oracle"),
            Trigger::Command => f.write_str("command"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SkillContext {
    pub cancel: CancellationToken,
    pub trigger: Trigger,
}

impl SkillContext {
    pub fn new(cancel: CancellationToken, trigger: Trigger) -> Self {
        Self { cancel, trigger }
    }
}

#[async_trait]
pub trait Skill: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 每日执行时间 `HH:MM`；空串表示不定时
    fn schedule(&self) -> &str {
        ""
    }

    /// 可直接调用的命令名
    fn cli_command(&self) -> Option<&str> {
        None
    }

    /// 是否作为函数暴露给决策 oracle
    fn oracle_visible(&self) -> bool {
        true
    }

    /// 执行技能，返回输出文本
    async fn run(&self, ctx: SkillContext, args: Vec<String>) -> Result<String>;
}
