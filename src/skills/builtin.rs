//! 内置技能
//!
//! - daily-consolidate（23:00）：把短期会话缓冲固化进当日 archive 并清空缓冲
//! - periodic-summarize（02:00）：archive 超过阈值时压缩

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{CataError, Result};
use crate::memory::MemoryStore;

use super::registry::SkillRegistry;
use super::skill::{Skill, SkillContext};

pub const DAILY_CONSOLIDATE: &str = "daily-consolidate";
pub const PERIODIC_SUMMARIZE: &str = "periodic-summarize";

pub struct DailyConsolidateSkill {
    memory: Arc<dyn MemoryStore>,
}

impl DailyConsolidateSkill {
    pub fn new(memory: Arc<dyn MemoryStore>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Skill for DailyConsolidateSkill {
    fn name(&self) -> &str {
        DAILY_CONSOLIDATE
    }

    fn description(&self) -> &str {
        "Consolidate today's short-term session notes into the daily archive"
    }

    fn schedule(&self) -> &str {
        "23:00"
    }

    async fn run(&self, ctx: SkillContext, _args: Vec<String>) -> Result<String> {
        let buffered = self.memory.take_short_term().await?;
        if buffered.trim().is_empty() {
            tracing::info!(trigger = %ctx.trigger, "daily consolidate: short-term buffer empty");
            return Ok("Short-term buffer is empty, nothing to consolidate".to_string());
        }

        let topic = format!("每日总结 {}", chrono::Local::now().format("%Y-%m-%d"));
        match self.memory.consolidate(&topic, &buffered).await {
            Ok(path) => {
                tracing::info!(trigger = %ctx.trigger, path = %path.display(), "daily consolidate done");
                Ok(format!("Consolidated short-term notes into {}", path.display()))
            }
            Err(e) => {
                // 缓冲已被取出，写回以免丢失
                if let Err(restore) = self.memory.append_short_term(&buffered).await {
                    tracing::warn!(error = %restore, "failed to restore short-term buffer");
                }
                Err(CataError::SkillFailed {
                    name: DAILY_CONSOLIDATE.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}

pub struct PeriodicSummarizeSkill {
    memory: Arc<dyn MemoryStore>,
}

impl PeriodicSummarizeSkill {
    pub fn new(memory: Arc<dyn MemoryStore>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Skill for PeriodicSummarizeSkill {
    fn name(&self) -> &str {
        PERIODIC_SUMMARIZE
    }

    fn description(&self) -> &str {
        "Summarize and rotate archive files when archive limits are exceeded"
    }

    fn schedule(&self) -> &str {
        "02:00"
    }

    async fn run(&self, ctx: SkillContext, _args: Vec<String>) -> Result<String> {
        let (needed, reason) = self.memory.check_summarize_trigger().await;
        if !needed {
            tracing::info!(trigger = %ctx.trigger, "summarize not needed");
            return Ok("Archive within limits, summarize not needed".to_string());
        }
        tracing::info!(trigger = %ctx.trigger, %reason, "summarize needed");
        let report = self.memory.summarize_and_rotate().await?;
        Ok(format!(
            "{}; summarized {} files",
            reason,
            report.summarized.len()
        ))
    }
}

/// 注册两个内置技能，返回实际注册数（被禁用的不计）
pub async fn register_builtin(registry: &SkillRegistry, memory: Arc<dyn MemoryStore>) -> Result<usize> {
    let mut n = 0;
    if registry
        .register(Arc::new(DailyConsolidateSkill::new(memory.clone())))
        .await?
    {
        n += 1;
    }
    if registry
        .register(Arc::new(PeriodicSummarizeSkill::new(memory)))
        .await?
    {
        n += 1;
    }
    Ok(n)
}
