//! 演进日志 `evolution_log.json`
//!
//! 每次决策 / 执行追加一条记录。所有读改写都经过同一把 Mutex，条目以追加时返回的下标定位，
//! 因此并发的周期、队列消费与手动执行不会互相覆盖对方的条目。
//!
//! 文件存在但读不出来时，写操作返回错误而不是用空日志覆盖；已有的历史保持原样，
//! 调用方记 warn 后继续运行。

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::core::{JsonFile, Result};

use super::types::now_rfc3339;

/// 日志条目状态（字符串形式与任务状态一致）
pub const LOG_PENDING: &str = "pending";
pub const LOG_COMPLETED: &str = "completed";
pub const LOG_FAILED: &str = "failed";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvolutionLogEntry {
    pub timestamp: String,
    #[serde(default)]
    pub task_id: String,
    pub action: String,
    #[serde(default)]
    pub decision: String,
    pub status: String,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub learning: String,
    #[serde(default)]
    pub completed_at: String,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

impl EvolutionLogEntry {
    /// 新的 pending 条目
    pub fn pending(action: impl Into<String>, decision: impl Into<String>, next_steps: Vec<String>) -> Self {
        Self {
            timestamp: now_rfc3339(),
            action: action.into(),
            decision: decision.into(),
            status: LOG_PENDING.to_string(),
            next_steps,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvolutionLog {
    #[serde(default)]
    pub entries: Vec<EvolutionLogEntry>,
}

/// 条目结束时的回填内容
#[derive(Debug, Clone)]
pub struct EntryOutcome {
    pub task_id: String,
    pub success: bool,
    /// 成功时为输出，失败时为错误文本
    pub result: String,
    pub learning: String,
}

pub struct EvolutionLogStore {
    file: JsonFile,
    lock: Mutex<()>,
}

impl EvolutionLogStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            file: JsonFile::new(path),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// 读取文件；缺失时为空日志，无法读取或解析时返回错误
    async fn read(&self) -> Result<EvolutionLog> {
        Ok(self.file.load_async::<EvolutionLog>().await?.unwrap_or_default())
    }

    /// 只读场景：无法读取时按空日志处理
    async fn read_or_empty(&self) -> EvolutionLog {
        self.read().await.unwrap_or_else(|e| {
            tracing::warn!(path = %self.file.path().display(), error = %e, "evolution log unreadable, treating as empty");
            EvolutionLog::default()
        })
    }

    /// 追加一条记录，返回其下标
    pub async fn append(&self, entry: EvolutionLogEntry) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let mut log = self.read().await?;
        log.entries.push(entry);
        let index = log.entries.len() - 1;
        self.file.save_async(&log).await?;
        Ok(index)
    }

    /// 按下标回填结果；下标越界时只记 warn
    pub async fn complete(&self, index: usize, outcome: EntryOutcome) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut log = self.read().await?;
        let Some(entry) = log.entries.get_mut(index) else {
            tracing::warn!(index, "evolution log entry vanished before completion");
            return Ok(());
        };

        entry.task_id = outcome.task_id;
        entry.completed_at = now_rfc3339();
        if outcome.success {
            entry.status = LOG_COMPLETED.to_string();
            entry.result = outcome.result;
            entry.learning = outcome.learning;
        } else {
            entry.status = LOG_FAILED.to_string();
            entry.result = outcome.result;
        }
        self.file.save_async(&log).await
    }

    /// 最近 n 条，按时间正序
    pub async fn recent(&self, n: usize) -> Vec<EvolutionLogEntry> {
        let _guard = self.lock.lock().await;
        let log = self.read_or_empty().await;
        let start = log.entries.len().saturating_sub(n);
        log.entries[start..].to_vec()
    }

    pub async fn len(&self) -> usize {
        let _guard = self.lock.lock().await;
        self.read_or_empty().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
