//! 系统状态快照：记忆、任务、演进三部分，每个决策周期重新生成

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::JsonFile;
use crate::memory::MemoryStore;

use super::log::{EvolutionLogStore, LOG_COMPLETED};
use super::queue::TaskQueue;
use super::types::now_rfc3339;

const RECENT_TASKS: usize = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryState {
    pub archive_file_count: usize,
    pub archive_total_size: u64,
    pub hot_last_updated: String,
    pub index_entry_count: usize,
    pub index_complete: bool,
    pub needs_summarize: bool,
    pub summarize_reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskHistory {
    pub task_id: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub status: String,
    pub completed: String,
    pub result: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskState {
    pub recent_tasks: Vec<TaskHistory>,
    pub success_rate: f64,
    pub pending_tasks: usize,
    pub last_task_time: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// learning / mastered / failed
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub progress: f64,
}

/// capabilities.json
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub learning_progress: HashMap<String, f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvolutionState {
    pub capabilities: Vec<Capability>,
    pub learning_progress: HashMap<String, f64>,
    pub last_evolution: String,
    pub improvement_areas: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemState {
    pub memory_state: MemoryState,
    pub task_state: TaskState,
    pub evolution_state: EvolutionState,
    pub timestamp: String,
}

impl SystemState {
    /// 给 oracle 的文本描述
    pub fn describe(&self) -> String {
        let m = &self.memory_state;
        let t = &self.task_state;
        let e = &self.evolution_state;
        let mut s = String::new();

        let _ = writeln!(s, "## 记忆状态");
        let _ = writeln!(
            s,
            "- archive 文件数: {}，总大小: {} 字节",
            m.archive_file_count, m.archive_total_size
        );
        let _ = writeln!(s, "- hot.md 最后更新: {}", or_none(&m.hot_last_updated));
        let _ = writeln!(s, "- 索引条目数: {}", m.index_entry_count);
        if m.needs_summarize {
            let _ = writeln!(s, "- 需要压缩: 是（{}）", m.summarize_reason);
        } else {
            let _ = writeln!(s, "- 需要压缩: 否");
        }

        let _ = writeln!(s, "\n## 任务状态");
        let _ = writeln!(s, "- 最近成功率: {:.0}%", t.success_rate * 100.0);
        let _ = writeln!(s, "- 队列中待执行: {}", t.pending_tasks);
        let _ = writeln!(s, "- 最近任务时间: {}", or_none(&t.last_task_time));
        for task in &t.recent_tasks {
            let _ = writeln!(s, "  - [{}] {} {}", task.status, task.task_type, task.task_id);
        }

        let _ = writeln!(s, "\n## 演进状态");
        let _ = writeln!(s, "- 最近一次演进: {}", or_none(&e.last_evolution));
        for cap in &e.capabilities {
            let _ = writeln!(s, "  - 能力 {}: {} ({:.0}%)", cap.name, cap.status, cap.progress * 100.0);
        }
        if !e.improvement_areas.is_empty() {
            let _ = writeln!(s, "- 待改进: {}", e.improvement_areas.join("、"));
        }
        s
    }
}

fn or_none(s: &str) -> &str {
    if s.is_empty() {
        "无"
    } else {
        s
    }
}

/// 状态分析器：只读，不修改任何持久化文件
pub struct StateAnalyzer {
    memory: Arc<dyn MemoryStore>,
    log: Arc<EvolutionLogStore>,
    queue: Arc<TaskQueue>,
    capabilities: JsonFile,
}

impl StateAnalyzer {
    pub fn new(
        memory: Arc<dyn MemoryStore>,
        log: Arc<EvolutionLogStore>,
        queue: Arc<TaskQueue>,
        capabilities_path: PathBuf,
    ) -> Self {
        Self {
            memory,
            log,
            queue,
            capabilities: JsonFile::new(capabilities_path),
        }
    }

    /// 生成快照；单个来源读取失败时该部分取默认值
    pub async fn analyze(&self) -> SystemState {
        SystemState {
            memory_state: self.memory_state().await,
            task_state: self.task_state().await,
            evolution_state: self.evolution_state().await,
            timestamp: now_rfc3339(),
        }
    }

    async fn memory_state(&self) -> MemoryState {
        let stats = match self.memory.stats().await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "memory stats unavailable");
                Default::default()
            }
        };
        let (needs_summarize, summarize_reason) = self.memory.check_summarize_trigger().await;
        MemoryState {
            archive_file_count: stats.archive_file_count,
            archive_total_size: stats.archive_total_size,
            hot_last_updated: stats.hot_last_updated.unwrap_or_default(),
            index_entry_count: stats.index_entry_count,
            index_complete: stats.index_entry_count > 0,
            needs_summarize,
            summarize_reason,
        }
    }

    async fn task_state(&self) -> TaskState {
        let recent = self.log.recent(RECENT_TASKS).await;
        let completed = recent.iter().filter(|e| e.status == LOG_COMPLETED).count();
        let success_rate = if recent.is_empty() {
            0.0
        } else {
            completed as f64 / recent.len() as f64
        };
        let last_task_time = recent
            .iter()
            .rev()
            .find(|e| !e.completed_at.is_empty())
            .map(|e| e.completed_at.clone())
            .unwrap_or_default();

        TaskState {
            recent_tasks: recent
                .into_iter()
                .map(|e| TaskHistory {
                    task_id: e.task_id,
                    task_type: e.action,
                    status: e.status,
                    completed: e.completed_at,
                    result: e.result,
                })
                .collect(),
            success_rate,
            pending_tasks: self.queue.pending_count().await,
            last_task_time,
        }
    }

    async fn evolution_state(&self) -> EvolutionState {
        let caps = match self.capabilities.load_async::<Capabilities>().await {
            Ok(c) => c.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "capabilities.json unreadable");
                Capabilities::default()
            }
        };
        let last_evolution = self
            .log
            .recent(1)
            .await
            .pop()
            .map(|e| e.timestamp)
            .unwrap_or_default();
        let improvement_areas = caps
            .capabilities
            .iter()
            .filter(|c| c.status == "failed" || (c.status == "learning" && c.progress < 0.5))
            .map(|c| c.name.clone())
            .collect();

        EvolutionState {
            capabilities: caps.capabilities,
            learning_progress: caps.learning_progress,
            last_evolution,
            improvement_areas,
        }
    }
}
