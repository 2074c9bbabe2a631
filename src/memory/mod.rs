//! 记忆层：决策历史、记忆存储协作方（trait + markdown 文件实现）、索引

pub mod conversation;
pub mod index;
pub mod markdown_store;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::Result;

pub use conversation::{DecisionHistory, Message, Role};
pub use index::{IndexEntry, MemoryIndex};
pub use markdown_store::FileMemory;

/// 一次 recall 命中的片段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryPiece {
    pub content: String,
    pub category: String,
    pub source: String,
    pub priority: u8,
}

/// 记忆概况（状态快照使用）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub archive_file_count: usize,
    pub archive_total_size: u64,
    /// hot.md 修改时间（RFC 3339）
    pub hot_last_updated: Option<String>,
    pub index_entry_count: usize,
}

/// summarize_and_rotate 的结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RotateReport {
    /// 被压缩并移入 backup/ 的文件名
    pub summarized: Vec<String>,
    pub summary_file: Option<PathBuf>,
}

/// 记忆存储协作方
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// 按 topic 写入合适的位置并更新索引
    async fn consolidate(&self, topic: &str, content: &str) -> Result<PathBuf>;

    async fn recall(
        &self,
        query: &str,
        top_k: usize,
        category: Option<&str>,
        domain: Option<&str>,
    ) -> Result<Vec<MemoryPiece>>;

    /// (是否需要压缩, 原因)
    async fn check_summarize_trigger(&self) -> (bool, String);

    async fn summarize_and_rotate(&self) -> Result<RotateReport>;

    async fn stats(&self) -> Result<MemoryStats>;

    /// 把 brain 整合为一份 system prompt 文件，返回 (路径, 字节数)
    async fn build_integrated_context(&self) -> Result<(PathBuf, usize)>;

    async fn append_short_term(&self, content: &str) -> Result<()>;

    /// 读出并清空短期会话缓冲
    async fn take_short_term(&self) -> Result<String>;

    /// 重建索引，返回条目数
    async fn rebuild_index(&self) -> Result<usize>;
}
