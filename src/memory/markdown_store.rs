//! Markdown 文件记忆存储
//!
//! - 热记忆：hot.md（身份、目标、偏好等 topic）
//! - 长期：memory/long-term/<topic>.md
//! - 档案：archive/YYYY-MM-DD.md，超过阈值时合并为 archive/summary-YYYY-MM.md，原文件移入 archive/backup/
//! - 短期：memory/short-term/current_session.md
//!
//! 索引 memory_index.json 与文件同步更新；一把 Mutex 串行化所有文件与索引操作。
//! archive 压缩另有一把锁：调用 oracle 生成摘要期间不占用索引锁。
//!
//! 运行期读写走 tokio::fs，目录遍历放到阻塞线程池。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local, SecondsFormat};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use walkdir::WalkDir;

use crate::config::MemorySection;
use crate::core::{blocking, BrainPaths, CataError, JsonFile, Result};
use crate::llm::LlmClient;
use crate::memory::index::{self, MemoryIndex, INDEX_VERSION};
use crate::memory::{MemoryPiece, MemoryStats, MemoryStore, Message, RotateReport};

const DEFAULT_TOP_K: usize = 5;
/// 单次压缩最多选取的文件数与总字节数
const ROTATE_MAX_FILES: usize = 10;
const ROTATE_MAX_BYTES: u64 = 5 * 1024 * 1024;

const HOT_KEYWORDS: [&str; 7] = ["身份", "目标", "偏好", "习惯", "技术栈", "我是谁", "自我认知"];
const LONG_TERM_KEYWORDS: [&str; 4] = ["长期", "long-term", "long term", "项目知识"];

const HOT_TEMPLATE: &str = "# Cata · 热记忆

> 身份认同、当前目标、不可妥协的偏好。

## 我是谁

## 当前目标

## 雷打不动的偏好
";

const SUMMARY_INSTRUCTIONS: &str = "你是一个专业的记忆摘要助手。请为以下多日的 archive 内容生成一个简洁、结构化的摘要。\
摘要应该保留关键信息、重要事件和决策，使用 Markdown 格式。";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Hot,
    LongTerm,
    Archive,
}

fn target_for(topic: &str) -> Target {
    let lower = topic.to_lowercase();
    if HOT_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Target::Hot
    } else if LONG_TERM_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Target::LongTerm
    } else {
        Target::Archive
    }
}

/// topic → 文件名：保留字母数字与中文，其余替换为 '-'
fn slug(topic: &str) -> String {
    let mut out = String::new();
    for c in topic.trim().chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed: String = out.trim_matches('-').chars().take(40).collect();
    if trimmed.is_empty() {
        "notes".to_string()
    } else {
        trimmed
    }
}

async fn append(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(p) = path.parent() {
        tokio::fs::create_dir_all(p).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(text.as_bytes()).await
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

fn is_summary_file(name: &str) -> bool {
    name.starts_with("summary-")
}

/// archive 目录下参与统计的 .md 文件（不含 summary-* 与子目录）
fn archive_files(dir: &Path) -> Vec<(PathBuf, std::fs::Metadata)> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter_map(|e| {
            let meta = e.metadata().ok()?;
            let name = e.file_name().to_string_lossy().to_string();
            (meta.is_file() && name.ends_with(".md") && !is_summary_file(&name))
                .then(|| (e.path(), meta))
        })
        .collect()
}

/// 选取最旧的非摘要、非今日 archive 文件，数量与总大小有上限
fn select_rotation(archive_dir: &Path) -> Vec<PathBuf> {
    let today_name = format!("{}.md", today());
    let mut files: Vec<_> = archive_files(archive_dir)
        .into_iter()
        .filter(|(p, _)| p.file_name().map_or(true, |n| n.to_string_lossy() != today_name))
        .collect();
    files.sort_by_key(|(_, m)| m.modified().ok());

    let mut selected = Vec::new();
    let mut total = 0u64;
    for (path, meta) in files {
        if selected.len() >= ROTATE_MAX_FILES {
            break;
        }
        if total + meta.len() > ROTATE_MAX_BYTES && !selected.is_empty() {
            break;
        }
        total += meta.len();
        selected.push(path);
    }
    selected
}

/// 初始化 brain 目录骨架（cata init）
pub fn init_brain_dir(paths: &BrainPaths) -> Result<()> {
    for dir in [
        paths.root().to_path_buf(),
        paths.archive_dir(),
        paths.long_term_dir(),
        paths.skills_dir(),
    ] {
        std::fs::create_dir_all(dir)?;
    }
    if let Some(short_dir) = paths.short_term_current().parent() {
        std::fs::create_dir_all(short_dir)?;
    }
    if !paths.hot().exists() {
        std::fs::write(paths.hot(), HOT_TEMPLATE)?;
    }
    Ok(())
}

pub struct FileMemory {
    paths: BrainPaths,
    limits: MemorySection,
    index_file: JsonFile,
    index: Mutex<MemoryIndex>,
    rotation: Mutex<()>,
    summarizer: Option<Arc<dyn LlmClient>>,
}

impl FileMemory {
    /// 加载索引；索引缺失、为空或版本不符时从 markdown 重建
    pub fn open(paths: BrainPaths, limits: MemorySection) -> Self {
        let index_file = JsonFile::new(paths.memory_index());
        let loaded = match index_file.load::<MemoryIndex>() {
            Ok(Some(idx)) if idx.version == INDEX_VERSION && !idx.entries.is_empty() => Some(idx),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "memory index unreadable, rebuilding");
                None
            }
        };
        let index = loaded.unwrap_or_else(|| {
            let mut idx = build_index(&paths);
            idx.touch();
            if !idx.entries.is_empty() {
                if let Err(e) = index_file.save(&idx) {
                    tracing::warn!(error = %e, "failed to save rebuilt memory index");
                }
            }
            idx
        });

        Self {
            paths,
            limits,
            index_file,
            index: Mutex::new(index),
            rotation: Mutex::new(()),
            summarizer: None,
        }
    }

    /// 压缩 archive 时用 oracle 生成摘要；未设置时直接合并原文
    pub fn with_summarizer(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.summarizer = Some(llm);
        self
    }

    pub fn paths(&self) -> &BrainPaths {
        &self.paths
    }

    async fn save_index(&self, idx: &mut MemoryIndex) -> Result<()> {
        idx.touch();
        self.index_file.save_async(idx).await
    }

    async fn reindex_file(&self, idx: &mut MemoryIndex, path: &Path) {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => idx.upsert(index::entry_for(path, &content)),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to re-read memory file"),
        }
    }

    fn archive_path_for(&self, date: &str) -> PathBuf {
        self.paths.archive_dir().join(format!("{}.md", date))
    }

    async fn archive_listing(&self) -> Result<Vec<(PathBuf, std::fs::Metadata)>> {
        let dir = self.paths.archive_dir();
        blocking(move || Ok(archive_files(&dir))).await
    }
}

fn build_index(paths: &BrainPaths) -> MemoryIndex {
    let backup = paths.archive_backup_dir();
    let context_dir = paths.integrated_prompt().parent().map(Path::to_path_buf);
    let mut idx = MemoryIndex::default();

    for entry in WalkDir::new(paths.root())
        .into_iter()
        .filter_entry(|e| {
            let p = e.path();
            p != backup && context_dir.as_deref().map_or(true, |c| p != c)
        })
        .flatten()
    {
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().map_or(true, |x| x != "md") {
            continue;
        }
        match std::fs::read_to_string(path) {
            Ok(content) => idx.entries.push(index::entry_for(path, &content)),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skip unreadable markdown"),
        }
    }
    idx
}

/// 按固定顺序拼接 core / workflow / hot / long-term / short-term / archive，写入集成视图文件
fn render_integrated_context(p: &BrainPaths) -> Result<(PathBuf, usize)> {
    let mut out = String::new();

    let section = |title: &str, path: &Path, out: &mut String| {
        if let Ok(data) = std::fs::read_to_string(path) {
            out.push_str(&format!("---\n# {}\n---\n\n{}\n\n", title, data.trim_end()));
        }
    };
    section("Core（核心思维）", &p.core_doc(), &mut out);
    section("Workflow（自主演进流程）", &p.workflow_doc(), &mut out);
    section("Hot（热记忆）", &p.hot(), &mut out);

    let sorted_md = |dir: &Path| -> Vec<PathBuf> {
        let mut v: Vec<PathBuf> = std::fs::read_dir(dir)
            .map(|rd| {
                rd.flatten()
                    .map(|e| e.path())
                    .filter(|p| p.is_file() && p.extension().map_or(false, |x| x == "md"))
                    .collect()
            })
            .unwrap_or_default();
        v.sort();
        v
    };

    for path in sorted_md(&p.long_term_dir()) {
        let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        section(&format!("Long-term / {}", name), &path, &mut out);
    }
    section("Short-term（当前会话）", &p.short_term_current(), &mut out);

    let archive = sorted_md(&p.archive_dir());
    if !archive.is_empty() {
        out.push_str("---\n# Archive（档案）\n---\n\n");
        for path in archive {
            if let Ok(data) = std::fs::read_to_string(&path) {
                let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
                out.push_str(&format!("## {}\n\n{}\n\n", name, data.trim_end()));
            }
        }
    }

    let content = out.trim().to_string();
    let target = p.integrated_prompt();
    crate::core::write_atomic(&target, content.as_bytes())?;
    Ok((target, content.len()))
}

#[async_trait]
impl MemoryStore for FileMemory {
    async fn consolidate(&self, topic: &str, content: &str) -> Result<PathBuf> {
        let mut idx = self.index.lock().await;

        let path = match target_for(topic) {
            Target::Hot => {
                let hot = self.paths.hot();
                if !exists(&hot).await {
                    append(&hot, HOT_TEMPLATE).await?;
                }
                append(&hot, &format!("\n\n## {}\n\n{}\n", topic, content.trim_end())).await?;
                hot
            }
            Target::LongTerm => {
                let path = self.paths.long_term_dir().join(format!("{}.md", slug(topic)));
                if !exists(&path).await {
                    append(&path, &format!("# {}\n", topic)).await?;
                }
                let stamp = Local::now().format("%Y-%m-%d %H:%M");
                append(&path, &format!("\n## {}\n\n{}\n", stamp, content.trim_end())).await?;
                path
            }
            Target::Archive => {
                let date = today();
                let path = self.archive_path_for(&date);
                if !exists(&path).await {
                    append(&path, &format!("# {}\n\n", date)).await?;
                }
                append(&path, &format!("\n## {}\n\n{}\n", topic, content.trim_end())).await?;
                path
            }
        };

        self.reindex_file(&mut idx, &path).await;
        self.save_index(&mut idx).await?;
        tracing::debug!(topic, path = %path.display(), "memory consolidated");
        Ok(path)
    }

    async fn recall(
        &self,
        query: &str,
        top_k: usize,
        category: Option<&str>,
        domain: Option<&str>,
    ) -> Result<Vec<MemoryPiece>> {
        let top_k = if top_k == 0 { DEFAULT_TOP_K } else { top_k };
        // 只在锁内打分，读文件在锁外进行
        let candidates: Vec<(f64, index::IndexEntry)> = {
            let idx = self.index.lock().await;
            idx.entries
                .iter()
                .filter(|e| category.map_or(true, |c| c.is_empty() || e.category == c))
                .filter(|e| domain.map_or(true, |d| d.is_empty() || index::matches_domain(&e.source, d)))
                .map(|e| (index::score(e, query), e.clone()))
                .filter(|(score, _)| *score > 0.0)
                .collect()
        };

        let mut scored: Vec<(f64, MemoryPiece)> = Vec::new();
        for (score, entry) in candidates {
            let Ok(content) = tokio::fs::read_to_string(&entry.source).await else {
                continue;
            };
            scored.push((
                score,
                MemoryPiece {
                    content,
                    category: entry.category,
                    source: entry.source,
                    priority: entry.priority,
                },
            ));
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(top_k).map(|(_, p)| p).collect())
    }

    async fn check_summarize_trigger(&self) -> (bool, String) {
        let files = self.archive_listing().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "archive listing failed");
            Vec::new()
        });
        let count = files.len();
        let size: u64 = files.iter().map(|(_, m)| m.len()).sum();

        let mut reasons = Vec::new();
        if count > self.limits.max_archive_files {
            reasons.push(format!("file count ({} > {})", count, self.limits.max_archive_files));
        }
        if size > self.limits.max_archive_size {
            reasons.push(format!("total size ({} > {})", size, self.limits.max_archive_size));
        }
        if reasons.is_empty() {
            (false, String::new())
        } else {
            (true, format!("Archive limits exceeded: {}", reasons.join(", ")))
        }
    }

    async fn summarize_and_rotate(&self) -> Result<RotateReport> {
        let _rotating = self.rotation.lock().await;

        let archive_dir = self.paths.archive_dir();
        let selected = blocking(move || Ok(select_rotation(&archive_dir))).await?;
        if selected.is_empty() {
            tracing::info!("no archive files to summarize");
            return Ok(RotateReport::default());
        }

        let mut combined = String::new();
        let mut names = Vec::new();
        for path in &selected {
            match tokio::fs::read_to_string(path).await {
                Ok(text) => {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default();
                    combined.push_str(&format!("## {}\n\n{}\n\n", name, text.trim()));
                    names.push(name);
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skip unreadable archive file"),
            }
        }
        if names.is_empty() {
            return Ok(RotateReport::default());
        }

        let summary = match &self.summarizer {
            Some(llm) => llm
                .complete(&[
                    Message::system(SUMMARY_INSTRUCTIONS),
                    Message::user(combined.clone()),
                ])
                .await
                .map_err(|e| CataError::Memory(format!("summary generation failed: {}", e)))?,
            None => combined.clone(),
        };

        let mut idx = self.index.lock().await;
        let now = Local::now();
        let ym = now.format("%Y-%m").to_string();
        let summary_path = self.paths.archive_dir().join(BrainPaths::archive_summary_name(&ym));
        let mut section = format!(
            "# {} 摘要\n\n生成时间: {}\n\n## 原始文件\n\n",
            ym,
            now.format("%Y-%m-%d %H:%M:%S")
        );
        for n in &names {
            section.push_str(&format!("- {}\n", n));
        }
        section.push_str(&format!("\n## 摘要内容\n\n{}\n", summary.trim()));
        if exists(&summary_path).await {
            append(&summary_path, &format!("\n\n---\n\n{}", section)).await?;
        } else {
            append(&summary_path, &section).await?;
        }

        let backup = self.paths.archive_backup_dir();
        tokio::fs::create_dir_all(&backup).await?;
        for path in &selected {
            let Some(name) = path.file_name() else { continue };
            if let Err(e) = tokio::fs::rename(path, backup.join(name)).await {
                tracing::warn!(path = %path.display(), error = %e, "move to backup failed, removing");
                if let Err(e) = tokio::fs::remove_file(path).await {
                    tracing::warn!(path = %path.display(), error = %e, "remove failed");
                }
            }
            idx.remove(&path.to_string_lossy());
        }

        self.reindex_file(&mut idx, &summary_path).await;
        self.save_index(&mut idx).await?;
        tracing::info!(files = names.len(), summary = %summary_path.display(), "archive summarized");

        Ok(RotateReport {
            summarized: names,
            summary_file: Some(summary_path),
        })
    }

    async fn stats(&self) -> Result<MemoryStats> {
        let files = self.archive_listing().await?;
        let hot_last_updated = tokio::fs::metadata(self.paths.hot())
            .await
            .and_then(|m| m.modified())
            .ok()
            .map(|t| DateTime::<Local>::from(t).to_rfc3339_opts(SecondsFormat::Secs, false));
        let index_entry_count = self.index.lock().await.entries.len();
        Ok(MemoryStats {
            archive_file_count: files.len(),
            archive_total_size: files.iter().map(|(_, m)| m.len()).sum(),
            hot_last_updated,
            index_entry_count,
        })
    }

    async fn build_integrated_context(&self) -> Result<(PathBuf, usize)> {
        let _guard = self.index.lock().await;
        let paths = self.paths.clone();
        blocking(move || render_integrated_context(&paths)).await
    }

    async fn append_short_term(&self, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Ok(());
        }
        let _guard = self.index.lock().await;
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        append(
            &self.paths.short_term_current(),
            &format!("- [{}] {}\n", stamp, content.trim()),
        )
        .await?;
        Ok(())
    }

    async fn take_short_term(&self) -> Result<String> {
        let _guard = self.index.lock().await;
        let path = self.paths.short_term_current();
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(String::new()),
            Err(e) => return Err(e.into()),
        };
        tokio::fs::write(&path, "").await?;
        Ok(text)
    }

    async fn rebuild_index(&self) -> Result<usize> {
        let mut idx = self.index.lock().await;
        let paths = self.paths.clone();
        *idx = blocking(move || Ok(build_index(&paths))).await?;
        self.save_index(&mut idx).await?;
        Ok(idx.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    fn memory(dir: &Path) -> FileMemory {
        let paths = BrainPaths::new(dir.join("brain"), dir);
        init_brain_dir(&paths).unwrap();
        FileMemory::open(paths, MemorySection::default())
    }

    #[test]
    fn test_target_routing() {
        assert_eq!(target_for("我的偏好"), Target::Hot);
        assert_eq!(target_for("长期反思 2025"), Target::LongTerm);
        assert_eq!(target_for("meeting notes"), Target::Archive);
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("长期反思: Rust / tokio"), "长期反思-rust-tokio");
        assert_eq!(slug("///"), "notes");
    }

    #[tokio::test]
    async fn test_consolidate_then_recall() {
        let dir = tempfile::tempdir().unwrap();
        let mem = memory(dir.path());

        let path = mem
            .consolidate("tokio runtime", "learned about tokio select and intervals")
            .await
            .unwrap();
        assert!(path.starts_with(mem.paths().archive_dir()));

        let hits = mem.recall("tokio", 5, None, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.contains("select and intervals"));

        let none = mem.recall("tokio", 5, Some("preference"), None).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_short_term_take_clears() {
        let dir = tempfile::tempdir().unwrap();
        let mem = memory(dir.path());
        assert_eq!(mem.take_short_term().await.unwrap(), "");

        mem.append_short_term("first note").await.unwrap();
        mem.append_short_term("second note").await.unwrap();
        let text = mem.take_short_term().await.unwrap();
        assert!(text.contains("first note") && text.contains("second note"));
        assert_eq!(mem.take_short_term().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_trigger_ignores_summary_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = BrainPaths::new(dir.path().join("brain"), dir.path());
        init_brain_dir(&paths).unwrap();
        let limits = MemorySection {
            max_archive_files: 2,
            ..Default::default()
        };
        let mem = FileMemory::open(paths.clone(), limits);

        for name in ["2025-01-01.md", "2025-01-02.md", "summary-2025-01.md"] {
            std::fs::write(paths.archive_dir().join(name), "x").unwrap();
        }
        assert!(!mem.check_summarize_trigger().await.0);

        std::fs::write(paths.archive_dir().join("2025-01-03.md"), "x").unwrap();
        let (needs, reason) = mem.check_summarize_trigger().await;
        assert!(needs);
        assert!(reason.contains("file count (3 > 2)"));
    }

    #[tokio::test]
    async fn test_summarize_and_rotate_moves_to_backup() {
        let dir = tempfile::tempdir().unwrap();
        let paths = BrainPaths::new(dir.path().join("brain"), dir.path());
        init_brain_dir(&paths).unwrap();
        let mock = Arc::new(MockLlmClient::with_replies(["- compressed"]));
        let mem = FileMemory::open(paths.clone(), MemorySection::default()).with_summarizer(mock);

        std::fs::write(paths.archive_dir().join("2020-01-01.md"), "# old\n\nday one").unwrap();
        std::fs::write(paths.archive_dir().join("2020-01-02.md"), "# old\n\nday two").unwrap();

        let report = mem.summarize_and_rotate().await.unwrap();
        assert_eq!(report.summarized.len(), 2);
        let summary = std::fs::read_to_string(report.summary_file.unwrap()).unwrap();
        assert!(summary.contains("- compressed"));
        assert!(summary.contains("2020-01-01.md"));
        assert!(paths.archive_backup_dir().join("2020-01-01.md").exists());
        assert!(!paths.archive_dir().join("2020-01-01.md").exists());

        let again = mem.summarize_and_rotate().await.unwrap();
        assert!(again.summarized.is_empty());
    }

    /// 第一次被调用时通知 entered，然后等待 release
    struct GatedSummarizer {
        entered: Arc<tokio::sync::Notify>,
        release: Arc<tokio::sync::Notify>,
    }

    #[async_trait]
    impl LlmClient for GatedSummarizer {
        async fn complete(&self, _messages: &[Message]) -> std::result::Result<String, String> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok("- gated summary".to_string())
        }
    }

    #[tokio::test]
    async fn test_recall_proceeds_while_summarizer_runs() {
        let dir = tempfile::tempdir().unwrap();
        let paths = BrainPaths::new(dir.path().join("brain"), dir.path());
        init_brain_dir(&paths).unwrap();
        let entered = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());
        let mem = Arc::new(
            FileMemory::open(paths.clone(), MemorySection::default()).with_summarizer(Arc::new(
                GatedSummarizer {
                    entered: entered.clone(),
                    release: release.clone(),
                },
            )),
        );

        mem.consolidate("tokio runtime", "select loops").await.unwrap();
        std::fs::write(paths.archive_dir().join("2020-01-01.md"), "# old\n\nday one").unwrap();

        let rotating = tokio::spawn({
            let mem = mem.clone();
            async move { mem.summarize_and_rotate().await }
        });
        entered.notified().await;

        let hits = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            mem.recall("tokio", 5, None, None),
        )
        .await
        .expect("recall waited for the summarizer")
        .unwrap();
        assert_eq!(hits.len(), 1);
        mem.append_short_term("still writable").await.unwrap();

        release.notify_one();
        let report = rotating.await.unwrap().unwrap();
        assert_eq!(report.summarized, vec!["2020-01-01.md".to_string()]);
        assert!(paths.archive_backup_dir().join("2020-01-01.md").exists());
    }

    #[tokio::test]
    async fn test_integrated_context_and_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let mem = memory(dir.path());
        mem.consolidate("长期 架构", "daemon architecture notes").await.unwrap();

        let (path, size) = mem.build_integrated_context().await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.len(), size);
        assert!(text.contains("Hot（热记忆）"));
        assert!(text.contains("daemon architecture notes"));

        let count = mem.rebuild_index().await.unwrap();
        assert_eq!(count, 2);
    }
}
