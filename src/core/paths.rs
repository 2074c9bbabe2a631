//! brain 目录布局
//!
//! 所有持久化文件都相对 brain 根目录；`.cata/`（socket、技能开关、配置）位于 base 目录下。

use std::path::{Path, PathBuf};

/// brain 目录下各文件 / 子目录的路径集合
#[derive(Debug, Clone)]
pub struct BrainPaths {
    root: PathBuf,
    base: PathBuf,
}

impl BrainPaths {
    pub fn new(root: impl AsRef<Path>, base: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            base: base.as_ref().to_path_buf(),
        }
    }

    /// brain 根目录
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// base 目录（`.cata/` 所在处）
    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn join(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.root.join(rel)
    }

    pub fn boot_leader(&self) -> PathBuf {
        self.root.join("boot-leader.md")
    }

    pub fn core_doc(&self) -> PathBuf {
        self.root.join("core.md")
    }

    pub fn workflow_doc(&self) -> PathBuf {
        self.root.join("workflow.md")
    }

    pub fn hot(&self) -> PathBuf {
        self.root.join("hot.md")
    }

    pub fn memory_index(&self) -> PathBuf {
        self.root.join("memory_index.json")
    }

    pub fn evolution_log(&self) -> PathBuf {
        self.root.join("evolution_log.json")
    }

    pub fn task_queue(&self) -> PathBuf {
        self.root.join("task_queue.json")
    }

    pub fn capabilities(&self) -> PathBuf {
        self.root.join("capabilities.json")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join("archive")
    }

    /// 被 summarize 轮转掉的 archive 原文
    pub fn archive_backup_dir(&self) -> PathBuf {
        self.archive_dir().join("backup")
    }

    pub fn short_term_current(&self) -> PathBuf {
        self.root.join("memory/short-term/current_session.md")
    }

    pub fn long_term_dir(&self) -> PathBuf {
        self.root.join("memory/long-term")
    }

    pub fn integrated_prompt(&self) -> PathBuf {
        self.root.join("context/integrated_system_prompt.md")
    }

    pub fn skills_dir(&self) -> PathBuf {
        self.root.join("skills")
    }

    pub fn skills_index(&self) -> PathBuf {
        self.skills_dir().join("skills-index.json")
    }

    /// 技能启用 / 禁用开关
    pub fn skill_config(&self) -> PathBuf {
        self.base.join(".cata/skills.json")
    }

    pub fn default_socket(&self) -> PathBuf {
        self.base.join(".cata/cata.sock")
    }

    /// archive 中按月合并的摘要文件名
    pub fn archive_summary_name(year_month: &str) -> String {
        format!("summary-{}.md", year_month)
    }
}
