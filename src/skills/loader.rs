//! 脚本技能加载器
//!
//! 扫描 `<brain>/skills/*/skill.toml`，每个包含 `[skill]` 表的清单生成一个 [`ScriptSkill`]。
//!
//! ```text
//! skills/
//! ├── skills-index.json
//! └── backup/
//!     ├── skill.toml      # [skill] name / description / schedule / command / args ...
//!     ├── SKILL.md        # 说明文档（skill_get 返回）
//!     └── backup.sh
//! ```

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::core::{CataError, Result};

use super::registry::SkillRegistry;
use super::skill::{Skill, SkillContext};

pub const MANIFEST_FILE: &str = "skill.toml";
pub const DEFAULT_SCRIPT_TIMEOUT_SECS: u64 = 300;

fn default_timeout() -> u64 {
    DEFAULT_SCRIPT_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

/// skill.toml 中的 `[skill]` 表
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptManifest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub schedule: String,
    #[serde(default)]
    pub cli_command: Option<String>,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub oracle_visible: bool,
}

#[derive(Debug, Deserialize)]
struct ManifestToml {
    skill: ScriptManifest,
}

/// 以子进程方式运行的技能，工作目录为技能目录
#[derive(Debug, Clone)]
pub struct ScriptSkill {
    manifest: ScriptManifest,
    dir: PathBuf,
}

impl ScriptSkill {
    pub fn new(manifest: ScriptManifest, dir: impl AsRef<Path>) -> Self {
        Self {
            manifest,
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// 解析某个技能目录下的 skill.toml
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(dir.join(MANIFEST_FILE))?;
        let parsed: ManifestToml = toml::from_str(&text).map_err(|e| CataError::SkillFailed {
            name: dir.display().to_string(),
            message: format!("invalid {}: {}", MANIFEST_FILE, e),
        })?;
        Ok(Self::new(parsed.skill, dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest(&self) -> &ScriptManifest {
        &self.manifest
    }

    fn failed(&self, message: impl Into<String>) -> CataError {
        CataError::SkillFailed {
            name: self.manifest.name.clone(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Skill for ScriptSkill {
    fn name(&self) -> &str {
        &self.manifest.name
    }

    fn description(&self) -> &str {
        &self.manifest.description
    }

    fn schedule(&self) -> &str {
        &self.manifest.schedule
    }

    fn cli_command(&self) -> Option<&str> {
        self.manifest.cli_command.as_deref().filter(|c| !c.is_empty())
    }

    fn oracle_visible(&self) -> bool {
        self.manifest.oracle_visible
    }

    async fn run(&self, ctx: SkillContext, args: Vec<String>) -> Result<String> {
        let timeout = Duration::from_secs(self.manifest.timeout_secs.max(1));
        tracing::info!(
            skill = %self.manifest.name,
            command = %self.manifest.command,
            trigger = %ctx.trigger,
            "running script skill"
        );

        let mut cmd = Command::new(&self.manifest.command);
        cmd.args(&self.manifest.args)
            .args(&args)
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(self.failed("cancelled")),
            res = tokio::time::timeout(timeout, cmd.output()) => res
                .map_err(|_| self.failed(format!("timed out after {}s", timeout.as_secs())))?
                .map_err(|e| self.failed(format!("spawn failed: {}", e)))?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(self.failed(format!("exit {:?}: {}", output.status.code(), stderr)));
        }
        Ok(if stderr.is_empty() {
            stdout
        } else {
            format!("{}\nstderr: {}", stdout, stderr)
        })
    }
}

/// 扫描技能目录
pub struct SkillLoader {
    skills_dir: PathBuf,
}

impl SkillLoader {
    pub fn new(skills_dir: impl AsRef<Path>) -> Self {
        Self {
            skills_dir: skills_dir.as_ref().to_path_buf(),
        }
    }

    /// 读取所有清单；单个清单出错时跳过并记录
    pub fn load_all(&self) -> Vec<ScriptSkill> {
        let Ok(entries) = std::fs::read_dir(&self.skills_dir) else {
            return Vec::new();
        };
        let mut dirs: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_dir() && p.join(MANIFEST_FILE).exists())
            .collect();
        dirs.sort();

        dirs.iter()
            .filter_map(|dir| match ScriptSkill::from_dir(dir) {
                Ok(skill) if !skill.manifest.command.trim().is_empty() => Some(skill),
                Ok(_) => {
                    tracing::warn!(dir = %dir.display(), "script skill has empty command, skipped");
                    None
                }
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "failed to load script skill");
                    None
                }
            })
            .collect()
    }

    /// 加载并注册；重复名称等错误记录后跳过
    pub async fn register_all(&self, registry: &SkillRegistry) -> usize {
        let mut n = 0;
        for skill in self.load_all() {
            let name = skill.name().to_string();
            match registry.register(Arc::new(skill)).await {
                Ok(true) => n += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(skill = %name, error = %e, "script skill not registered"),
            }
        }
        tracing::info!(count = n, dir = %self.skills_dir.display(), "script skills loaded");
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::config::SkillConfigStore;
    use crate::skills::skill::Trigger;
    use tokio_util::sync::CancellationToken;

    fn write_manifest(root: &Path, dir: &str, body: &str) {
        let d = root.join(dir);
        std::fs::create_dir_all(&d).unwrap();
        std::fs::write(d.join(MANIFEST_FILE), body).unwrap();
    }

    #[test]
    fn test_load_all_skips_invalid() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "echo",
            "[skill]\nname = \"echo\"\ndescription = \"say hi\"\nschedule = \"03:30\"\ncommand = \"echo\"\nargs = [\"hi\"]\n",
        );
        write_manifest(dir.path(), "broken", "this is not toml = [");

        let skills = SkillLoader::new(dir.path()).load_all();
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].name(), "echo");
        assert_eq!(skills[0].schedule(), "03:30");
        assert_eq!(skills[0].manifest().timeout_secs, DEFAULT_SCRIPT_TIMEOUT_SECS);
        assert!(skills[0].oracle_visible());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script_runs_in_skill_dir_with_args() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "echo",
            "[skill]\nname = \"echo\"\ncommand = \"echo\"\nargs = [\"hello\"]\n",
        );
        let skill = ScriptSkill::from_dir(&dir.path().join("echo")).unwrap();
        let ctx = SkillContext::new(CancellationToken::new(), Trigger::Command);
        let out = skill.run(ctx, vec!["world".into()]).await.unwrap();
        assert_eq!(out, "hello world");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script_timeout() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "slow",
            "[skill]\nname = \"slow\"\ncommand = \"sleep\"\nargs = [\"5\"]\ntimeout_secs = 1\n",
        );
        let skill = ScriptSkill::from_dir(&dir.path().join("slow")).unwrap();
        let ctx = SkillContext::new(CancellationToken::new(), Trigger::Command);
        let err = skill.run(ctx, vec![]).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_register_all() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "a",
            "[skill]\nname = \"dup\"\ncommand = \"true\"\n",
        );
        write_manifest(
            dir.path(),
            "b",
            "[skill]\nname = \"dup\"\ncommand = \"true\"\n",
        );
        let registry =
            SkillRegistry::load(SkillConfigStore::new(dir.path().join("skills.json"))).unwrap();
        assert_eq!(SkillLoader::new(dir.path()).register_all(&registry).await, 1);
    }
}
