//! skills-index.json：技能元数据目录
//!
//! 为 oracle 函数列表与 skill_list 提供描述；skill_get 按 path 读取对应的 SKILL.md。
//! 解析后不在 skills 目录内的 path 一律不读。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::{JsonFile, Result};

pub const SKILL_DOC: &str = "SKILL.md";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillMeta {
    pub name: String,
    /// 相对 skills 目录的技能目录（或 SKILL.md 路径）
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillsIndex {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub generated_at: String,
    #[serde(default)]
    pub skills: Vec<SkillMeta>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags_index: HashMap<String, Vec<String>>,
}

impl SkillsIndex {
    pub fn get(&self, name: &str) -> Option<&SkillMeta> {
        self.skills.iter().find(|s| s.name == name)
    }
}

/// 每次读取都从磁盘加载，文件不存在时为空索引
pub struct SkillsIndexLoader {
    file: JsonFile,
    skills_dir: PathBuf,
}

impl SkillsIndexLoader {
    pub fn new(index_path: impl AsRef<Path>, skills_dir: impl AsRef<Path>) -> Self {
        Self {
            file: JsonFile::new(index_path),
            skills_dir: skills_dir.as_ref().to_path_buf(),
        }
    }

    pub async fn load(&self) -> Result<SkillsIndex> {
        Ok(self.file.load_async::<SkillsIndex>().await?.unwrap_or_default())
    }

    /// 读取失败时记录并返回空索引
    pub async fn load_or_default(&self) -> SkillsIndex {
        self.load().await.unwrap_or_else(|e| {
            tracing::warn!(path = %self.file.path().display(), error = %e, "skills index unreadable");
            SkillsIndex::default()
        })
    }

    pub async fn meta(&self, name: &str) -> Option<SkillMeta> {
        self.load_or_default().await.get(name).cloned()
    }

    /// 元数据 path 指向的 SKILL.md；path 为目录时取其下的 SKILL.md
    pub fn doc_path(&self, meta: &SkillMeta) -> PathBuf {
        let rel = if meta.path.is_empty() {
            meta.name.as_str()
        } else {
            meta.path.as_str()
        };
        let p = self.skills_dir.join(rel);
        if p.extension().map_or(false, |x| x == "md") {
            p
        } else {
            p.join(SKILL_DOC)
        }
    }

    /// 读取 SKILL.md；文件缺失或解析后逃出 skills 目录时返回 None
    pub async fn read_doc(&self, meta: &SkillMeta) -> Option<String> {
        let path = self.doc_path(meta);
        let root = tokio::fs::canonicalize(&self.skills_dir).await.ok()?;
        let resolved = tokio::fs::canonicalize(&path).await.ok()?;
        if !resolved.starts_with(&root) {
            tracing::warn!(skill = %meta.name, path = %path.display(), "skill doc outside skills directory, ignored");
            return None;
        }
        tokio::fs::read_to_string(&resolved).await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_meta_and_doc() {
        let dir = tempfile::tempdir().unwrap();
        let skills = dir.path().join("skills");
        std::fs::create_dir_all(skills.join("backup")).unwrap();
        std::fs::write(skills.join("backup").join(SKILL_DOC), "# Backup\n").unwrap();
        std::fs::write(
            skills.join("skills-index.json"),
            r#"{"version":"1","generated_at":"x","skills":[
                {"name":"backup","path":"backup","description":"copy brain","tags":["ops"]},
                {"name":"notes","path":"notes/SKILL.md"}]}"#,
        )
        .unwrap();

        let loader = SkillsIndexLoader::new(skills.join("skills-index.json"), &skills);
        let meta = loader.meta("backup").await.unwrap();
        assert_eq!(meta.description, "copy brain");
        assert_eq!(loader.read_doc(&meta).await.unwrap(), "# Backup\n");

        let notes = loader.meta("notes").await.unwrap();
        assert_eq!(loader.doc_path(&notes), skills.join("notes/SKILL.md"));
        assert!(loader.read_doc(&notes).await.is_none());
        assert!(loader.meta("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_doc_outside_skills_dir_is_not_read() {
        let dir = tempfile::tempdir().unwrap();
        let skills = dir.path().join("skills");
        std::fs::create_dir_all(&skills).unwrap();
        let secret = dir.path().join("secret.md");
        std::fs::write(&secret, "token=abc").unwrap();
        std::fs::write(
            skills.join("skills-index.json"),
            format!(
                r#"{{"skills":[
                    {{"name":"escape","path":"../secret.md"}},
                    {{"name":"absolute","path":"{}"}}]}}"#,
                secret.display()
            ),
        )
        .unwrap();

        let loader = SkillsIndexLoader::new(skills.join("skills-index.json"), &skills);
        let escape = loader.meta("escape").await.unwrap();
        assert!(loader.read_doc(&escape).await.is_none());
        let absolute = loader.meta("absolute").await.unwrap();
        assert!(loader.read_doc(&absolute).await.is_none());
    }

    #[tokio::test]
    async fn test_missing_index_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loader = SkillsIndexLoader::new(dir.path().join("none.json"), dir.path());
        assert!(loader.load().await.unwrap().skills.is_empty());
    }
}
