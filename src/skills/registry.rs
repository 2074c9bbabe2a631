//! 技能注册表
//!
//! 名称到技能的映射，受 `.cata/skills.json` 开关过滤：被禁用的技能不注册。
//! enable 只持久化开关，重启后生效；disable 同时从当前映射中移除。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::core::{CataError, Result};

use super::config::{SkillConfig, SkillConfigStore};
use super::skill::Skill;

pub struct SkillRegistry {
    skills: RwLock<HashMap<String, Arc<dyn Skill>>>,
    config: RwLock<SkillConfig>,
    store: SkillConfigStore,
}

impl SkillRegistry {
    /// 加载开关配置；配置文件损坏时返回错误
    pub fn load(store: SkillConfigStore) -> Result<Self> {
        let config = store.load()?;
        Ok(Self {
            skills: RwLock::new(HashMap::new()),
            config: RwLock::new(config),
            store,
        })
    }

    /// 注册技能；被配置禁用时返回 Ok(false)
    pub async fn register(&self, skill: Arc<dyn Skill>) -> Result<bool> {
        let name = skill.name().trim().to_string();
        if name.is_empty() {
            return Err(CataError::EmptySkillName);
        }
        if !self.config.read().await.is_enabled(&name) {
            tracing::info!(skill = %name, "skill disabled by config, not registered");
            return Ok(false);
        }

        let mut skills = self.skills.write().await;
        if skills.contains_key(&name) {
            return Err(CataError::DuplicateSkill(name));
        }
        tracing::debug!(skill = %name, schedule = skill.schedule(), "skill registered");
        skills.insert(name, skill);
        Ok(true)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Skill>> {
        self.skills.read().await.get(name).cloned()
    }

    pub async fn get_by_cli_command(&self, cmd: &str) -> Option<Arc<dyn Skill>> {
        self.skills
            .read()
            .await
            .values()
            .find(|s| s.cli_command() == Some(cmd))
            .cloned()
    }

    /// 按名称排序
    pub async fn list(&self) -> Vec<Arc<dyn Skill>> {
        let mut all: Vec<_> = self.skills.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    pub async fn with_schedule(&self) -> Vec<Arc<dyn Skill>> {
        self.list()
            .await
            .into_iter()
            .filter(|s| !s.schedule().trim().is_empty())
            .collect()
    }

    pub async fn oracle_visible(&self) -> Vec<Arc<dyn Skill>> {
        self.list()
            .await
            .into_iter()
            .filter(|s| s.oracle_visible())
            .collect()
    }

    pub async fn enable(&self, name: &str) -> Result<()> {
        self.set_flag(name, true).await
    }

    pub async fn disable(&self, name: &str) -> Result<()> {
        self.set_flag(name, false).await?;
        if self.skills.write().await.remove(name).is_some() {
            tracing::info!(skill = %name, "skill removed from registry");
        }
        Ok(())
    }

    pub async fn is_enabled(&self, name: &str) -> bool {
        self.config.read().await.is_enabled(name)
    }

    /// 当前是否在注册表中
    pub async fn is_registered(&self, name: &str) -> bool {
        self.skills.read().await.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.skills.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.skills.read().await.is_empty()
    }

    async fn set_flag(&self, name: &str, enabled: bool) -> Result<()> {
        if name.trim().is_empty() {
            return Err(CataError::EmptySkillName);
        }
        let mut config = self.config.write().await;
        config.set_enabled(name, enabled);
        self.store.save(&config).await?;
        tracing::info!(skill = %name, enabled, "skill flag saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::skill::SkillContext;
    use async_trait::async_trait;

    struct Named(&'static str, &'static str);

    #[async_trait]
    impl Skill for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "test skill"
        }
        fn schedule(&self) -> &str {
            self.1
        }
        fn cli_command(&self) -> Option<&str> {
            Some("do-it")
        }
        async fn run(&self, _ctx: SkillContext, _args: Vec<String>) -> Result<String> {
            Ok(String::new())
        }
    }

    fn registry(dir: &std::path::Path) -> SkillRegistry {
        SkillRegistry::load(SkillConfigStore::new(dir.join(".cata/skills.json"))).unwrap()
    }

    #[tokio::test]
    async fn test_register_rejects_empty_and_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());

        assert!(matches!(
            reg.register(Arc::new(Named("", ""))).await,
            Err(CataError::EmptySkillName)
        ));
        assert!(reg.register(Arc::new(Named("b", "02:00"))).await.unwrap());
        assert!(reg.register(Arc::new(Named("a", ""))).await.unwrap());
        assert!(matches!(
            reg.register(Arc::new(Named("a", ""))).await,
            Err(CataError::DuplicateSkill(n)) if n == "a"
        ));

        let names: Vec<String> = reg.list().await.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(reg.with_schedule().await.len(), 1);
        assert!(reg.get_by_cli_command("do-it").await.is_some());
    }

    #[tokio::test]
    async fn test_disable_persists_and_blocks_registration() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        reg.register(Arc::new(Named("noisy", ""))).await.unwrap();

        reg.disable("noisy").await.unwrap();
        assert!(reg.get("noisy").await.is_none());

        // 新进程读到同一份配置
        let reloaded = registry(dir.path());
        assert!(!reloaded.is_enabled("noisy").await);
        assert!(!reloaded.register(Arc::new(Named("noisy", ""))).await.unwrap());

        reloaded.enable("noisy").await.unwrap();
        assert!(!reloaded.is_registered("noisy").await);
        assert!(registry(dir.path()).is_enabled("noisy").await);
    }
}
