//! 技能启用配置：`.cata/skills.json` = `{"enabled": {name: bool}}`，未列出的技能默认启用

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{JsonFile, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillConfig {
    #[serde(default)]
    pub enabled: BTreeMap<String, bool>,
}

impl SkillConfig {
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.get(name).copied().unwrap_or(true)
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) {
        self.enabled.insert(name.to_string(), enabled);
    }
}

/// 配置文件读写
pub struct SkillConfigStore {
    file: JsonFile,
}

impl SkillConfigStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// 文件不存在时为默认配置（全部启用）
    pub fn load(&self) -> Result<SkillConfig> {
        Ok(self.file.load::<SkillConfig>()?.unwrap_or_default())
    }

    pub async fn save(&self, config: &SkillConfig) -> Result<()> {
        self.file.save_async(config).await
    }
}
