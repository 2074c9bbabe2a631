//! 技能系统
//!
//! 技能（Skill）是可被每日定时器、决策 oracle 或控制命令直接调用的命名能力。
//! 来源有两类：静态链接的内置技能，以及 `skill.toml` 声明的脚本技能。
//!
//! 目录结构：
//! ```text
//! <brain>/skills/
//! ├── skills-index.json   # 元数据目录（描述、版本、标签）
//! └── backup/
//!     ├── skill.toml      # [skill] 清单
//!     └── SKILL.md        # 说明文档
//! <base>/.cata/skills.json  # 启用开关
//! ```

pub mod builtin;
pub mod config;
pub mod index;
pub mod loader;
pub mod registry;
pub mod scheduler;
pub mod skill;

pub use builtin::{register_builtin, DailyConsolidateSkill, PeriodicSummarizeSkill};
pub use config::{SkillConfig, SkillConfigStore};
pub use index::{SkillMeta, SkillsIndex, SkillsIndexLoader};
pub use loader::{ScriptManifest, ScriptSkill, SkillLoader};
pub use registry::SkillRegistry;
pub use scheduler::{next_occurrence, parse_daily_schedule, Scheduler};
pub use skill::{Skill, SkillContext, Trigger};
