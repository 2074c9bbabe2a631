//! 应用配置：从 .cata/config.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件（`CATA_CONFIG_FILE` 或 `<base>/.cata/config.toml`），再用环境变量
//! `CATA__*` 覆盖（双下划线表示嵌套，如 `CATA__LLM__PROVIDER=deepseek`）。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::BrainPaths;

/// 指定 brain 目录的环境变量（优先级高于配置文件）
pub const ENV_BRAIN_DIR: &str = "CATA_BRAIN_DIR";
/// 指定配置文件路径的环境变量
pub const ENV_CONFIG_FILE: &str = "CATA_CONFIG_FILE";
/// 默认配置文件（相对 base 目录）
pub const DEFAULT_CONFIG_FILE: &str = ".cata/config.toml";

/// 应用配置根
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub brain: BrainSection,
    pub llm: LlmSection,
    pub server: ServerSection,
    pub evolution: EvolutionSection,
    pub memory: MemorySection,
}

/// [brain] 段：brain 目录与 base 目录
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrainSection {
    /// brain 目录，未设置时用 ./brain
    pub dir: Option<PathBuf>,
    /// base 目录（.cata/ 所在处），未设置时为 brain 目录的上一级
    pub base_dir: Option<PathBuf>,
}

/// [llm] 段：决策 oracle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// openai / deepseek / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// 未设置时回退到 OPENAI_API_KEY / DEEPSEEK_API_KEY
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// 单次请求超时（秒）
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: default_provider(),
            model: None,
            base_url: None,
            api_key: None,
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_llm_timeout() -> u64 {
    60
}

/// [server] 段：控制 socket 与日志级别
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// socket 路径（相对路径按 base 目录解析）
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            socket_path: None,
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// [evolution] 段：决策循环节奏
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 完整决策循环间隔（秒）
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,
    /// 队列检查间隔（秒）
    #[serde(default = "default_queue_interval")]
    pub queue_interval_secs: u64,
    /// 决策对话历史上限（消息条数）
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// 退出前的宽限时间（毫秒）
    #[serde(default = "default_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for EvolutionSection {
    fn default() -> Self {
        Self {
            enabled: true,
            cycle_interval_secs: default_cycle_interval(),
            queue_interval_secs: default_queue_interval(),
            history_limit: default_history_limit(),
            shutdown_grace_ms: default_grace_ms(),
        }
    }
}

impl EvolutionSection {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs.max(1))
    }

    pub fn queue_interval(&self) -> Duration {
        Duration::from_secs(self.queue_interval_secs.max(1))
    }
}

fn default_cycle_interval() -> u64 {
    3600
}

fn default_queue_interval() -> u64 {
    30
}

fn default_history_limit() -> usize {
    20
}

fn default_grace_ms() -> u64 {
    100
}

/// [memory] 段：archive 压缩阈值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySection {
    #[serde(default = "default_max_archive_files")]
    pub max_archive_files: usize,
    /// archive 总大小上限（字节）
    #[serde(default = "default_max_archive_size")]
    pub max_archive_size: u64,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            max_archive_files: default_max_archive_files(),
            max_archive_size: default_max_archive_size(),
        }
    }
}

fn default_max_archive_files() -> usize {
    30
}

fn default_max_archive_size() -> u64 {
    10 * 1024 * 1024
}

impl AppConfig {
    /// brain 根目录：CATA_BRAIN_DIR > [brain].dir > ./brain
    pub fn brain_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var(ENV_BRAIN_DIR) {
            if !dir.trim().is_empty() {
                return PathBuf::from(dir);
            }
        }
        self.brain
            .dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("brain"))
    }

    /// base 目录：[brain].base_dir > brain 目录的上一级 > 当前目录
    pub fn base_dir(&self) -> PathBuf {
        if let Some(base) = &self.brain.base_dir {
            return base.clone();
        }
        self.brain_dir()
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn paths(&self) -> BrainPaths {
        BrainPaths::new(self.brain_dir(), self.base_dir())
    }

    /// 控制 socket 路径
    pub fn socket_path(&self) -> PathBuf {
        match &self.server.socket_path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => self.base_dir().join(p),
            None => self.paths().default_socket(),
        }
    }

    /// 序列化为 TOML（cata init / cata config show）
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// 配置文件路径：CATA_CONFIG_FILE > ./.cata/config.toml
pub fn config_file_path() -> PathBuf {
    match std::env::var(ENV_CONFIG_FILE) {
        Ok(p) if !p.trim().is_empty() => PathBuf::from(p),
        _ => PathBuf::from(DEFAULT_CONFIG_FILE),
    }
}

/// 加载配置，环境变量 CATA__* 可覆盖
///
/// 1. 传入 config_path 时使用它，否则用 [`config_file_path`]；文件不存在不报错
/// 2. 叠加环境变量 CATA__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let path = config_path.unwrap_or_else(config_file_path);

    let mut builder = config::Config::builder();
    if path.exists() {
        builder = builder.add_source(
            config::File::from(path)
                .format(config::FileFormat::Toml)
                .required(false),
        );
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CATA")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.timeout_secs, 60);
        assert_eq!(cfg.evolution.history_limit, 20);
        assert_eq!(cfg.evolution.queue_interval_secs, 30);
        assert_eq!(cfg.memory.max_archive_files, 30);
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[llm]\nprovider = \"mock\"\ntimeout_secs = 5\n\n[evolution]\ncycle_interval_secs = 120\n",
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.llm.timeout_secs, 5);
        assert_eq!(cfg.evolution.cycle_interval_secs, 120);
        assert_eq!(cfg.evolution.queue_interval_secs, 30);
    }

    #[test]
    fn test_socket_path_relative_to_base() {
        let mut cfg = AppConfig::default();
        cfg.brain.dir = Some(PathBuf::from("/srv/cata/brain"));
        cfg.brain.base_dir = Some(PathBuf::from("/srv/cata"));
        assert_eq!(cfg.socket_path(), PathBuf::from("/srv/cata/.cata/cata.sock"));

        cfg.server.socket_path = Some(PathBuf::from("run/c.sock"));
        assert_eq!(cfg.socket_path(), PathBuf::from("/srv/cata/run/c.sock"));
    }

    #[test]
    fn test_toml_round_trip() {
        let cfg = AppConfig::default();
        let text = cfg.to_toml().unwrap();
        let back: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.llm.provider, cfg.llm.provider);
        assert_eq!(back.memory.max_archive_size, cfg.memory.max_archive_size);
    }
}
