//! Cata 守护进程入口
//!
//! `cata init` 初始化 brain 目录并写出默认配置；`cata run` 启动守护进程；
//! `cata config show` 打印生效的配置。

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use cata::config::{load_config, AppConfig};
use cata::memory::markdown_store::init_brain_dir;
use cata::{observability, server};

#[derive(Parser)]
#[command(name = "cata", version, about = "自主演进的记忆与任务守护进程")]
struct Cli {
    /// 配置文件路径（默认 CATA_CONFIG_FILE 或 .cata/config.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// 创建 brain 目录骨架并写出默认配置
    Init {
        /// 覆盖已有的配置文件
        #[arg(long)]
        force: bool,
    },
    /// 启动守护进程（默认）
    Run,
    /// 配置相关
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// 打印生效的配置（TOML）
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.clone()).context("Failed to load config")?;
    observability::init(&config.server.log_level);

    match cli.command.unwrap_or(Command::Run) {
        Command::Init { force } => init(&config, cli.config, force),
        Command::Run => server::run(config).await,
        Command::Config {
            action: ConfigAction::Show,
        } => {
            print!("{}", config.to_toml().context("Failed to serialize config")?);
            Ok(())
        }
    }
}

fn init(config: &AppConfig, config_path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let paths = config.paths();
    init_brain_dir(&paths).context("Failed to initialize brain directory")?;
    println!("brain: {}", paths.root().display());

    let path = config_path.unwrap_or_else(|| paths.base().join(cata::config::DEFAULT_CONFIG_FILE));
    if path.exists() && !force {
        println!("config: {} (exists, use --force to overwrite)", path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let body = config.to_toml().context("Failed to serialize config")?;
    std::fs::write(&path, body).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("config: {}", path.display());
    Ok(())
}
