//! catacli：通过本地 socket 向 cata 守护进程发送控制命令，打印 JSON 响应

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use cata::config::load_config;
use cata::server::{ControlClient, Request};

#[derive(Parser)]
#[command(name = "catacli", version, about = "cata 守护进程控制客户端")]
struct Cli {
    /// socket 路径（默认取配置中的 server.socket_path）
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// 配置文件路径
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 检查守护进程是否在线
    Ping,
    /// 检索记忆：<query> [topK] [--category C] [--domain D]
    Recall {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },
    /// 写入记忆：<topic> <content...>
    Consolidate {
        topic: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        content: Vec<String>,
    },
    /// 记忆摘要：[query] [--since 7d|--week|--month]
    Digest {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// 技能管理
    Skill {
        #[command(subcommand)]
        action: SkillAction,
    },
    /// 演进循环：status | history [n] | once
    Evolve {
        #[arg(trailing_var_arg = true, required = true)]
        args: Vec<String>,
    },
    /// 任务：create [type] <steps...> [--async] [--priority N] | list [status] [limit] | status <id>
    Task {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },
}

#[derive(Subcommand)]
enum SkillAction {
    List,
    Get { name: String },
    Enable { name: String },
    Disable { name: String },
    /// 立即运行：<name-or-cli-command> [args...]
    Run {
        target: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn to_request(command: Command) -> Request {
    let none = Vec::<String>::new();
    match command {
        Command::Ping => Request::new("ping", none),
        Command::Recall { args } => Request::new("recall", args),
        Command::Consolidate { topic, content } => {
            Request::new("consolidate", std::iter::once(topic).chain(content))
        }
        Command::Digest { args } => Request::new("digest", args),
        Command::Skill { action } => match action {
            SkillAction::List => Request::new("skill_list", none),
            SkillAction::Get { name } => Request::new("skill_get", [name]),
            SkillAction::Enable { name } => Request::new("skill_enable", [name]),
            SkillAction::Disable { name } => Request::new("skill_disable", [name]),
            SkillAction::Run { target, args } => {
                Request::new("skill_run", std::iter::once(target).chain(args))
            }
        },
        Command::Evolve { args } => Request::new("evolve", args),
        Command::Task { args } => Request::new("task", args),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let socket = match cli.socket {
        Some(path) => path,
        None => load_config(cli.config)
            .context("Failed to load config")?
            .socket_path(),
    };

    let request = to_request(cli.command);
    let client = ControlClient::new(&socket);
    let response = client
        .send(&request)
        .await
        .with_context(|| format!("Failed to reach cata daemon at {}", socket.display()))?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    if !response.success {
        std::process::exit(1);
    }
    Ok(())
}
