//! 守护进程装配与运行
//!
//! [`AppContext::build`] 按依赖顺序构造所有共享组件：brain 目录 → oracle → 记忆 → 队列 / 日志 →
//! 技能注册表（内置 + 脚本）→ 调度器 → 演进引擎。[`run`] 在此基础上启动监听器、引擎循环与定时器，
//! 并把清理项交给 [`ShutdownCoordinator`]。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::{
    run_until_shutdown, BrainPaths, FnCleanup, Result, ShutdownCleanup, ShutdownCoordinator,
    ShutdownManager,
};
use crate::evolution::{EngineParts, EvolutionEngine, EvolutionLogStore, TaskQueue};
use crate::llm::{create_client, LlmClient};
use crate::memory::markdown_store::init_brain_dir;
use crate::memory::{FileMemory, MemoryStore};
use crate::skills::{register_builtin, Scheduler, SkillConfigStore, SkillLoader, SkillRegistry, SkillsIndexLoader};

use super::socket::ControlServer;

/// 控制命令处理所需的全部共享组件
pub struct AppContext {
    pub config: AppConfig,
    pub paths: BrainPaths,
    pub memory: Arc<dyn MemoryStore>,
    pub llm: Arc<dyn LlmClient>,
    pub skills: Arc<SkillRegistry>,
    pub skills_index: SkillsIndexLoader,
    pub scheduler: Arc<Scheduler>,
    pub engine: Arc<EvolutionEngine>,
    pub shutdown: CancellationToken,
}

impl AppContext {
    /// `llm` 为 None 时按 [llm] 配置创建；没有可用配置时返回 OracleUnavailable
    pub async fn build(
        config: AppConfig,
        llm: Option<Arc<dyn LlmClient>>,
        shutdown: CancellationToken,
    ) -> Result<Arc<Self>> {
        let paths = config.paths();
        init_brain_dir(&paths)?;

        let llm = match llm {
            Some(llm) => llm,
            None => create_client(&config.llm)?,
        };
        tracing::info!(model = llm.model_name(), brain = %paths.root().display(), "building app context");

        let memory: Arc<dyn MemoryStore> = Arc::new(
            FileMemory::open(paths.clone(), config.memory.clone()).with_summarizer(llm.clone()),
        );
        let queue = Arc::new(TaskQueue::load(paths.task_queue()));
        let log = Arc::new(EvolutionLogStore::new(paths.evolution_log()));

        let skills = Arc::new(SkillRegistry::load(SkillConfigStore::new(paths.skill_config()))?);
        let builtin = register_builtin(&skills, memory.clone()).await?;
        let scripts = SkillLoader::new(paths.skills_dir()).register_all(&skills).await;
        tracing::info!(builtin, scripts, "skills registered");

        let scheduler = Arc::new(Scheduler::new(skills.clone(), shutdown.clone()));
        let engine = EvolutionEngine::new(
            config.evolution.clone(),
            EngineParts {
                queue,
                log,
                memory: memory.clone(),
                llm: llm.clone(),
                skills: skills.clone(),
                skills_index: SkillsIndexLoader::new(paths.skills_index(), paths.skills_dir()),
                capabilities_path: paths.capabilities(),
            },
        )
        .with_shutdown(shutdown.clone());

        Ok(Arc::new(Self {
            skills_index: SkillsIndexLoader::new(paths.skills_index(), paths.skills_dir()),
            config,
            paths,
            memory,
            llm,
            skills,
            scheduler,
            engine: Arc::new(engine),
            shutdown,
        }))
    }

    pub fn socket_path(&self) -> PathBuf {
        self.config.socket_path()
    }
}

/// 关闭时取消所有每日定时器
struct StopScheduler(Arc<Scheduler>);

#[async_trait]
impl ShutdownCleanup for StopScheduler {
    async fn cleanup(&self) -> anyhow::Result<()> {
        self.0.stop().await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scheduler"
    }
}

/// 关闭时把内存中的队列落盘
struct FlushQueue(Arc<TaskQueue>);

#[async_trait]
impl ShutdownCleanup for FlushQueue {
    async fn cleanup(&self) -> anyhow::Result<()> {
        self.0.flush().await.context("failed to flush task queue")
    }

    fn name(&self) -> &'static str {
        "task-queue"
    }
}

/// 按配置启动守护进程，直到收到 SIGINT / SIGTERM
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    run_with(config, None, Arc::new(ShutdownManager::new())).await
}

/// 可注入 oracle 与关闭管理器的入口（集成测试使用）
pub async fn run_with(
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    manager: Arc<ShutdownManager>,
) -> anyhow::Result<()> {
    let grace = Duration::from_millis(config.evolution.shutdown_grace_ms);
    let ctx = AppContext::build(config, llm, manager.token())
        .await
        .context("failed to build daemon")?;

    let socket_path = ctx.socket_path();
    let server = ControlServer::bind(&socket_path)
        .await
        .with_context(|| format!("failed to bind control socket {}", socket_path.display()))?;

    let timers = ctx.scheduler.start().await?;
    let engine_loop = ctx.engine.clone().start();
    tracing::info!(
        socket = %socket_path.display(),
        timers,
        evolution = ctx.engine.is_enabled(),
        "cata daemon started"
    );

    let mut coordinator = ShutdownCoordinator::new(manager).with_grace(grace);
    let removed = socket_path.clone();
    coordinator.register(FnCleanup::new("socket", move || {
        match std::fs::remove_file(&removed) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }));
    let engine = ctx.engine.clone();
    coordinator.register(FnCleanup::new("evolution", move || {
        engine.set_enabled(false);
        Ok(())
    }));
    coordinator.register(StopScheduler(ctx.scheduler.clone()));
    coordinator.register(FlushQueue(ctx.engine.queue().clone()));

    let serve_ctx = ctx.clone();
    run_until_shutdown(coordinator, async move {
        server.serve(serve_ctx).await;
    })
    .await;

    engine_loop.abort();
    tracing::info!("cata daemon stopped");
    Ok(())
}
