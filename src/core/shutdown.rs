//! 优雅关闭
//!
//! SIGINT / SIGTERM 触发 [`ShutdownManager`] 取消共享的 `CancellationToken`；监听器、决策循环、
//! 定时技能都在 `select!` 中观察该 token。随后 [`ShutdownCoordinator`] 依次执行注册的清理项
//! （删除 socket 文件、停用引擎、取消定时器、落盘队列），最后等待一段有限的宽限时间。
//! 正在执行的任务不会被等待。

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// 关闭信号管理器
#[derive(Clone)]
pub struct ShutdownManager {
    token: CancellationToken,
    reason_tx: broadcast::Sender<ShutdownReason>,
}

/// 关闭原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// 守护进程内部请求退出（如监听失败）
    Internal(String),
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Interrupt => write!(f, "interrupt"),
            ShutdownReason::Terminate => write!(f, "terminate"),
            ShutdownReason::Internal(msg) => write!(f, "internal: {}", msg),
        }
    }
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (reason_tx, _) = broadcast::channel(1);
        Self {
            token: CancellationToken::new(),
            reason_tx,
        }
    }

    /// 共享的取消 token
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 触发关闭；重复调用只有第一次的原因会被广播
    pub fn shutdown(&self, reason: ShutdownReason) {
        if self.token.is_cancelled() {
            return;
        }
        tracing::info!(%reason, "shutdown requested");
        let _ = self.reason_tx.send(reason);
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.reason_tx.subscribe()
    }

    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }

    /// 安装 Ctrl+C 与 SIGTERM 处理
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                manager.shutdown(ShutdownReason::Interrupt);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                        manager.shutdown(ShutdownReason::Terminate);
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to install SIGTERM handler"),
                }
            });
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 关闭时执行的清理项
#[async_trait::async_trait]
pub trait ShutdownCleanup: Send + Sync {
    async fn cleanup(&self) -> anyhow::Result<()>;

    /// 日志中的名称
    fn name(&self) -> &'static str;
}

/// 以闭包形式注册的同步清理项
pub struct FnCleanup<F>
where
    F: Fn() -> anyhow::Result<()> + Send + Sync,
{
    name: &'static str,
    f: F,
}

impl<F> FnCleanup<F>
where
    F: Fn() -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

#[async_trait::async_trait]
impl<F> ShutdownCleanup for FnCleanup<F>
where
    F: Fn() -> anyhow::Result<()> + Send + Sync,
{
    async fn cleanup(&self) -> anyhow::Result<()> {
        (self.f)()
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// 关闭协调器：按注册顺序执行清理，每项有超时，最后等待宽限时间
pub struct ShutdownCoordinator {
    manager: Arc<ShutdownManager>,
    cleanups: Vec<Arc<dyn ShutdownCleanup>>,
    step_timeout: Duration,
    grace: Duration,
}

impl ShutdownCoordinator {
    pub fn new(manager: Arc<ShutdownManager>) -> Self {
        Self {
            manager,
            cleanups: Vec::new(),
            step_timeout: Duration::from_secs(5),
            grace: Duration::from_millis(100),
        }
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// 清理完成后的宽限时间
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn register<T: ShutdownCleanup + 'static>(&mut self, task: T) {
        self.cleanups.push(Arc::new(task));
    }

    pub fn len(&self) -> usize {
        self.cleanups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cleanups.is_empty()
    }

    /// 执行所有清理项；单项失败或超时只记录日志
    pub async fn run_cleanup(&self) {
        tracing::info!(count = self.cleanups.len(), "running shutdown cleanup");

        for task in &self.cleanups {
            let name = task.name();
            match tokio::time::timeout(self.step_timeout, task.cleanup()).await {
                Ok(Ok(())) => tracing::debug!(cleanup = name, "cleanup done"),
                Ok(Err(e)) => tracing::warn!(cleanup = name, error = %e, "cleanup failed"),
                Err(_) => tracing::warn!(
                    cleanup = name,
                    timeout_ms = self.step_timeout.as_millis() as u64,
                    "cleanup timed out"
                ),
            }
        }

        if !self.grace.is_zero() {
            tokio::time::sleep(self.grace).await;
        }
        tracing::info!("shutdown cleanup finished");
    }

    pub fn manager(&self) -> &Arc<ShutdownManager> {
        &self.manager
    }
}

/// 运行 app 直到它结束或收到关闭信号，然后执行清理
pub async fn run_until_shutdown<Fut>(coordinator: ShutdownCoordinator, app: Fut)
where
    Fut: Future<Output = ()>,
{
    let manager = Arc::clone(coordinator.manager());
    manager.install_signal_handlers();

    tokio::select! {
        _ = app => tracing::info!("daemon finished"),
        _ = manager.wait_for_shutdown() => {}
    }
    manager.shutdown(ShutdownReason::Internal("daemon exiting".to_string()));

    coordinator.run_cleanup().await;
}
