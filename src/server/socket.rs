//! Unix socket 监听器
//!
//! 每个连接一个 tokio 任务；连接内逐行读取请求，每行恰好回写一行响应。空行忽略。
//! shutdown 取消后停止 accept、删除 socket 文件；进行中的连接随之结束，不等待。

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use super::daemon::AppContext;
use super::handlers::handle;
use super::protocol::parse_request;

pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
}

impl ControlServer {
    /// 绑定 socket（权限 0600）；已有守护进程在监听时返回 AddrInUse
    pub async fn bind(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if path.exists() {
            if UnixStream::connect(path).await.is_ok() {
                return Err(io::Error::new(
                    io::ErrorKind::AddrInUse,
                    format!("another daemon is listening on {}", path.display()),
                ));
            }
            // 上次异常退出留下的 socket
            std::fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(path)?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        tracing::info!(socket = %path.display(), "control socket bound");
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// accept 循环，直到 ctx.shutdown 被取消或 accept 出错
    pub async fn serve(self, ctx: Arc<AppContext>) {
        let token = ctx.shutdown.clone();
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("shutdown signal received, stopping accept loop");
                    break;
                }
                res = self.listener.accept() => match res {
                    Ok((stream, _addr)) => {
                        tokio::spawn(serve_connection(stream, ctx.clone()));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept error");
                        break;
                    }
                },
            }
        }

        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(socket = %self.path.display(), error = %e, "failed to remove socket"),
        }
        tracing::info!(socket = %self.path.display(), "control socket closed");
    }
}

async fn serve_connection(stream: UnixStream, ctx: Arc<AppContext>) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let token = ctx.shutdown.clone();

    loop {
        let line = tokio::select! {
            _ = token.cancelled() => break,
            next = lines.next_line() => match next {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(error = %e, "connection read error");
                    break;
                }
            },
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match parse_request(&line) {
            Ok(request) => handle(&ctx, request).await,
            Err(invalid) => invalid,
        };

        let mut out = response.to_line();
        out.push('\n');
        if let Err(e) = writer.write_all(out.as_bytes()).await {
            tracing::debug!(error = %e, "connection write error");
            break;
        }
    }
}
