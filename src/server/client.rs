//! 控制协议客户端（catacli 与集成测试使用）

use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

use crate::core::{CataError, Result};

use super::protocol::{Request, Response};

/// 每次 `send` 建立一条短连接
#[derive(Debug, Clone)]
pub struct ControlClient {
    socket_path: PathBuf,
}

impl ControlClient {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub async fn connect(&self) -> Result<Connection> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (reader, writer) = stream.into_split();
        Ok(Connection {
            reader: BufReader::new(reader),
            writer,
        })
    }

    pub async fn send(&self, request: &Request) -> Result<Response> {
        self.connect().await?.send(request).await
    }

    pub async fn command<I, S>(&self, command: &str, args: I) -> Result<Response>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.send(&Request::new(command, args)).await
    }

    /// 守护进程是否在线
    pub async fn ping(&self) -> bool {
        matches!(self.command("ping", Vec::<String>::new()).await, Ok(r) if r.success)
    }
}

/// 一条保持打开的连接，可以连续发送多个请求
pub struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Connection {
    pub async fn send(&mut self, request: &Request) -> Result<Response> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        self.send_raw(&line).await
    }

    /// 原样写入一行（不做校验），读取一行响应
    pub async fn send_raw(&mut self, line: &str) -> Result<Response> {
        self.writer.write_all(line.as_bytes()).await?;
        if !line.ends_with('\n') {
            self.writer.write_all(b"\n").await?;
        }
        self.writer.flush().await?;

        let mut reply = String::new();
        let n = self.reader.read_line(&mut reply).await?;
        if n == 0 {
            return Err(CataError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "daemon closed the connection",
            )));
        }
        Ok(serde_json::from_str(reply.trim_end())?)
    }
}
