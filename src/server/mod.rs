//! 本地控制面：换行分隔 JSON 协议、Unix socket 监听器、命令处理与守护进程装配

pub mod client;
pub mod daemon;
pub mod handlers;
pub mod protocol;
pub mod socket;

pub use client::{Connection, ControlClient};
pub use daemon::{run, run_with, AppContext};
pub use handlers::handle;
pub use protocol::{parse_request, Request, Response};
pub use socket::ControlServer;
