//! 日志初始化

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 初始化 tracing：RUST_LOG 优先，否则用配置中的级别
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}
