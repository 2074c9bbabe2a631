//! 基础设施：错误类型、brain 目录布局、原子写文件、优雅关闭

pub mod error;
pub mod paths;
pub mod persistence;
pub mod shutdown;

pub use error::{CataError, Result};
pub use paths::BrainPaths;
pub use persistence::{blocking, write_atomic, JsonFile};
pub use shutdown::{
    run_until_shutdown, FnCleanup, ShutdownCleanup, ShutdownCoordinator, ShutdownManager,
    ShutdownReason,
};
