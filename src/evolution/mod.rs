//! 任务编排：数据模型、持久化队列、演进日志、状态快照、执行器与决策引擎

pub mod engine;
pub mod executor;
pub mod log;
pub mod queue;
pub mod state;
pub mod types;

pub use engine::{EngineParts, EvolutionEngine};
pub use executor::TaskExecutor;
pub use log::{EntryOutcome, EvolutionLogEntry, EvolutionLogStore};
pub use queue::TaskQueue;
pub use state::{StateAnalyzer, SystemState};
pub use types::{ActionPlan, CreatedBy, QueuedTask, Task, TaskResult, TaskStatus, TaskType};
