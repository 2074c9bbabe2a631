//! 任务与行动方案的数据模型
//!
//! 队列文件、演进日志与控制协议共享这些结构；字段名即 JSON 键名。

use std::fmt;
use std::str::FromStr;

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::core::CataError;

/// 参数 / 指标映射
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;
pub const DEFAULT_PRIORITY: u8 = 5;

/// 封闭的任务类型集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Summarize,
    Consolidate,
    Recall,
    Learn,
    Optimize,
    Reflect,
    Idle,
    Integrate,
    Custom,
}

impl TaskType {
    pub const ALL: [TaskType; 9] = [
        TaskType::Summarize,
        TaskType::Consolidate,
        TaskType::Recall,
        TaskType::Learn,
        TaskType::Optimize,
        TaskType::Reflect,
        TaskType::Idle,
        TaskType::Integrate,
        TaskType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Summarize => "summarize",
            TaskType::Consolidate => "consolidate",
            TaskType::Recall => "recall",
            TaskType::Learn => "learn",
            TaskType::Optimize => "optimize",
            TaskType::Reflect => "reflect",
            TaskType::Idle => "idle",
            TaskType::Integrate => "integrate",
            TaskType::Custom => "custom",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = CataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        TaskType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == lowered)
            .ok_or_else(|| CataError::UnknownTaskType(s.to_string()))
    }
}

/// 任务状态：pending → running → completed | failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// 终态不可再变，任何状态都不能回到 pending
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = CataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(CataError::InvalidTaskInput(format!(
                "unknown task status: {}",
                other
            ))),
        }
    }
}

/// 行动方案（调用方显式给出，或由 oracle 生成）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub expected_outcome: String,
    /// 1-10；构造任务时钳制
    #[serde(default)]
    pub priority: i64,
}

impl ActionPlan {
    pub fn new(action: impl Into<String>, reason: impl Into<String>, priority: i64) -> Self {
        Self {
            action: action.into(),
            reason: reason.into(),
            priority,
            ..Default::default()
        }
    }

    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_expected_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.expected_outcome = outcome.into();
        self
    }

    pub fn clamped_priority(&self) -> u8 {
        clamp_priority(self.priority)
    }
}

pub fn clamp_priority(p: i64) -> u8 {
    p.clamp(MIN_PRIORITY as i64, MAX_PRIORITY as i64) as u8
}

/// 任务执行结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub metrics: JsonMap,
    #[serde(default)]
    pub learning: String,
}

impl TaskResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            ..Default::default()
        }
    }

    pub fn with_learning(mut self, learning: impl Into<String>) -> Self {
        self.learning = learning.into();
        self
    }

    pub fn with_metric(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metrics.insert(key.to_string(), value.into());
        self
    }
}

/// 一次执行单元
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// 方案中的 action 原文，执行时解析为 [`TaskType`]
    #[serde(rename = "type")]
    pub task_type: String,
    pub action_plan: ActionPlan,
    #[serde(default)]
    pub params: JsonMap,
    pub priority: u8,
    pub status: TaskStatus,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
}

impl Task {
    pub fn from_plan(plan: ActionPlan) -> Self {
        Self {
            id: generate_task_id(),
            task_type: plan.action.clone(),
            priority: plan.clamped_priority(),
            action_plan: plan,
            params: JsonMap::new(),
            status: TaskStatus::Pending,
            created_at: now_rfc3339(),
            started_at: None,
            completed_at: None,
            result: None,
        }
    }
}

/// 任务来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreatedBy {
    User,
    System,
}

impl fmt::Display for CreatedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreatedBy::User => f.write_str("user"),
            CreatedBy::System => f.write_str("system"),
        }
    }
}

/// 队列中的任务：Task 字段 + created_by，序列化为扁平对象
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTask {
    #[serde(flatten)]
    pub task: Task,
    pub created_by: CreatedBy,
}

impl QueuedTask {
    pub fn new(plan: ActionPlan, created_by: CreatedBy) -> Self {
        Self {
            task: Task::from_plan(plan),
            created_by,
        }
    }

    pub fn id(&self) -> &str {
        &self.task.id
    }

    pub fn status(&self) -> TaskStatus {
        self.task.status
    }
}

/// `task-YYYYMMDD-HHMMSS-xxxxxx`，后缀为 6 位 [a-z0-9]
pub fn generate_task_id() -> String {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let simple = uuid::Uuid::new_v4().simple().to_string();
    format!("task-{}-{}", stamp, &simple[..6])
}

/// 本地时区 RFC 3339（秒精度）
pub fn now_rfc3339() -> String {
    chrono::Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// 从不可信的 oracle 输出中截取第一个 `{` 到最后一个 `}` 之间的文本
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}
