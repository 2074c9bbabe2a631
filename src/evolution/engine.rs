//! 自主演进引擎
//!
//! 一个决策周期：状态快照 → oracle 决策（可顺带调用技能）→ 写 pending 日志 → 执行任务 →
//! 按下标回写这条日志。oracle 出错或输出无法解析时走确定性回退，决策本身从不失败。
//!
//! 后台任务有两个定时器：完整周期（启动时立即执行一次）与队列消费（每次取一个任务直接执行，
//! 不经过 oracle）。完整周期由 cycle_lock 串行化。

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::EvolutionSection;
use crate::core::Result;
use crate::llm::{LlmClient, ToolCall, ToolSpec};
use crate::memory::{DecisionHistory, MemoryStore, Message};
use crate::skills::{SkillContext, SkillRegistry, SkillsIndexLoader, Trigger};

use super::executor::TaskExecutor;
use super::log::{EntryOutcome, EvolutionLogEntry, EvolutionLogStore};
use super::queue::TaskQueue;
use super::state::{StateAnalyzer, SystemState};
use super::types::{extract_json_object, ActionPlan, CreatedBy, QueuedTask, Task, TaskResult, TaskStatus, TaskType};

pub const SKILL_TOOL_PREFIX: &str = "skill_";

const DECISION_SYSTEM_PROMPT: &str =
    "你是一个自主演进的记忆系统。请分析当前状态，决定下一步应该执行什么行动。返回 JSON 格式的 ActionPlan。";

/// 决策菜单（integrate / custom 只由调用方显式提交）
const DECISION_MENU: [(&str, &str); 7] = [
    ("summarize", "压缩 archive，释放空间"),
    ("consolidate", "固化新记忆"),
    ("recall", "检索相关记忆"),
    ("learn", "学习新能力"),
    ("optimize", "优化索引或检索策略"),
    ("reflect", "反思和改进"),
    ("idle", "暂不行动"),
];

/// 引擎依赖的共享组件
pub struct EngineParts {
    pub queue: Arc<TaskQueue>,
    pub log: Arc<EvolutionLogStore>,
    pub memory: Arc<dyn MemoryStore>,
    pub llm: Arc<dyn LlmClient>,
    pub skills: Arc<SkillRegistry>,
    pub skills_index: SkillsIndexLoader,
    pub capabilities_path: PathBuf,
}

pub struct EvolutionEngine {
    config: EvolutionSection,
    queue: Arc<TaskQueue>,
    log: Arc<EvolutionLogStore>,
    analyzer: StateAnalyzer,
    executor: TaskExecutor,
    llm: Arc<dyn LlmClient>,
    skills: Arc<SkillRegistry>,
    skills_index: SkillsIndexLoader,
    history: Mutex<DecisionHistory>,
    cycle_lock: Mutex<()>,
    enabled: AtomicBool,
    shutdown: CancellationToken,
}

impl EvolutionEngine {
    pub fn new(config: EvolutionSection, parts: EngineParts) -> Self {
        let analyzer = StateAnalyzer::new(
            parts.memory.clone(),
            parts.log.clone(),
            parts.queue.clone(),
            parts.capabilities_path,
        );
        let executor = TaskExecutor::new(parts.memory, parts.llm.clone(), parts.log.clone());
        Self {
            history: Mutex::new(DecisionHistory::new(config.history_limit)),
            enabled: AtomicBool::new(config.enabled),
            config,
            queue: parts.queue,
            log: parts.log,
            analyzer,
            executor,
            llm: parts.llm,
            skills: parts.skills,
            skills_index: parts.skills_index,
            cycle_lock: Mutex::new(()),
            shutdown: CancellationToken::new(),
        }
    }

    /// 后台循环与 oracle 触发的技能都挂在这个 token 上
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn log(&self) -> &Arc<EvolutionLogStore> {
        &self.log
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        tracing::info!(enabled, "evolution engine toggled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub async fn history_len(&self) -> usize {
        self.history.lock().await.len()
    }

    pub async fn analyze(&self) -> SystemState {
        self.analyzer.analyze().await
    }

    /// 启动后台循环；shutdown 取消时退出
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut cycle = tokio::time::interval(self.config.cycle_interval());
            let mut drain = tokio::time::interval(self.config.queue_interval());
            cycle.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            drain.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!(
                cycle_secs = self.config.cycle_interval_secs,
                queue_secs = self.config.queue_interval_secs,
                "evolution engine started"
            );

            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = cycle.tick() => {
                        if self.is_enabled() {
                            self.execute_autonomous_cycle().await;
                        }
                    }
                    _ = drain.tick() => {
                        if self.is_enabled() {
                            self.process_task_queue().await;
                        }
                    }
                }
            }
            tracing::info!("evolution engine stopped");
        })
    }

    /// 完整决策周期，返回执行后的任务（失败信息在 task.result 中）
    pub async fn execute_autonomous_cycle(&self) -> Task {
        let _cycle = self.cycle_lock.lock().await;
        tracing::info!("evolution cycle started");

        let state = self.analyzer.analyze().await;
        tracing::debug!(
            archive_files = state.memory_state.archive_file_count,
            index_entries = state.memory_state.index_entry_count,
            "state analyzed"
        );

        let plan = self.decide_next_action(&state).await;
        tracing::info!(action = %plan.action, reason = %plan.reason, "decision made");

        let task = self.run_logged(plan).await;
        tracing::info!(task_id = %task.id, status = %task.status, "evolution cycle completed");
        task
    }

    /// oracle 决策；任何失败都走回退方案
    pub async fn decide_next_action(&self, state: &SystemState) -> ActionPlan {
        let prompt = build_decision_prompt(state);
        let tools = self.decision_tools().await;

        let mut messages: Vec<Message> = self.history.lock().await.messages().to_vec();
        messages.push(Message::system(DECISION_SYSTEM_PROMPT));
        messages.push(Message::user(prompt.clone()));

        let reply = match self.llm.complete_with_tools(&messages, &tools).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "oracle decision failed, using fallback");
                return fallback_decision(state);
            }
        };

        if !reply.tool_calls.is_empty() {
            tracing::info!(calls = reply.tool_calls.len(), "oracle requested skill calls");
            self.execute_tool_calls(&reply.tool_calls).await;
        }

        match parse_action_plan(&reply.content) {
            Some(plan) => {
                self.history.lock().await.push_exchange(prompt, reply.content);
                plan
            }
            None => {
                tracing::warn!("oracle reply has no usable action plan, using fallback");
                fallback_decision(state)
            }
        }
    }

    /// 已注册且对 oracle 可见的技能，以 `skill_<name>` 函数暴露；描述优先取 skills-index
    async fn decision_tools(&self) -> Vec<ToolSpec> {
        let skills = self.skills.oracle_visible().await;
        if skills.is_empty() {
            return Vec::new();
        }
        let index = self.skills_index.load_or_default().await;
        skills
            .iter()
            .map(|s| {
                let desc = index
                    .get(s.name())
                    .map(|m| m.description.clone())
                    .filter(|d| !d.is_empty())
                    .or_else(|| Some(s.description().to_string()).filter(|d| !d.is_empty()))
                    .unwrap_or_else(|| format!("Server-side skill {}", s.name()));
                ToolSpec::no_args(format!("{}{}", SKILL_TOOL_PREFIX, s.name()), desc)
            })
            .collect()
    }

    /// 依次执行；未知名称与执行失败只记录
    async fn execute_tool_calls(&self, calls: &[ToolCall]) {
        for call in calls {
            let Some(name) = call.name.strip_prefix(SKILL_TOOL_PREFIX) else {
                tracing::warn!(call_id = %call.id, function = %call.name, "unsupported function, skipped");
                continue;
            };
            let Some(skill) = self.skills.get(name).await else {
                tracing::warn!(call_id = %call.id, skill = name, "skill not found for tool call");
                continue;
            };
            let args = call.args();
            tracing::info!(call_id = %call.id, skill = name, ?args, "executing skill tool call");
            let ctx = SkillContext::new(self.shutdown.child_token(), Trigger::Oracle);
            match skill.run(ctx, args).await {
                Ok(out) => tracing::debug!(skill = name, output = %out, "skill tool call done"),
                Err(e) => tracing::warn!(skill = name, error = %e, "skill tool call failed"),
            }
        }
    }

    /// 同步执行一个方案（task create 不带 --async）；未知类型直接拒绝，不写日志
    pub async fn execute_task(&self, plan: ActionPlan) -> Result<Task> {
        plan.action.parse::<TaskType>()?;
        Ok(self.run_logged(plan).await)
    }

    /// 入队（异步执行）；未知类型不入队
    pub async fn enqueue_task(&self, plan: ActionPlan, created_by: CreatedBy) -> Result<QueuedTask> {
        plan.action.parse::<TaskType>()?;
        Ok(self.queue.enqueue(plan, created_by).await)
    }

    /// 取出一个待执行任务并执行，结果写回队列；队列为空时返回 None
    pub async fn process_task_queue(&self) -> Option<Task> {
        let queued = self.queue.dequeue().await?;
        tracing::info!(task_id = %queued.id(), task_type = %queued.task.task_type, "processing queued task");

        let mut task = queued.task;
        let index = self.record_decision(&task.action_plan).await;
        let outcome = self.executor.execute(&mut task).await;

        let (status, result) = match outcome {
            Ok(result) => (TaskStatus::Completed, result),
            Err(e) => {
                let result = task
                    .result
                    .clone()
                    .unwrap_or_else(|| TaskResult::failure(e.to_string()));
                (TaskStatus::Failed, result)
            }
        };
        if let Err(e) = self.queue.update_task(&task.id, status, Some(result.clone())).await {
            tracing::warn!(task_id = %task.id, error = %e, "failed to write back queued task");
        }
        task.status = status;
        task.result = Some(result);
        self.record_outcome(index, &task).await;
        Some(task)
    }

    /// 写 pending 日志 → 执行 → 按下标回写
    async fn run_logged(&self, plan: ActionPlan) -> Task {
        let index = self.record_decision(&plan).await;
        let mut task = Task::from_plan(plan);
        tracing::info!(task_id = %task.id, task_type = %task.task_type, "task created");

        if let Err(e) = self.executor.execute(&mut task).await {
            if task.result.is_none() {
                task.status = TaskStatus::Failed;
                task.result = Some(TaskResult::failure(e.to_string()));
            }
        }
        self.record_outcome(index, &task).await;
        task
    }

    async fn record_decision(&self, plan: &ActionPlan) -> Option<usize> {
        let entry = EvolutionLogEntry::pending(&plan.action, &plan.reason, plan.steps.clone());
        match self.log.append(entry).await {
            Ok(i) => Some(i),
            Err(e) => {
                tracing::warn!(error = %e, "failed to record decision");
                None
            }
        }
    }

    async fn record_outcome(&self, index: Option<usize>, task: &Task) {
        let Some(index) = index else { return };
        let result = task.result.clone().unwrap_or_default();
        let outcome = EntryOutcome {
            task_id: task.id.clone(),
            success: task.status == TaskStatus::Completed && result.success,
            result: if result.success { result.output } else { result.error },
            learning: result.learning,
        };
        if let Err(e) = self.log.complete(index, outcome).await {
            tracing::warn!(task_id = %task.id, index, error = %e, "failed to update evolution log");
        }
    }
}

/// 状态描述 + 固定菜单 + 输出格式
pub fn build_decision_prompt(state: &SystemState) -> String {
    let mut s = String::from("当前状态：\n");
    s.push_str(&state.describe());
    s.push_str("\n可用行动：\n");
    for (i, (name, desc)) in DECISION_MENU.iter().enumerate() {
        s.push_str(&format!("{}. {} - {}\n", i + 1, name, desc));
    }
    s.push_str(
        "\n请以 JSON 格式返回决策：\n{\n  \"action\": \"行动类型\",\n  \"reason\": \"为什么选择这个行动\",\n  \
\"steps\": [\"步骤1\", \"步骤2\"],\n  \"expected_outcome\": \"预期结果\",\n  \"priority\": 优先级(1-10)\n}",
    );
    s
}

/// 解析 oracle 输出；action 缺失或不是已知类型时返回 None
pub fn parse_action_plan(reply: &str) -> Option<ActionPlan> {
    let json = extract_json_object(reply)?;
    let plan: ActionPlan = serde_json::from_str(json).ok()?;
    if plan.action.trim().is_empty() {
        return None;
    }
    let action = plan.action.trim().parse::<TaskType>().ok()?;
    Some(ActionPlan {
        action: action.as_str().to_string(),
        ..plan
    })
}

/// 确定性回退：需要压缩时 summarize(8)，否则 idle(1)
pub fn fallback_decision(state: &SystemState) -> ActionPlan {
    if state.memory_state.needs_summarize {
        ActionPlan::new(
            TaskType::Summarize.as_str(),
            state.memory_state.summarize_reason.clone(),
            8,
        )
        .with_steps(vec![
            "选择需要压缩的文件".to_string(),
            "生成摘要".to_string(),
            "移动到 backup".to_string(),
        ])
        .with_expected_outcome("archive 文件数减少")
    } else {
        ActionPlan::new(TaskType::Idle.as_str(), "当前状态良好，无需立即行动", 1)
            .with_expected_outcome("保持当前状态")
    }
}
