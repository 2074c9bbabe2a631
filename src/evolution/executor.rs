//! 任务执行器
//!
//! 任务的 type 字符串在执行时解析为 [`TaskType`]，未知类型直接拒绝，任务不做任何状态变更。
//! custom 先让 oracle 把自由文本需求归类为具体 action，再执行对应处理器（只解析一层，
//! 归类结果仍为 custom 或无法识别时按 idle 处理）。

use std::sync::Arc;

use serde::Deserialize;

use crate::core::{CataError, Result};
use crate::llm::LlmClient;
use crate::memory::{MemoryStore, Message};

use super::log::EvolutionLogStore;
use super::types::{extract_json_object, now_rfc3339, ActionPlan, Task, TaskResult, TaskStatus, TaskType};

const DEFAULT_TOP_K: usize = 5;
const LEARN_CONTEXT_MAX_CHARS: usize = 8000;
const REFLECT_WINDOW: usize = 10;
const RECALL_PREVIEW_CHARS: usize = 200;

/// custom 归类失败时，需求中出现这些词就按 integrate 执行
const INTEGRATION_KEYWORDS: [&str; 4] = ["整合", "system prompt", "integrate", "integration"];

const LEARN_SYSTEM_PROMPT: &str = "你是一套自主演进的记忆系统，负责根据 brain 与各类记忆（hot / short / long）生成具体的更新计划。只输出 JSON，不要任何解释。";
const CUSTOM_SYSTEM_PROMPT: &str = "你只输出一个 JSON 对象，包含 action 和 steps 两个字段。";
const REFLECT_SYSTEM_PROMPT: &str = "你是一套自主演进的记忆系统。请根据最近的演进日志反思：哪些行动有效、哪些失败、下一步应改进什么。用简洁的 Markdown 输出。";

#[derive(Debug, Default, Deserialize)]
struct LearnUpdate {
    #[serde(default)]
    topic: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct LearnPlan {
    #[serde(default)]
    hot_updates: Vec<LearnUpdate>,
    #[serde(default)]
    short_updates: Vec<String>,
    #[serde(default)]
    long_updates: Vec<LearnUpdate>,
}

#[derive(Debug, Default, Deserialize)]
struct CustomClassification {
    #[serde(default)]
    action: String,
    #[serde(default)]
    steps: Vec<String>,
}

pub struct TaskExecutor {
    memory: Arc<dyn MemoryStore>,
    llm: Arc<dyn LlmClient>,
    log: Arc<EvolutionLogStore>,
}

impl TaskExecutor {
    pub fn new(
        memory: Arc<dyn MemoryStore>,
        llm: Arc<dyn LlmClient>,
        log: Arc<EvolutionLogStore>,
    ) -> Self {
        Self { memory, llm, log }
    }

    /// 执行任务并回填状态与结果；处理器失败时任务标记为 failed 并返回 Err
    pub async fn execute(&self, task: &mut Task) -> Result<TaskResult> {
        let task_type: TaskType = task.task_type.parse()?;

        task.status = TaskStatus::Running;
        if task.started_at.is_none() {
            task.started_at = Some(now_rfc3339());
        }
        tracing::info!(task_id = %task.id, %task_type, "executing task");

        let outcome = self.run(task_type, &task.action_plan).await;
        task.completed_at = Some(now_rfc3339());
        match outcome {
            Ok(result) => {
                task.status = TaskStatus::Completed;
                task.result = Some(result.clone());
                tracing::info!(task_id = %task.id, "task completed");
                Ok(result)
            }
            Err(e) => {
                task.status = TaskStatus::Failed;
                task.result = Some(TaskResult::failure(e.to_string()));
                tracing::warn!(task_id = %task.id, error = %e, "task failed");
                Err(e)
            }
        }
    }

    async fn run(&self, task_type: TaskType, plan: &ActionPlan) -> Result<TaskResult> {
        match task_type {
            TaskType::Custom => self.custom(plan).await,
            other => self.run_concrete(other, plan).await,
        }
    }

    /// custom 以外的处理器；传入 custom 时按 idle 处理
    async fn run_concrete(&self, task_type: TaskType, plan: &ActionPlan) -> Result<TaskResult> {
        let result = match task_type {
            TaskType::Summarize => self.summarize().await?,
            TaskType::Consolidate => self.consolidate(plan).await?,
            TaskType::Recall => self.recall(plan).await?,
            TaskType::Learn => self.learn(plan).await?,
            TaskType::Optimize => self.optimize().await?,
            TaskType::Reflect => self.reflect().await?,
            TaskType::Integrate => self.integrate().await?,
            TaskType::Idle | TaskType::Custom => Self::idle(plan),
        };
        Ok(result.with_metric("completed_at", now_rfc3339()))
    }

    async fn summarize(&self) -> Result<TaskResult> {
        let report = self.memory.summarize_and_rotate().await?;
        if report.summarized.is_empty() {
            return Ok(TaskResult::ok("No archive files need to be summarized")
                .with_learning("archive 无需压缩")
                .with_metric("files", 0));
        }
        let summary_file = report
            .summary_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        Ok(TaskResult::ok(format!(
            "Summarized {} archive files into {}",
            report.summarized.len(),
            summary_file
        ))
        .with_learning("archive 文件已压缩，原文件移入 backup 目录")
        .with_metric("files", report.summarized.len())
        .with_metric("summary_file", summary_file))
    }

    async fn consolidate(&self, plan: &ActionPlan) -> Result<TaskResult> {
        if plan.steps.len() < 2 {
            return Err(CataError::InvalidTaskInput(
                "consolidate requires topic and content in steps".into(),
            ));
        }
        let topic = &plan.steps[0];
        let content = plan.steps[1..].join("\n");
        let path = self.memory.consolidate(topic, &content).await?;
        Ok(TaskResult::ok(format!("Content consolidated: topic={}", topic))
            .with_learning(format!("成功固化记忆：{}", topic))
            .with_metric("topic", topic.as_str())
            .with_metric("path", path.display().to_string()))
    }

    async fn recall(&self, plan: &ActionPlan) -> Result<TaskResult> {
        let query = plan
            .steps
            .first()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CataError::InvalidTaskInput("recall requires a query in steps".into()))?;
        let top_k = plan
            .steps
            .get(1)
            .and_then(|s| s.trim().parse::<usize>().ok())
            .filter(|k| *k > 0)
            .unwrap_or(DEFAULT_TOP_K);

        let pieces = self.memory.recall(query, top_k, None, None).await?;
        let mut output = format!("Found {} results for query: {}", pieces.len(), query);
        for p in &pieces {
            let preview: String = p.content.chars().take(RECALL_PREVIEW_CHARS).collect();
            output.push_str(&format!("\n\n[{}] {}\n{}", p.category, p.source, preview.trim()));
        }
        Ok(TaskResult::ok(output)
            .with_learning(format!("检索到 {} 条相关记忆", pieces.len()))
            .with_metric("query", query)
            .with_metric("result_count", pieces.len()))
    }

    async fn learn(&self, plan: &ActionPlan) -> Result<TaskResult> {
        let mut requirement = plan.steps.join("；").trim().to_string();
        if requirement.is_empty() {
            requirement = plan.reason.trim().to_string();
        }
        if requirement.is_empty() {
            requirement = "根据当前 brain 与记忆，对 hot / short / long memory 做一次自我学习和整理。".into();
        }

        let (integrated_path, _) = self.memory.build_integrated_context().await?;
        let mut context = tokio::fs::read_to_string(&integrated_path).await?;
        if context.chars().count() > LEARN_CONTEXT_MAX_CHARS {
            context = context.chars().take(LEARN_CONTEXT_MAX_CHARS).collect();
            context.push_str("\n\n...[内容截断，仅保留前 8000 字符]...");
        }

        let prompt = format!(
            "学习需求：\n{}\n\n下面是当前 brain 与记忆的集成视图（节选）：\n----------------\n{}\n----------------\n\n\
请根据以上信息，输出一个 JSON 对象，字段说明：\n\
- hot_updates: 数组，每项包含 {{\"topic\": \"写入 hot 的主题，如『身份与偏好』\", \"content\": \"Markdown 内容\"}}\n\
- short_updates: 数组，每项是要追加到短期记忆的 Markdown 段落\n\
- long_updates: 数组，每项包含 {{\"topic\": \"写入 long-term 的主题，如『项目知识：演进路径』\", \"content\": \"Markdown 内容\"}}",
            requirement, context
        );
        let reply = self
            .llm
            .complete(&[Message::system(LEARN_SYSTEM_PROMPT), Message::user(prompt)])
            .await
            .map_err(|e| CataError::Llm(format!("learn oracle call failed: {}", e)))?;
        let json = extract_json_object(&reply).unwrap_or(&reply);
        let learn: LearnPlan = serde_json::from_str(json)
            .map_err(|e| CataError::Llm(format!("learn plan parse failed: {}", e)))?;

        let mut applied_hot = 0usize;
        let mut applied_short = 0usize;
        let mut applied_long = 0usize;
        for (updates, counter) in [
            (&learn.hot_updates, &mut applied_hot),
            (&learn.long_updates, &mut applied_long),
        ] {
            for u in updates {
                if u.topic.trim().is_empty() || u.content.trim().is_empty() {
                    continue;
                }
                match self.memory.consolidate(&u.topic, &u.content).await {
                    Ok(_) => *counter += 1,
                    Err(e) => tracing::warn!(topic = %u.topic, error = %e, "learn update not applied"),
                }
            }
        }
        for s in &learn.short_updates {
            if s.trim().is_empty() {
                continue;
            }
            match self.memory.append_short_term(s).await {
                Ok(()) => applied_short += 1,
                Err(e) => tracing::warn!(error = %e, "learn short-term update not applied"),
            }
        }

        Ok(TaskResult::ok(format!(
            "Learn task completed. Applied hot_updates={}, short_updates={}, long_updates={}",
            applied_hot, applied_short, applied_long
        ))
        .with_learning(format!("根据需求「{}」完成一次基于 brain 集成视图的记忆学习与更新。", requirement))
        .with_metric("hot_updates", applied_hot)
        .with_metric("short_updates", applied_short)
        .with_metric("long_updates", applied_long)
        .with_metric("integrated_path", integrated_path.display().to_string()))
    }

    async fn optimize(&self) -> Result<TaskResult> {
        let count = self.memory.rebuild_index().await?;
        Ok(TaskResult::ok(format!("Memory index rebuilt with {} entries", count))
            .with_learning("索引已按当前 markdown 文件重建")
            .with_metric("index_entries", count))
    }

    async fn reflect(&self) -> Result<TaskResult> {
        let entries = self.log.recent(REFLECT_WINDOW).await;
        if entries.is_empty() {
            return Ok(TaskResult::ok("No evolution history to reflect on")
                .with_learning("演进日志为空，跳过反思"));
        }

        let mut digest = String::new();
        for e in &entries {
            digest.push_str(&format!(
                "- [{}] {} {}：{} {}\n",
                e.status, e.timestamp, e.action, e.decision, e.result
            ));
        }
        let reflection = self
            .llm
            .complete(&[
                Message::system(REFLECT_SYSTEM_PROMPT),
                Message::user(format!("最近的演进日志：\n{}", digest)),
            ])
            .await
            .map_err(|e| CataError::Llm(format!("reflect oracle call failed: {}", e)))?;
        if reflection.trim().is_empty() {
            return Err(CataError::Llm("reflect oracle returned empty text".into()));
        }

        let topic = format!("长期反思 {}", chrono::Local::now().format("%Y-%m-%d"));
        let path = self.memory.consolidate(&topic, &reflection).await?;
        Ok(TaskResult::ok(format!(
            "Reflected on {} log entries; stored in {}",
            entries.len(),
            path.display()
        ))
        .with_learning(reflection.trim().lines().next().unwrap_or_default().to_string())
        .with_metric("entries", entries.len()))
    }

    fn idle(plan: &ActionPlan) -> TaskResult {
        TaskResult::ok("System state is healthy, no action needed").with_learning(plan.reason.clone())
    }

    async fn integrate(&self) -> Result<TaskResult> {
        let (path, size) = self.memory.build_integrated_context().await?;
        Ok(TaskResult::ok(format!(
            "Integrated system prompt written to {} ({} bytes)",
            path.display(),
            size
        ))
        .with_learning("已将 core、workflow、hot、long-term、short-term、archive 整合为一份 system prompt")
        .with_metric("output_path", path.display().to_string())
        .with_metric("size_bytes", size))
    }

    async fn custom(&self, plan: &ActionPlan) -> Result<TaskResult> {
        let requirement = plan
            .steps
            .first()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| plan.reason.trim().to_string());
        if requirement.is_empty() {
            return Err(CataError::InvalidTaskInput(
                "custom task requires a requirement in steps or reason".into(),
            ));
        }

        let prompt = format!(
            "用户提交了以下需求，请判断应执行哪种任务并只返回一个 JSON 对象，不要其他文字。\n\n用户需求：\n{}\n\n\
可选任务类型：integrate（整合 brain+记忆 为 system prompt）, summarize（压缩 archive）, consolidate（固化记忆，steps 为 [topic, content]）, \
recall（检索，steps 为 [query]）, learn, optimize, reflect, idle。\n\n\
返回格式（仅一行 JSON）：\n{{\"action\":\"类型\", \"steps\":[\"步骤1\",\"步骤2\"]}}",
            requirement
        );
        let reply = self
            .llm
            .complete(&[Message::system(CUSTOM_SYSTEM_PROMPT), Message::user(prompt)])
            .await
            .map_err(|e| CataError::Llm(format!("custom classification failed: {}", e)))?;

        let parsed = extract_json_object(&reply)
            .ok_or_else(|| "no JSON object in reply".to_string())
            .and_then(|j| serde_json::from_str::<CustomClassification>(j).map_err(|e| e.to_string()));
        let classified = match parsed {
            Ok(c) => c,
            Err(reason) => {
                let lower = requirement.to_lowercase();
                if INTEGRATION_KEYWORDS.iter().any(|k| lower.contains(k)) {
                    CustomClassification {
                        action: TaskType::Integrate.as_str().to_string(),
                        steps: Vec::new(),
                    }
                } else {
                    return Err(CataError::Llm(format!(
                        "custom classification parse failed: {}",
                        reason
                    )));
                }
            }
        };

        let resolved = match classified.action.trim().parse::<TaskType>() {
            Ok(TaskType::Custom) | Err(_) => TaskType::Idle,
            Ok(t) => t,
        };
        tracing::info!(action = %classified.action, %resolved, "custom requirement classified");

        let inner = ActionPlan {
            action: resolved.as_str().to_string(),
            reason: requirement,
            steps: classified.steps,
            expected_outcome: plan.expected_outcome.clone(),
            priority: plan.priority,
        };
        let result = self.run_concrete(resolved, &inner).await?;
        Ok(result.with_metric("resolved_action", resolved.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemorySection;
    use crate::core::BrainPaths;
    use crate::evolution::log::EvolutionLogEntry;
    use crate::llm::MockLlmClient;
    use crate::memory::markdown_store::init_brain_dir;
    use crate::memory::FileMemory;

    struct Fixture {
        _dir: tempfile::TempDir,
        executor: TaskExecutor,
        mock: Arc<MockLlmClient>,
        log: Arc<EvolutionLogStore>,
        paths: BrainPaths,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let paths = BrainPaths::new(dir.path().join("brain"), dir.path());
        init_brain_dir(&paths).unwrap();
        let mock = Arc::new(MockLlmClient::new());
        let memory = Arc::new(FileMemory::open(paths.clone(), MemorySection::default()));
        let log = Arc::new(EvolutionLogStore::new(paths.evolution_log()));
        let executor = TaskExecutor::new(memory, mock.clone(), log.clone());
        Fixture {
            _dir: dir,
            executor,
            mock,
            log,
            paths,
        }
    }

    fn task(action: &str, steps: &[&str]) -> Task {
        Task::from_plan(
            ActionPlan::new(action, "because", 5).with_steps(steps.iter().map(|s| s.to_string()).collect()),
        )
    }

    #[tokio::test]
    async fn test_unknown_type_rejected_without_state_change() {
        let f = fixture();
        let mut t = task("dance", &[]);
        let err = f.executor.execute(&mut t).await.unwrap_err();
        assert!(matches!(err, CataError::UnknownTaskType(_)));
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(t.result.is_none());
    }

    #[tokio::test]
    async fn test_consolidate_requires_two_steps() {
        let f = fixture();
        let mut t = task("consolidate", &["only topic"]);
        assert!(f.executor.execute(&mut t).await.is_err());
        assert_eq!(t.status, TaskStatus::Failed);
        assert!(!t.result.as_ref().unwrap().success);

        let mut ok = task("consolidate", &["notes", "line one", "line two"]);
        let result = f.executor.execute(&mut ok).await.unwrap();
        assert!(result.success);
        assert_eq!(ok.status, TaskStatus::Completed);
        let path = result.metrics["path"].as_str().unwrap().to_string();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("line one\nline two"));
    }

    #[tokio::test]
    async fn test_recall_uses_top_k() {
        let f = fixture();
        let mut c = task("consolidate", &["tokio", "tokio intervals"]);
        f.executor.execute(&mut c).await.unwrap();

        let mut r = task("recall", &["tokio", "1"]);
        let result = f.executor.execute(&mut r).await.unwrap();
        assert_eq!(result.metrics["result_count"], 1);
        assert!(result.output.starts_with("Found 1 results"));
    }

    #[tokio::test]
    async fn test_idle_learning_is_reason() {
        let f = fixture();
        let mut t = task("idle", &[]);
        let result = f.executor.execute(&mut t).await.unwrap();
        assert_eq!(result.learning, "because");
        assert!(result.metrics.contains_key("completed_at"));
    }

    #[tokio::test]
    async fn test_custom_falls_back_to_integrate_on_garbage() {
        let f = fixture();
        f.mock.push_reply("I think you should integrate things");
        let mut t = task("custom", &["请整合整个 brain 作为 system prompt"]);
        let result = f.executor.execute(&mut t).await.unwrap();
        assert_eq!(result.metrics["resolved_action"], "integrate");
        assert!(f.paths.integrated_prompt().exists());
    }

    #[tokio::test]
    async fn test_custom_garbage_without_keyword_fails() {
        let f = fixture();
        f.mock.push_reply("no idea");
        let mut t = task("custom", &["water the plants"]);
        assert!(f.executor.execute(&mut t).await.is_err());
        assert_eq!(t.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn test_custom_nested_custom_becomes_idle() {
        let f = fixture();
        f.mock.push_reply(r#"{"action":"custom","steps":["again"]}"#);
        let mut t = task("custom", &["do something"]);
        let result = f.executor.execute(&mut t).await.unwrap();
        assert_eq!(result.metrics["resolved_action"], "idle");
    }

    #[tokio::test]
    async fn test_learn_applies_updates() {
        let f = fixture();
        f.mock.push_reply(
            r#"{"hot_updates":[{"topic":"身份","content":"a daemon"}],
                "short_updates":["note one",""],
                "long_updates":[{"topic":"项目知识：queue","content":"priority queue"}]}"#,
        );
        let mut t = task("learn", &["整理记忆"]);
        let result = f.executor.execute(&mut t).await.unwrap();
        assert_eq!(result.metrics["hot_updates"], 1);
        assert_eq!(result.metrics["short_updates"], 1);
        assert_eq!(result.metrics["long_updates"], 1);
        let hot = std::fs::read_to_string(f.paths.hot()).unwrap();
        assert!(hot.contains("a daemon"));
    }

    #[tokio::test]
    async fn test_reflect_empty_log_is_noop() {
        let f = fixture();
        let mut t = task("reflect", &[]);
        let result = f.executor.execute(&mut t).await.unwrap();
        assert!(result.success);
        assert_eq!(f.mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_reflect_stores_long_term() {
        let f = fixture();
        f.log
            .append(EvolutionLogEntry::pending("summarize", "archive big", vec![]))
            .await
            .unwrap();
        f.mock.push_reply("summaries keep failing; check oracle config");
        let mut t = task("reflect", &[]);
        let result = f.executor.execute(&mut t).await.unwrap();
        assert_eq!(result.metrics["entries"], 1);
        let files: Vec<_> = std::fs::read_dir(f.paths.long_term_dir()).unwrap().flatten().collect();
        assert_eq!(files.len(), 1);
    }
}
