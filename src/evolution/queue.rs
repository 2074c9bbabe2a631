//! 持久化优先级任务队列
//!
//! 内存中是按入队顺序排列的 `Vec<QueuedTask>`，每次修改后整体重写 `task_queue.json`。
//! 所有修改都在写锁内完成「改内存 + 落盘」，读操作只取共享锁。
//!
//! 落盘失败只记 warn：内存中的修改保留，下一次成功写入会带上它。

use std::path::Path;

use tokio::sync::RwLock;

use crate::core::{CataError, JsonFile, Result};

use super::types::{now_rfc3339, ActionPlan, CreatedBy, QueuedTask, TaskResult, TaskStatus};

pub struct TaskQueue {
    tasks: RwLock<Vec<QueuedTask>>,
    file: JsonFile,
}

impl TaskQueue {
    /// 从文件加载；文件缺失或无法解析时得到空队列
    pub fn load(path: impl AsRef<Path>) -> Self {
        let file = JsonFile::new(path);
        let tasks = match file.load::<Vec<QueuedTask>>() {
            Ok(Some(tasks)) => {
                tracing::debug!(count = tasks.len(), path = %file.path().display(), "task queue loaded");
                tasks
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(path = %file.path().display(), error = %e, "task queue unreadable, starting empty");
                Vec::new()
            }
        };
        Self {
            tasks: RwLock::new(tasks),
            file,
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    async fn persist(&self, tasks: &[QueuedTask]) {
        if let Err(e) = self.file.save_async(tasks).await {
            tracing::warn!(path = %self.file.path().display(), error = %e, "failed to persist task queue");
        }
    }

    /// 入队：新 ID、pending、追加到末尾并落盘
    pub async fn enqueue(&self, plan: ActionPlan, created_by: CreatedBy) -> QueuedTask {
        let queued = QueuedTask::new(plan, created_by);
        let mut tasks = self.tasks.write().await;
        tasks.push(queued.clone());
        self.persist(&tasks).await;
        tracing::info!(task_id = %queued.task.id, task_type = %queued.task.task_type, priority = queued.task.priority, %created_by, "task enqueued");
        queued
    }

    /// 取出优先级最高的 pending 任务（同优先级先入队者优先），标记为 running
    pub async fn dequeue(&self) -> Option<QueuedTask> {
        let mut tasks = self.tasks.write().await;

        let mut best: Option<usize> = None;
        for (i, t) in tasks.iter().enumerate() {
            if t.task.status != TaskStatus::Pending {
                continue;
            }
            match best {
                Some(b) if tasks[b].task.priority >= t.task.priority => {}
                _ => best = Some(i),
            }
        }

        let idx = best?;
        let task = &mut tasks[idx];
        task.task.status = TaskStatus::Running;
        task.task.started_at = Some(now_rfc3339());
        let out = task.clone();
        self.persist(&tasks).await;
        Some(out)
    }

    /// 更新状态与结果；未知 ID 或非法状态迁移时不写文件
    pub async fn update_task(
        &self,
        id: &str,
        status: TaskStatus,
        result: Option<TaskResult>,
    ) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .iter_mut()
            .find(|t| t.task.id == id)
            .ok_or_else(|| CataError::TaskNotFound(id.to_string()))?;

        let from = task.task.status;
        if !from.can_transition_to(status) {
            return Err(CataError::InvalidTransition {
                id: id.to_string(),
                from,
                to: status,
            });
        }

        task.task.status = status;
        if status == TaskStatus::Running && task.task.started_at.is_none() {
            task.task.started_at = Some(now_rfc3339());
        }
        if result.is_some() {
            task.task.result = result;
        }
        if status.is_terminal() {
            task.task.completed_at = Some(now_rfc3339());
        }
        self.persist(&tasks).await;
        Ok(())
    }

    /// 最新在前；可按状态过滤，limit 为 None 时不限条数
    pub async fn list_tasks(
        &self,
        status_filter: Option<TaskStatus>,
        limit: Option<usize>,
    ) -> Vec<QueuedTask> {
        let tasks = self.tasks.read().await;
        tasks
            .iter()
            .rev()
            .filter(|t| status_filter.map_or(true, |s| t.task.status == s))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub async fn get_task(&self, id: &str) -> Option<QueuedTask> {
        let tasks = self.tasks.read().await;
        tasks.iter().find(|t| t.task.id == id).cloned()
    }

    pub async fn pending_count(&self) -> usize {
        let tasks = self.tasks.read().await;
        tasks
            .iter()
            .filter(|t| t.task.status == TaskStatus::Pending)
            .count()
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    /// 把当前内存状态写盘（关闭时调用）
    pub async fn flush(&self) -> Result<()> {
        let tasks = self.tasks.read().await;
        self.file.save_async(&*tasks).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(action: &str, priority: i64) -> ActionPlan {
        ActionPlan::new(action, "test", priority)
    }

    #[tokio::test]
    async fn test_dequeue_highest_priority_first_seen_wins() {
        let dir = tempfile::tempdir().unwrap();
        let queue = TaskQueue::load(dir.path().join("task_queue.json"));

        let a = queue.enqueue(plan("idle", 3), CreatedBy::User).await;
        let b = queue.enqueue(plan("recall", 9), CreatedBy::User).await;
        let c = queue.enqueue(plan("optimize", 9), CreatedBy::System).await;

        let first = queue.dequeue().await.unwrap();
        assert_eq!(first.task.id, b.task.id);
        assert_eq!(first.task.status, TaskStatus::Running);
        assert!(first.task.started_at.is_some());

        assert_eq!(queue.dequeue().await.unwrap().task.id, c.task.id);
        assert_eq!(queue.dequeue().await.unwrap().task.id, a.task.id);
        assert!(queue.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn test_dequeue_empty_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let queue = TaskQueue::load(dir.path().join("q.json"));
        assert!(queue.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn test_update_unknown_id_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.json");
        let queue = TaskQueue::load(&path);
        queue.enqueue(plan("idle", 1), CreatedBy::User).await;
        let before = std::fs::read_to_string(&path).unwrap();

        let err = queue
            .update_task("task-missing", TaskStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CataError::TaskNotFound(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_illegal_transition_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let queue = TaskQueue::load(dir.path().join("q.json"));
        let t = queue.enqueue(plan("idle", 1), CreatedBy::User).await;

        let err = queue
            .update_task(&t.task.id, TaskStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CataError::InvalidTransition { .. }));

        queue.dequeue().await.unwrap();
        queue
            .update_task(&t.task.id, TaskStatus::Completed, Some(TaskResult::ok("done")))
            .await
            .unwrap();
        let err = queue
            .update_task(&t.task.id, TaskStatus::Pending, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CataError::InvalidTransition { .. }));

        let stored = queue.get_task(&t.task.id).await.unwrap();
        assert_eq!(stored.task.status, TaskStatus::Completed);
        assert!(stored.task.completed_at.is_some());
        assert_eq!(stored.task.result.unwrap().output, "done");
    }

    #[tokio::test]
    async fn test_list_newest_first_with_filter() {
        let dir = tempfile::tempdir().unwrap();
        let queue = TaskQueue::load(dir.path().join("q.json"));
        let a = queue.enqueue(plan("idle", 1), CreatedBy::User).await;
        let b = queue.enqueue(plan("idle", 1), CreatedBy::User).await;
        let c = queue.enqueue(plan("idle", 1), CreatedBy::User).await;

        let all = queue.list_tasks(None, None).await;
        let ids: Vec<_> = all.iter().map(|t| t.task.id.clone()).collect();
        assert_eq!(ids, vec![c.task.id.clone(), b.task.id.clone(), a.task.id.clone()]);

        queue.dequeue().await.unwrap();
        let pending = queue.list_tasks(Some(TaskStatus::Pending), Some(1)).await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].task.id, c.task.id);
        assert_eq!(queue.pending_count().await, 2);
    }

    #[tokio::test]
    async fn test_unparsable_file_gives_empty_queue() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.json");
        std::fs::write(&path, "not json").unwrap();
        let queue = TaskQueue::load(&path);
        assert!(queue.is_empty().await);
    }
}
