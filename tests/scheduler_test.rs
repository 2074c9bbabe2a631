//! 每日调度与技能开关的集成测试（暂停的 tokio 时钟）

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use cata::skills::{Scheduler, Skill, SkillConfigStore, SkillContext, SkillRegistry};

struct Nightly {
    name: &'static str,
    schedule: &'static str,
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl Skill for Nightly {
    fn name(&self) -> &str {
        self.name
    }
    fn description(&self) -> &str {
        "counts scheduled runs"
    }
    fn schedule(&self) -> &str {
        self.schedule
    }
    async fn run(&self, _ctx: SkillContext, _args: Vec<String>) -> cata::Result<String> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok("done".to_string())
    }
}

fn registry(dir: &std::path::Path) -> Arc<SkillRegistry> {
    Arc::new(SkillRegistry::load(SkillConfigStore::new(dir.join(".cata/skills.json"))).unwrap())
}

#[tokio::test(start_paused = true)]
async fn test_disable_after_start_silences_timer() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(dir.path());
    let consolidate = Arc::new(AtomicUsize::new(0));
    let summarize = Arc::new(AtomicUsize::new(0));
    registry
        .register(Arc::new(Nightly { name: "consolidate", schedule: "23:00", runs: consolidate.clone() }))
        .await
        .unwrap();
    registry
        .register(Arc::new(Nightly { name: "summarize", schedule: "02:00", runs: summarize.clone() }))
        .await
        .unwrap();

    let shutdown = CancellationToken::new();
    let scheduler = Scheduler::new(registry.clone(), shutdown.clone());
    assert_eq!(scheduler.start().await.unwrap(), 2);
    assert_eq!(scheduler.start().await.unwrap(), 2);

    registry.disable("summarize").await.unwrap();
    assert!(!registry.is_registered("summarize").await);

    tokio::time::sleep(Duration::from_secs(3 * 24 * 60 * 60)).await;
    assert!(consolidate.load(Ordering::SeqCst) >= 2);
    assert_eq!(summarize.load(Ordering::SeqCst), 0);

    shutdown.cancel();
}
