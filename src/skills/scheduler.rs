//! 每日定时调度
//!
//! 每个带 `HH:MM` 调度的技能一个 tokio 任务：先睡到下一次触发时间，之后固定 24h 间隔。
//! 错过的触发不补跑。每次触发前回查注册表，已禁用的技能直接跳过。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::{CataError, Result};

use super::registry::SkillRegistry;
use super::skill::{Skill, SkillContext, Trigger};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// 解析 `HH:MM`（0-23 / 0-59）
pub fn parse_daily_schedule(schedule: &str) -> Result<(u32, u32)> {
    let invalid = |reason: &str| CataError::InvalidSchedule {
        schedule: schedule.to_string(),
        reason: reason.to_string(),
    };
    let parts: Vec<&str> = schedule.trim().split(':').collect();
    if parts.len() != 2 {
        return Err(invalid("expected HH:MM"));
    }
    let hour: u32 = parts[0].trim().parse().map_err(|_| invalid("invalid hour"))?;
    let minute: u32 = parts[1].trim().parse().map_err(|_| invalid("invalid minute"))?;
    if hour > 23 || minute > 59 {
        return Err(invalid("hour must be 0-23, minute must be 0-59"));
    }
    Ok((hour, minute))
}

/// 今天的 HH:MM 尚未过去则取今天，否则取明天
pub fn next_occurrence<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32, minute: u32) -> DateTime<Tz> {
    let tz = now.timezone();
    let at = |date: chrono::NaiveDate| {
        date.and_hms_opt(hour, minute, 0)
            .and_then(|naive| tz.from_local_datetime(&naive).earliest())
    };

    let today = now.date_naive();
    if let Some(t) = at(today) {
        if t >= *now {
            return t;
        }
    }
    let mut date = today;
    // 夏令时跳过的时刻在当天不存在，顺延到下一个存在的日期
    for _ in 0..3 {
        date = date.succ_opt().unwrap_or(date);
        if let Some(t) = at(date) {
            return t;
        }
    }
    now.clone() + chrono::Duration::days(1)
}

fn delay_until(target: &DateTime<Local>) -> Duration {
    (*target - Local::now()).to_std().unwrap_or(Duration::ZERO)
}

#[derive(Default)]
struct Armed {
    token: Option<CancellationToken>,
    handles: Vec<JoinHandle<()>>,
}

pub struct Scheduler {
    registry: Arc<SkillRegistry>,
    shutdown: CancellationToken,
    armed: Mutex<Armed>,
}

impl Scheduler {
    /// shutdown 取消时所有定时器随之停止
    pub fn new(registry: Arc<SkillRegistry>, shutdown: CancellationToken) -> Self {
        Self {
            registry,
            shutdown,
            armed: Mutex::new(Armed::default()),
        }
    }

    /// 为每个有效调度的技能启动定时器，返回启动数；已启动时不重复启动
    pub async fn start(&self) -> Result<usize> {
        let mut armed = self.armed.lock().await;
        if armed.token.is_some() {
            return Ok(armed.handles.len());
        }

        let token = self.shutdown.child_token();
        let mut handles = Vec::new();
        for skill in self.registry.with_schedule().await {
            let schedule = skill.schedule().to_string();
            let (hour, minute) = match parse_daily_schedule(&schedule) {
                Ok(hm) => hm,
                Err(e) => {
                    tracing::warn!(skill = skill.name(), error = %e, "invalid schedule, skipped");
                    continue;
                }
            };
            tracing::info!(skill = skill.name(), %schedule, "daily schedule registered");
            handles.push(tokio::spawn(daily_timer(
                self.registry.clone(),
                skill,
                hour,
                minute,
                token.clone(),
            )));
        }

        let n = handles.len();
        armed.token = Some(token);
        armed.handles = handles;
        tracing::info!(timers = n, "scheduler started");
        Ok(n)
    }

    /// 取消所有定时器
    pub async fn stop(&self) {
        let mut armed = self.armed.lock().await;
        if let Some(token) = armed.token.take() {
            token.cancel();
            armed.handles.clear();
            tracing::info!("scheduler stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.armed.lock().await.token.is_some()
    }

    pub async fn run_skill(&self, name: &str, args: Vec<String>) -> Result<String> {
        let skill = self
            .registry
            .get(name)
            .await
            .ok_or_else(|| CataError::UnknownSkill(name.to_string()))?;
        self.run_now(skill, args).await
    }

    pub async fn run_by_cli_command(&self, cmd: &str, args: Vec<String>) -> Result<String> {
        let skill = self
            .registry
            .get_by_cli_command(cmd)
            .await
            .ok_or_else(|| CataError::UnknownSkill(cmd.to_string()))?;
        self.run_now(skill, args).await
    }

    async fn run_now(&self, skill: Arc<dyn Skill>, args: Vec<String>) -> Result<String> {
        tracing::info!(skill = skill.name(), ?args, "running skill on demand");
        let ctx = SkillContext::new(self.shutdown.child_token(), Trigger::Command);
        skill.run(ctx, args).await
    }
}

async fn daily_timer(
    registry: Arc<SkillRegistry>,
    skill: Arc<dyn Skill>,
    hour: u32,
    minute: u32,
    token: CancellationToken,
) {
    let first = next_occurrence(&Local::now(), hour, minute);
    tokio::select! {
        _ = token.cancelled() => return,
        _ = tokio::time::sleep(delay_until(&first)) => fire(&registry, &skill, &token).await,
    }

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + DAY, DAY);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => fire(&registry, &skill, &token).await,
        }
    }
}

async fn fire(registry: &SkillRegistry, skill: &Arc<dyn Skill>, token: &CancellationToken) {
    if registry.get(skill.name()).await.is_none() {
        tracing::debug!(skill = skill.name(), "skill disabled, scheduled run skipped");
        return;
    }
    tracing::info!(skill = skill.name(), "running scheduled skill");
    let ctx = SkillContext::new(token.child_token(), Trigger::Scheduled);
    if let Err(e) = skill.run(ctx, Vec::new()).await {
        tracing::warn!(skill = skill.name(), error = %e, "scheduled skill failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::config::SkillConfigStore;
    use async_trait::async_trait;
    use chrono::{FixedOffset, Timelike};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_parse_daily_schedule() {
        assert_eq!(parse_daily_schedule("23:00").unwrap(), (23, 0));
        assert_eq!(parse_daily_schedule("7:05").unwrap(), (7, 5));
        assert!(parse_daily_schedule("24:00").is_err());
        assert!(parse_daily_schedule("12:60").is_err());
        assert!(parse_daily_schedule("noon").is_err());
        assert!(matches!(
            parse_daily_schedule("1:2:3"),
            Err(CataError::InvalidSchedule { .. })
        ));
    }

    #[test]
    fn test_next_occurrence_today_or_tomorrow() {
        let tz = FixedOffset::east_opt(8 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2025, 3, 10, 22, 30, 0).unwrap();

        let later = next_occurrence(&now, 23, 0);
        assert_eq!(later, tz.with_ymd_and_hms(2025, 3, 10, 23, 0, 0).unwrap());

        let passed = next_occurrence(&now, 2, 0);
        assert_eq!(passed, tz.with_ymd_and_hms(2025, 3, 11, 2, 0, 0).unwrap());
        assert_eq!(passed.hour(), 2);

        let exact = next_occurrence(&now, 22, 30);
        assert_eq!(exact, now);
    }

    struct Fixed(&'static str, &'static str);

    #[async_trait]
    impl Skill for Fixed {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            ""
        }
        fn schedule(&self) -> &str {
            self.1
        }
        fn cli_command(&self) -> Option<&str> {
            Some("fixed-cmd")
        }
        async fn run(&self, ctx: SkillContext, args: Vec<String>) -> Result<String> {
            Ok(format!("{}:{}:{}", self.0, ctx.trigger, args.join(",")))
        }
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_skips_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let registry =
            Arc::new(SkillRegistry::load(SkillConfigStore::new(dir.path().join("s.json"))).unwrap());
        registry.register(Arc::new(Fixed("good", "03:00"))).await.unwrap();
        registry.register(Arc::new(Fixed("bad", "25:99"))).await.unwrap();
        registry.register(Arc::new(Fixed("none", ""))).await.unwrap();

        let scheduler = Scheduler::new(registry, CancellationToken::new());
        assert_eq!(scheduler.start().await.unwrap(), 1);
        assert_eq!(scheduler.start().await.unwrap(), 1);
        assert!(scheduler.is_running().await);

        scheduler.stop().await;
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test]
    async fn test_two_daily_skills_arm_two_timers() {
        let dir = tempfile::tempdir().unwrap();
        let registry =
            Arc::new(SkillRegistry::load(SkillConfigStore::new(dir.path().join("s.json"))).unwrap());
        registry.register(Arc::new(Fixed("nightly", "23:00"))).await.unwrap();
        registry.register(Arc::new(Fixed("early", "02:00"))).await.unwrap();

        let scheduler = Scheduler::new(registry, CancellationToken::new());
        assert_eq!(scheduler.start().await.unwrap(), 2);
        assert_eq!(scheduler.start().await.unwrap(), 2);
        scheduler.stop().await;
    }

    struct Counting {
        name: &'static str,
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Skill for Counting {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            ""
        }
        fn schedule(&self) -> &str {
            "00:00"
        }
        async fn run(&self, _ctx: SkillContext, _args: Vec<String>) -> Result<String> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(String::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_skill_stops_firing() {
        let dir = tempfile::tempdir().unwrap();
        let registry =
            Arc::new(SkillRegistry::load(SkillConfigStore::new(dir.path().join("s.json"))).unwrap());
        let kept = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicUsize::new(0));
        registry
            .register(Arc::new(Counting { name: "kept", runs: kept.clone() }))
            .await
            .unwrap();
        registry
            .register(Arc::new(Counting { name: "dropped", runs: dropped.clone() }))
            .await
            .unwrap();

        let scheduler = Scheduler::new(registry.clone(), CancellationToken::new());
        assert_eq!(scheduler.start().await.unwrap(), 2);
        registry.disable("dropped").await.unwrap();

        // 首次触发不超过 24h，之后每 24h 一次
        tokio::time::sleep(Duration::from_secs(49 * 60 * 60)).await;

        assert!(kept.load(Ordering::SeqCst) >= 2);
        assert_eq!(dropped.load(Ordering::SeqCst), 0);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_run_skill_direct() {
        let dir = tempfile::tempdir().unwrap();
        let registry =
            Arc::new(SkillRegistry::load(SkillConfigStore::new(dir.path().join("s.json"))).unwrap());
        registry.register(Arc::new(Fixed("good", ""))).await.unwrap();
        let scheduler = Scheduler::new(registry, CancellationToken::new());

        assert_eq!(
            scheduler.run_skill("good", vec!["x".into()]).await.unwrap(),
            "good:command:x"
        );
        assert_eq!(
            scheduler.run_by_cli_command("fixed-cmd", vec![]).await.unwrap(),
            "good:command:"
        );
        assert!(matches!(
            scheduler.run_skill("missing", vec![]).await,
            Err(CataError::UnknownSkill(_))
        ));
    }
}
