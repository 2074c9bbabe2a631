//! 控制命令处理
//!
//! 每个命令一个函数，参数校验失败返回 `success:false` 和用法说明，不产生任何修改。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use serde_json::json;

use crate::core::blocking;
use crate::evolution::{ActionPlan, CreatedBy, TaskStatus, TaskType};
use crate::memory::{MemoryPiece, Message};

use super::daemon::AppContext;
use super::protocol::{Request, Response};

pub const DEFAULT_RECALL_TOP_K: usize = 5;
pub const DEFAULT_HISTORY_COUNT: usize = 20;
pub const DEFAULT_TASK_LIST_LIMIT: usize = 50;
pub const DEFAULT_TASK_PRIORITY: i64 = 5;
const DIGEST_TOP_K: usize = 20;
const DIGEST_DEFAULT_RANGE: &str = "7d";
const REASON_MAX_CHARS: usize = 200;

const DIGEST_SYSTEM_PROMPT: &str =
    "你是一个记忆整理助手。请把下面的记忆片段归纳为简洁的中文摘要，列出要点与值得跟进的事项。";

pub async fn handle(ctx: &AppContext, req: Request) -> Response {
    tracing::debug!(command = %req.command, args = ?req.args, "control request");
    let args = req.args;
    match req.command.as_str() {
        "ping" => Response::ok("pong"),
        "recall" => recall(ctx, &args).await,
        "consolidate" => consolidate(ctx, &args).await,
        "digest" => digest(ctx, &args).await,
        "skill_list" => skill_list(ctx).await,
        "skill_get" => skill_get(ctx, &args).await,
        "skill_enable" => skill_toggle(ctx, &args, true).await,
        "skill_disable" => skill_toggle(ctx, &args, false).await,
        "skill_run" => skill_run(ctx, &args).await,
        "evolve" => evolve(ctx, &args).await,
        "task" => task(ctx, &args).await,
        other => Response::error(format!("Unknown command: {}", other)),
    }
}

// ---------------------------------------------------------------------------
// 记忆
// ---------------------------------------------------------------------------

#[derive(Debug, Default, PartialEq)]
struct RecallArgs {
    query: String,
    top_k: usize,
    category: Option<String>,
    domain: Option<String>,
}

fn parse_recall_args(args: &[String]) -> Result<RecallArgs, String> {
    let usage = "Usage: recall <query> [topK] [--category C] [--domain D]";
    let mut parsed = RecallArgs {
        top_k: DEFAULT_RECALL_TOP_K,
        ..Default::default()
    };
    let mut positional = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--category" => parsed.category = Some(iter.next().ok_or(usage)?.clone()),
            "--domain" => parsed.domain = Some(iter.next().ok_or(usage)?.clone()),
            _ => positional.push(arg.as_str()),
        }
    }

    let Some(query) = positional.first().filter(|q| !q.trim().is_empty()) else {
        return Err(usage.to_string());
    };
    parsed.query = query.to_string();
    if let Some(k) = positional.get(1) {
        parsed.top_k = k
            .parse::<usize>()
            .ok()
            .filter(|k| *k > 0)
            .ok_or_else(|| format!("Invalid topK: {}", k))?;
    }
    Ok(parsed)
}

async fn recall(ctx: &AppContext, args: &[String]) -> Response {
    let parsed = match parse_recall_args(args) {
        Ok(p) => p,
        Err(msg) => return Response::error(msg),
    };
    match ctx
        .memory
        .recall(
            &parsed.query,
            parsed.top_k,
            parsed.category.as_deref(),
            parsed.domain.as_deref(),
        )
        .await
    {
        Ok(pieces) => Response::ok_with(format!("Found {} results", pieces.len()), pieces),
        Err(e) => Response::error(format!("Recall failed: {}", e)),
    }
}

async fn consolidate(ctx: &AppContext, args: &[String]) -> Response {
    if args.len() < 2 {
        return Response::error("Usage: consolidate <topic> <content...>");
    }
    let topic = &args[0];
    let content = args[1..].join(" ");
    match ctx.memory.consolidate(topic, &content).await {
        Ok(path) => Response::ok_with(
            "Content consolidated successfully",
            json!({ "topic": topic, "path": path.display().to_string() }),
        ),
        Err(e) => Response::error(format!("Consolidate failed: {}", e)),
    }
}

#[derive(Debug, PartialEq)]
struct DigestArgs {
    query: Option<String>,
    time_range: String,
}

fn parse_digest_args(args: &[String]) -> Result<DigestArgs, String> {
    let mut time_range = DIGEST_DEFAULT_RANGE.to_string();
    let mut words = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--since" => {
                time_range = iter
                    .next()
                    .ok_or("Usage: digest [query] [--since 7d|--week|--month]")?
                    .clone()
            }
            "--week" => time_range = "7d".to_string(),
            "--month" => time_range = "30d".to_string(),
            _ => words.push(arg.as_str()),
        }
    }
    parse_range(&time_range)?;
    let query = words.join(" ");
    Ok(DigestArgs {
        query: (!query.trim().is_empty()).then_some(query),
        time_range,
    })
}

/// `7d` / `12h` / `2w`
fn parse_range(range: &str) -> Result<Duration, String> {
    let invalid = || format!("Invalid time range: {} (expected e.g. 7d, 12h, 2w)", range);
    let range = range.trim();
    let unit = range.chars().last().ok_or_else(invalid)?;
    let n: u64 = range[..range.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| invalid())?;
    let secs = match unit {
        'h' => 3600,
        'd' => 24 * 3600,
        'w' => 7 * 24 * 3600,
        _ => return Err(invalid()),
    };
    let total = n.checked_mul(secs).ok_or_else(invalid)?;
    Ok(Duration::from_secs(total))
}

/// 修改时间在 range 内的 archive 文件，最新在前
async fn recent_archive(ctx: &AppContext, range: Duration) -> Vec<MemoryPiece> {
    let dir = ctx.paths.archive_dir();
    blocking(move || Ok(scan_archive(&dir, range)))
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "archive scan failed");
            Vec::new()
        })
}

fn scan_archive(dir: &Path, range: Duration) -> Vec<MemoryPiece> {
    let cutoff = SystemTime::now().checked_sub(range).unwrap_or(SystemTime::UNIX_EPOCH);
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut files: Vec<(SystemTime, PathBuf)> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().map_or(false, |x| x == "md"))
        .filter_map(|p| {
            let modified = std::fs::metadata(&p).and_then(|m| m.modified()).ok()?;
            (modified >= cutoff).then_some((modified, p))
        })
        .collect();
    files.sort_by(|a, b| b.0.cmp(&a.0));

    files
        .into_iter()
        .take(DIGEST_TOP_K)
        .filter_map(|(_, path)| {
            let content = std::fs::read_to_string(&path).ok()?;
            Some(MemoryPiece {
                content,
                category: "archive".to_string(),
                source: path.display().to_string(),
                priority: 0,
            })
        })
        .collect()
}

async fn digest(ctx: &AppContext, args: &[String]) -> Response {
    let parsed = match parse_digest_args(args) {
        Ok(p) => p,
        Err(msg) => return Response::error(msg),
    };

    let pieces = match &parsed.query {
        Some(q) => match ctx.memory.recall(q, DIGEST_TOP_K, None, None).await {
            Ok(pieces) => pieces,
            Err(e) => return Response::error(format!("Recall failed: {}", e)),
        },
        None => {
            let range = parse_range(&parsed.time_range).unwrap_or(Duration::ZERO);
            recent_archive(ctx, range).await
        }
    };

    let summary = pieces
        .iter()
        .map(|p| format!("### {}\n{}", p.source, p.content.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");

    let llm_summary = if pieces.is_empty() {
        String::new()
    } else {
        let messages = [Message::system(DIGEST_SYSTEM_PROMPT), Message::user(summary.clone())];
        match ctx.llm.complete(&messages).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "digest summary failed");
                format!("LLM summary generation failed: {}", e)
            }
        }
    };

    Response::ok_with(
        format!("Digest generated from {} memories", pieces.len()),
        json!({
            "query": parsed.query.as_deref().unwrap_or("all"),
            "time_range": parsed.time_range,
            "summary": summary,
            "llm_summary": llm_summary,
            "count": pieces.len(),
        }),
    )
}

// ---------------------------------------------------------------------------
// 技能
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
struct SkillListing {
    name: String,
    enabled: bool,
    schedule: String,
    cli_command: String,
    oracle_visible: bool,
    /// 注册表中有可执行的实现；只在 skills-index 中出现的为 false
    implemented: bool,
    description: String,
    tags: Vec<String>,
    dependencies: Vec<String>,
}

async fn skill_list(ctx: &AppContext) -> Response {
    let mut listing: BTreeMap<String, SkillListing> = BTreeMap::new();
    for skill in ctx.skills.list().await {
        listing.insert(
            skill.name().to_string(),
            SkillListing {
                name: skill.name().to_string(),
                enabled: true,
                schedule: skill.schedule().to_string(),
                cli_command: skill.cli_command().unwrap_or_default().to_string(),
                oracle_visible: skill.oracle_visible(),
                implemented: true,
                description: skill.description().to_string(),
                ..Default::default()
            },
        );
    }

    for meta in ctx.skills_index.load_or_default().await.skills {
        let enabled = ctx.skills.is_enabled(&meta.name).await;
        let entry = listing
            .entry(meta.name.clone())
            .or_insert_with(|| SkillListing {
                name: meta.name.clone(),
                enabled,
                ..Default::default()
            });
        if entry.description.is_empty() {
            entry.description = meta.description;
        }
        entry.tags = meta.tags;
        entry.dependencies = meta.dependencies;
    }

    let skills: Vec<SkillListing> = listing.into_values().collect();
    Response::ok_with(
        format!("Found {} skills (registry + skills-index)", skills.len()),
        skills,
    )
}

async fn skill_get(ctx: &AppContext, args: &[String]) -> Response {
    let Some(name) = args.first() else {
        return Response::error("Usage: skill_get <name>");
    };
    let skill = ctx.skills.get(name).await;
    let meta = ctx.skills_index.meta(name).await;
    if skill.is_none() && meta.is_none() {
        return Response::error(format!("Skill not found: {}", name));
    }

    let mut data = json!({
        "name": name,
        "registered": skill.is_some(),
        "enabled": ctx.skills.is_enabled(name).await,
    });
    if let Some(skill) = &skill {
        data["description"] = json!(skill.description());
        data["schedule"] = json!(skill.schedule());
        data["cli_command"] = json!(skill.cli_command());
        data["oracle_visible"] = json!(skill.oracle_visible());
    }
    if let Some(meta) = &meta {
        if skill.is_none() {
            data["description"] = json!(meta.description);
        }
        data["path"] = json!(meta.path);
        data["version"] = json!(meta.version);
        data["author"] = json!(meta.author);
        data["tags"] = json!(meta.tags);
        data["dependencies"] = json!(meta.dependencies);
        data["content"] = json!(ctx.skills_index.read_doc(meta).await);
    }
    Response::ok_with(format!("Skill: {}", name), data)
}

async fn skill_toggle(ctx: &AppContext, args: &[String], enable: bool) -> Response {
    let verb = if enable { "enable" } else { "disable" };
    let Some(name) = args.first().filter(|n| !n.trim().is_empty()) else {
        return Response::error(format!("Usage: skill_{} <name>", verb));
    };
    let result = if enable {
        ctx.skills.enable(name).await
    } else {
        ctx.skills.disable(name).await
    };
    match result {
        Ok(()) if enable => Response::ok(format!(
            "Skill '{}' enabled (takes effect after restart)",
            name
        )),
        Ok(()) => Response::ok(format!("Skill '{}' disabled", name)),
        Err(e) => Response::error(format!("Failed to {} skill {}: {}", verb, name, e)),
    }
}

async fn skill_run(ctx: &AppContext, args: &[String]) -> Response {
    let Some(target) = args.first() else {
        return Response::error("Usage: skill_run <name-or-cli-command> [args...]");
    };
    let rest = args[1..].to_vec();

    let result = if ctx.skills.is_registered(target).await {
        ctx.scheduler.run_skill(target, rest).await
    } else {
        ctx.scheduler.run_by_cli_command(target, rest).await
    };
    match result {
        Ok(output) => Response::ok_with(
            format!("Skill {} finished", target),
            json!({ "skill": target, "output": output }),
        ),
        Err(e) => Response::error(format!("Skill run failed: {}", e)),
    }
}

// ---------------------------------------------------------------------------
// 演进
// ---------------------------------------------------------------------------

async fn evolve(ctx: &AppContext, args: &[String]) -> Response {
    let Some(sub) = args.first() else {
        return Response::error("Usage: evolve <status|history [n]|once>");
    };
    match sub.as_str() {
        "status" => {
            let state = ctx.engine.analyze().await;
            Response::ok_with(
                "Evolution status",
                json!({
                    "enabled": ctx.engine.is_enabled(),
                    "history_len": ctx.engine.history_len().await,
                    "memory_state": state.memory_state,
                    "task_state": state.task_state,
                    "evolution_state": state.evolution_state,
                    "timestamp": state.timestamp,
                }),
            )
        }
        "history" => {
            let n = match args.get(1) {
                Some(n) => match n.parse::<usize>() {
                    Ok(n) => n,
                    Err(_) => return Response::error(format!("Invalid count: {}", n)),
                },
                None => DEFAULT_HISTORY_COUNT,
            };
            let entries = ctx.engine.log().recent(n).await;
            Response::ok_with(format!("Found {} evolution entries", entries.len()), entries)
        }
        "once" => {
            let engine = ctx.engine.clone();
            tokio::spawn(async move {
                let task = engine.execute_autonomous_cycle().await;
                tracing::info!(task_id = %task.id, status = %task.status, "manual evolution cycle finished");
            });
            Response::ok("Evolution cycle triggered, check status later")
        }
        other => Response::error(format!("Unknown evolve subcommand: {}", other)),
    }
}

// ---------------------------------------------------------------------------
// 任务
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
struct CreateArgs {
    plan: ActionPlan,
    run_async: bool,
}

fn parse_create_args(args: &[String]) -> Result<CreateArgs, String> {
    let usage = "Usage: task create [type] <steps...> [--async] [--priority N]";
    let mut run_async = false;
    let mut priority = DEFAULT_TASK_PRIORITY;
    let mut words = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--async" => run_async = true,
            "--priority" => {
                let raw = iter.next().ok_or(usage)?;
                priority = raw
                    .parse()
                    .map_err(|_| format!("Invalid priority: {}", raw))?;
            }
            _ => words.push(arg.clone()),
        }
    }
    if words.is_empty() {
        return Err(usage.to_string());
    }

    let (task_type, steps) = match words[0].parse::<TaskType>() {
        Ok(TaskType::Custom) => (TaskType::Custom, vec![words[1..].join(" ")]),
        Ok(t) => (t, words[1..].to_vec()),
        Err(_) => (TaskType::Custom, vec![words.join(" ")]),
    };
    if task_type == TaskType::Custom && steps.iter().all(|s| s.trim().is_empty()) {
        return Err(usage.to_string());
    }

    let reason = if task_type == TaskType::Custom {
        truncate_chars(&steps[0], REASON_MAX_CHARS)
    } else {
        format!("Task created via catacli: {}", task_type)
    };
    let plan = ActionPlan::new(task_type.as_str(), reason, priority)
        .with_steps(steps)
        .with_expected_outcome(format!("Execute {} task successfully", task_type));
    Ok(CreateArgs { plan, run_async })
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push_str("...");
    out
}

async fn task(ctx: &AppContext, args: &[String]) -> Response {
    let Some(sub) = args.first() else {
        return Response::error("Usage: task <create|list|status> ...");
    };
    let rest = &args[1..];
    match sub.as_str() {
        "create" => task_create(ctx, rest).await,
        "list" => task_list(ctx, rest).await,
        "status" => task_status(ctx, rest).await,
        other => Response::error(format!("Unknown task subcommand: {}", other)),
    }
}

async fn task_create(ctx: &AppContext, args: &[String]) -> Response {
    let CreateArgs { plan, run_async } = match parse_create_args(args) {
        Ok(c) => c,
        Err(msg) => return Response::error(msg),
    };

    if run_async {
        return match ctx.engine.enqueue_task(plan, CreatedBy::User).await {
            Ok(queued) => Response::ok_with(
                format!("Task queued: {}", queued.id()),
                json!({
                    "task_id": queued.task.id,
                    "type": queued.task.task_type,
                    "status": queued.task.status,
                    "created_at": queued.task.created_at,
                }),
            ),
            Err(e) => Response::error(format!("Failed to queue task: {}", e)),
        };
    }

    let task = match ctx.engine.execute_task(plan).await {
        Ok(task) => task,
        Err(e) => return Response::error(format!("Failed to execute task: {}", e)),
    };
    let result = task.result.clone().unwrap_or_default();
    let data = json!({
        "task_id": task.id,
        "type": task.task_type,
        "output": result.output,
        "learning": result.learning,
        "success": result.success,
        "metrics": result.metrics,
    });
    if result.success {
        Response::ok_with(format!("Task completed: {}", task.id), data)
    } else {
        let mut resp = Response::ok_with(format!("Task execution failed: {}", result.error), data);
        resp.success = false;
        resp
    }
}

async fn task_list(ctx: &AppContext, args: &[String]) -> Response {
    let mut status = None;
    let mut limit = DEFAULT_TASK_LIST_LIMIT;
    for arg in args {
        if let Ok(n) = arg.parse::<usize>() {
            limit = n;
        } else {
            match arg.parse::<TaskStatus>() {
                Ok(s) => status = Some(s),
                Err(e) => return Response::error(e.to_string()),
            }
        }
    }
    let tasks = ctx.engine.queue().list_tasks(status, Some(limit)).await;
    Response::ok_with(format!("Found {} tasks", tasks.len()), tasks)
}

async fn task_status(ctx: &AppContext, args: &[String]) -> Response {
    let Some(id) = args.first() else {
        return Response::error("Usage: task status <id>");
    };
    match ctx.engine.queue().get_task(id).await {
        Some(task) => Response::ok_with(format!("Task {}: {}", id, task.status()), task),
        None => Response::error(format!("Task not found: {}", id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::llm::{LlmClient, MockLlmClient};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    async fn context(dir: &std::path::Path, llm: Arc<MockLlmClient>) -> Arc<AppContext> {
        let mut config = AppConfig::default();
        config.brain.dir = Some(dir.join("brain"));
        config.brain.base_dir = Some(dir.to_path_buf());
        config.evolution.enabled = false;
        let llm: Arc<dyn LlmClient> = llm;
        AppContext::build(config, Some(llm), CancellationToken::new())
            .await
            .unwrap()
    }

    #[test]
    fn test_parse_recall_args() {
        let parsed =
            parse_recall_args(&strings(&["tokio", "3", "--category", "rust", "--domain", "dev"])).unwrap();
        assert_eq!(parsed.query, "tokio");
        assert_eq!(parsed.top_k, 3);
        assert_eq!(parsed.category.as_deref(), Some("rust"));
        assert_eq!(parsed.domain.as_deref(), Some("dev"));

        assert_eq!(parse_recall_args(&strings(&["q"])).unwrap().top_k, DEFAULT_RECALL_TOP_K);
        assert!(parse_recall_args(&[]).unwrap_err().starts_with("Usage: recall"));
        assert!(parse_recall_args(&strings(&["q", "zero"])).is_err());
    }

    #[test]
    fn test_parse_digest_args() {
        let d = parse_digest_args(&strings(&["rust", "async", "--month"])).unwrap();
        assert_eq!(d.query.as_deref(), Some("rust async"));
        assert_eq!(d.time_range, "30d");

        let d = parse_digest_args(&[]).unwrap();
        assert_eq!(d.query, None);
        assert_eq!(d.time_range, "7d");

        assert_eq!(parse_range("12h").unwrap(), Duration::from_secs(12 * 3600));
        assert!(parse_digest_args(&strings(&["--since", "soon"])).is_err());

        // 溢出的区间按非法参数拒绝
        assert!(parse_digest_args(&strings(&["--since", "999999999999999d"])).is_err());
        assert!(parse_range("18446744073709551615w").is_err());
    }

    #[test]
    fn test_parse_create_args() {
        let c = parse_create_args(&strings(&["recall", "tokio", "--async", "--priority", "9"])).unwrap();
        assert!(c.run_async);
        assert_eq!(c.plan.action, "recall");
        assert_eq!(c.plan.steps, vec!["tokio".to_string()]);
        assert_eq!(c.plan.priority, 9);
        assert_eq!(c.plan.reason, "Task created via catacli: recall");
        assert_eq!(c.plan.expected_outcome, "Execute recall task successfully");

        let custom = parse_create_args(&strings(&["整理", "本周", "笔记"])).unwrap();
        assert!(!custom.run_async);
        assert_eq!(custom.plan.action, "custom");
        assert_eq!(custom.plan.steps, vec!["整理 本周 笔记".to_string()]);
        assert_eq!(custom.plan.priority, DEFAULT_TASK_PRIORITY);
        assert_eq!(custom.plan.reason, "整理 本周 笔记");

        let long = "x".repeat(250);
        let c = parse_create_args(&[long]).unwrap();
        assert_eq!(c.plan.reason.chars().count(), REASON_MAX_CHARS + 3);

        assert!(parse_create_args(&[]).is_err());
        assert!(parse_create_args(&strings(&["idle", "--priority", "high"])).is_err());
    }

    #[tokio::test]
    async fn test_unknown_commands_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), Arc::new(MockLlmClient::new())).await;

        let resp = handle(&ctx, Request::new("fly", Vec::<String>::new())).await;
        assert!(!resp.success);
        assert_eq!(resp.message, "Unknown command: fly");

        let resp = handle(&ctx, Request::new("task", ["explode"])).await;
        assert_eq!(resp.message, "Unknown task subcommand: explode");
        assert!(ctx.engine.queue().is_empty().await);

        let resp = handle(&ctx, Request::new("task", ["status", "task-none"])).await;
        assert_eq!(resp.message, "Task not found: task-none");
    }

    #[tokio::test]
    async fn test_consolidate_then_recall() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), Arc::new(MockLlmClient::new())).await;

        let resp = handle(
            &ctx,
            Request::new("consolidate", ["tokio-notes", "tokio", "select", "cancellation"]),
        )
        .await;
        assert!(resp.success, "{}", resp.message);
        assert_eq!(resp.message, "Content consolidated successfully");

        let resp = handle(&ctx, Request::new("recall", ["tokio"])).await;
        assert!(resp.success);
        let hits = resp.data.unwrap();
        assert!(!hits.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_task_create_sync_and_async() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), Arc::new(MockLlmClient::new())).await;

        let resp = handle(&ctx, Request::new("task", ["create", "idle", "rest"])).await;
        assert!(resp.success, "{}", resp.message);
        let data = resp.data.unwrap();
        assert_eq!(data["type"], "idle");
        assert_eq!(data["success"], true);

        let resp = handle(&ctx, Request::new("task", ["create", "optimize", "--async"])).await;
        assert!(resp.success);
        let data = resp.data.unwrap();
        assert_eq!(data["status"], "pending");
        let id = data["task_id"].as_str().unwrap().to_string();

        let resp = handle(&ctx, Request::new("task", ["status", id.as_str()])).await;
        assert!(resp.success);
        assert_eq!(resp.data.unwrap()["created_by"], "user");

        let resp = handle(&ctx, Request::new("task", ["list", "pending"])).await;
        assert_eq!(resp.data.unwrap().as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_skill_list_and_run_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), Arc::new(MockLlmClient::new())).await;

        let resp = handle(&ctx, Request::new("skill_list", Vec::<String>::new())).await;
        let skills = resp.data.unwrap();
        let names: Vec<&str> = skills
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"daily-consolidate"));
        assert!(names.contains(&"periodic-summarize"));

        let resp = handle(&ctx, Request::new("skill_run", ["periodic-summarize"])).await;
        assert!(resp.success, "{}", resp.message);

        let resp = handle(&ctx, Request::new("skill_run", ["nope"])).await;
        assert!(!resp.success);
    }

    #[tokio::test]
    async fn test_digest_reports_summary_failure_in_data() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmClient::failing());
        let ctx = context(dir.path(), llm).await;
        ctx.memory.consolidate("digest-topic", "weekly tokio review").await.unwrap();

        let resp = handle(&ctx, Request::new("digest", ["digest"])).await;
        assert!(resp.success);
        let data = resp.data.unwrap();
        assert!(data["count"].as_u64().unwrap() >= 1);
        assert!(data["llm_summary"]
            .as_str()
            .unwrap()
            .starts_with("LLM summary generation failed"));
    }

    #[tokio::test]
    async fn test_evolve_history_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), Arc::new(MockLlmClient::new())).await;
        handle(&ctx, Request::new("task", ["create", "idle"])).await;

        let resp = handle(&ctx, Request::new("evolve", ["history", "5"])).await;
        assert_eq!(resp.data.unwrap().as_array().unwrap().len(), 1);

        let resp = handle(&ctx, Request::new("evolve", ["status"])).await;
        let data = resp.data.unwrap();
        assert_eq!(data["enabled"], false);
        assert!(data.get("memory_state").is_some());

        let resp = handle(&ctx, Request::new("evolve", ["rewind"])).await;
        assert!(!resp.success);
    }
}
