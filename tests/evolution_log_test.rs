//! 演进日志持久化集成测试

use cata::evolution::{EntryOutcome, EvolutionLogEntry, EvolutionLogStore};

#[tokio::test]
async fn test_history_survives_reopen_and_append() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("evolution_log.json");

    let store = EvolutionLogStore::new(&path);
    store
        .append(EvolutionLogEntry::pending("recall", "look up tokio", vec![]))
        .await
        .unwrap();
    store
        .append(EvolutionLogEntry::pending("idle", "nothing pending", vec![]))
        .await
        .unwrap();
    drop(store);

    let reopened = EvolutionLogStore::new(&path);
    let index = reopened
        .append(EvolutionLogEntry::pending("optimize", "archive too big", vec![]))
        .await
        .unwrap();
    assert_eq!(index, 2);
    let actions: Vec<_> = reopened.recent(10).await.into_iter().map(|e| e.action).collect();
    assert_eq!(actions, vec!["recall", "idle", "optimize"]);
}

#[tokio::test]
async fn test_truncated_log_keeps_prior_entries_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("evolution_log.json");

    let store = EvolutionLogStore::new(&path);
    for action in ["recall", "learn", "idle"] {
        store
            .append(EvolutionLogEntry::pending(action, "", vec![]))
            .await
            .unwrap();
    }
    let full = std::fs::read_to_string(&path).unwrap();
    let truncated = &full[..full.len() - 10];
    std::fs::write(&path, truncated).unwrap();

    assert!(store
        .append(EvolutionLogEntry::pending("optimize", "", vec![]))
        .await
        .is_err());
    let outcome = EntryOutcome {
        task_id: "task-1".into(),
        success: true,
        result: "ok".into(),
        learning: String::new(),
    };
    assert!(store.complete(1, outcome).await.is_err());

    let on_disk = std::fs::read_to_string(&path).unwrap();
    assert_eq!(on_disk, truncated);
    assert!(on_disk.contains("\"learn\""));
}
