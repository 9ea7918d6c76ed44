//! Tests for the task registry lifecycle: admission, state transitions,
//! operator abort and escalation, eviction.

use std::collections::HashSet;
use std::time::Duration;

use odn::registry::TaskRegistry;
use odn::types::{Priority, TaskState};

#[test]
fn every_registration_gets_a_fresh_unique_id() {
    let registry = TaskRegistry::new();
    let mut seen = HashSet::new();

    for i in 0..500 {
        let task = registry.register("grp:1", &format!("query {i}"), Priority::Gamma);
        assert!(task.id.starts_with("0x"), "id format: {}", task.id);
        assert!(
            task.id[2..].chars().all(|c| c.is_ascii_hexdigit()),
            "hex id: {}",
            task.id
        );
        assert!(seen.insert(task.id), "registry issued a duplicate id");
    }
    assert_eq!(registry.len(), 500);
}

#[test]
fn abort_on_unknown_id_is_benign() {
    let registry = TaskRegistry::new();
    assert!(!registry.abort("0xFFFF"));
    assert!(!registry.set_priority("0xFFFF", Priority::Alpha));
    registry.update_state("0xFFFF", TaskState::Completed);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn aborting_a_live_task_cancels_it_and_hides_it() {
    let registry = TaskRegistry::new();
    let task = registry.register("grp:1", "long-running lookup", Priority::Beta);

    registry.update_state(&task.id, TaskState::Running);
    let turn = tokio::spawn(async {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    });
    assert!(registry.bind_handle(&task.id, turn.abort_handle()));

    assert!(registry.abort(&task.id));
    assert!(
        !registry.list_active().iter().any(|t| t.id == task.id),
        "aborted task must disappear from the active list"
    );
    assert!(
        turn.await.expect_err("turn was cancelled").is_cancelled(),
        "the processing computation itself is cancelled"
    );
}

#[tokio::test]
async fn bind_handle_on_unknown_id_returns_false() {
    let registry = TaskRegistry::new();
    let handle = tokio::spawn(async {}).abort_handle();
    assert!(!registry.bind_handle("0xABCD", handle));
}

#[test]
fn operator_escalates_a_stuck_request() {
    let registry = TaskRegistry::new();
    let task = registry.register("grp:7", "deep archive search", Priority::Gamma);
    registry.update_state(&task.id, TaskState::Running);

    assert!(registry.set_priority(&task.id, Priority::Alpha));

    let active = registry.list_active();
    let escalated = active
        .iter()
        .find(|t| t.id == task.id)
        .expect("task still active");
    assert_eq!(escalated.priority, Priority::Alpha);
    assert_eq!(escalated.state, TaskState::Running);
    assert!(escalated.started_at.is_some(), "running task has a start time");
}

#[test]
fn shelved_tasks_stay_visible_until_evicted() {
    let registry = TaskRegistry::new();
    let shelved = registry.register("grp:1", "parked", Priority::Beta);
    let done = registry.register("grp:1", "finished", Priority::Beta);

    registry.update_state(&shelved.id, TaskState::Shelved);
    registry.update_state(&done.id, TaskState::Completed);

    let active: Vec<String> = registry.list_active().into_iter().map(|t| t.id).collect();
    assert!(active.contains(&shelved.id));
    assert!(!active.contains(&done.id));

    // The completed entry is still in the map until the purge.
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.evict_finished(), 1);
    assert_eq!(registry.len(), 1);

    // Operations on the evicted id are benign no-ops.
    registry.update_state(&done.id, TaskState::Running);
    assert!(!registry.abort(&done.id));
}

#[test]
fn list_active_returns_a_snapshot() {
    let registry = TaskRegistry::new();
    let task = registry.register("grp:1", "q", Priority::Gamma);

    let snapshot = registry.list_active();
    // Mutating the registry after the snapshot does not change it.
    registry.update_state(&task.id, TaskState::Completed);
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].state, TaskState::Pending);
}
