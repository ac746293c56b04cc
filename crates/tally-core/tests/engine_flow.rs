use chrono::{Duration, Utc};
use tally_core::engine::Engine;
use tally_core::notify::{ConsoleDesktop, ConsoleToasts};
use tally_core::persist::{FileStorage, Gateway};
use tally_core::task::{CategoryDraft, ReminderPatch, TaskDraft};
use tempfile::tempdir;

fn open_engine(data_dir: &std::path::Path) -> Engine {
    let storage = FileStorage::open(data_dir).expect("open storage");
    Engine::start(
        Gateway::new(Box::new(storage), 1000),
        30_000,
        Box::new(ConsoleToasts),
        Box::new(ConsoleDesktop::new()),
    )
}

#[test]
fn full_flow_persists_reminds_and_rehydrates() {
    let temp = tempdir().expect("tempdir");
    let now = Utc::now();

    let mut engine = open_engine(temp.path());

    let cat = engine
        .add_category(
            CategoryDraft {
                name: "billing".to_string(),
                color: "#aa0044".to_string(),
                icon: String::new(),
            },
            now,
        )
        .expect("add category");

    let mut draft = TaskDraft::new("pay the electricity bill");
    draft.categories = vec![cat];
    draft.due_date = Some(now - Duration::minutes(2));
    let task = engine.add_task(draft, now).expect("add task");
    engine.set_task_reminder(
        task,
        ReminderPatch {
            enabled: Some(true),
            ..Default::default()
        },
        now,
    );

    // The debounce window closes 1s after the last command; the reminder
    // tick lands at +30s and finds the task already overdue.
    engine.pump(now + Duration::seconds(2));
    engine.pump(now + Duration::seconds(31));

    let sent_at = engine
        .store()
        .task(task)
        .expect("task present")
        .reminder
        .sent_at;
    assert!(sent_at.is_some(), "overdue reminder should have fired");

    engine.shutdown(now + Duration::seconds(32));

    // The record on disk is a versioned envelope of the two tables.
    let raw = std::fs::read_to_string(temp.path().join("tally.json")).expect("record");
    let envelope: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
    assert_eq!(envelope["version"], 1);
    assert_eq!(envelope["data"]["tasks"]["allIds"].as_array().map(Vec::len), Some(1));
    assert!(envelope.get("filters").is_none());

    // A fresh engine over the same directory hydrates everything,
    // including the sent marker.
    let mut reopened = open_engine(temp.path());
    let visible = reopened.visible_tasks();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].text, "pay the electricity bill");
    assert_eq!(visible[0].categories, vec![cat]);
    assert_eq!(visible[0].reminder.sent_at, sent_at);

    let stats = reopened.stats(now + Duration::seconds(60));
    assert_eq!(stats.total, 1);
    assert_eq!(stats.overdue, 1);
}

#[test]
fn empty_data_dir_starts_empty() {
    let temp = tempdir().expect("tempdir");
    let mut engine = open_engine(temp.path());
    assert!(engine.visible_tasks().is_empty());
    assert_eq!(engine.stats(Utc::now()).total, 0);
}
