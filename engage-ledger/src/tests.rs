use crate::{replace_via, ActionLedger, RecordKind};
use engage_core::LedgerError;
use std::fs;
use std::io::{self, Write};

fn ledger_in(dir: &tempfile::TempDir) -> ActionLedger {
    ActionLedger::open(dir.path().join("state.json"))
}

#[test]
fn test_missing_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = ledger_in(&dir);

    assert_eq!(ledger.processed_count(RecordKind::Video), 0);
    assert_eq!(ledger.processed_count(RecordKind::Comment), 0);
    assert!(ledger.last_run().is_none());
    assert!(!dir.path().join("state.json").exists());
}

#[test]
fn test_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut ledger = ledger_in(&dir);

    ledger.mark_processed(RecordKind::Comment, "c1");
    ledger.mark_processed(RecordKind::Comment, "c2");
    ledger.mark_processed(RecordKind::Video, "https://v.test/1");
    ledger.persist().unwrap();
    assert!(ledger.last_run().is_some());

    let reopened = ledger_in(&dir);
    assert!(reopened.is_processed(RecordKind::Comment, "c1"));
    assert!(reopened.is_processed(RecordKind::Comment, "c2"));
    assert!(reopened.is_processed(RecordKind::Video, "https://v.test/1"));
    assert_eq!(reopened.processed_count(RecordKind::Comment), 2);
    assert_eq!(reopened.processed_count(RecordKind::Video), 1);
    assert_eq!(reopened.last_run(), ledger.last_run());
}

#[test]
fn test_file_layout() {
    let dir = tempfile::tempdir().unwrap();
    let mut ledger = ledger_in(&dir);
    ledger.mark_processed(RecordKind::Comment, "b");
    ledger.mark_processed(RecordKind::Comment, "a");
    ledger.persist().unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("state.json")).unwrap())
            .unwrap();
    assert_eq!(raw["processed_comments"], serde_json::json!(["a", "b"]));
    assert_eq!(raw["processed_videos"], serde_json::json!([]));
    assert!(raw["last_run"].is_string());
}

#[test]
fn test_mark_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mut ledger = ledger_in(&dir);

    assert!(ledger.mark_processed(RecordKind::Comment, "c1"));
    assert!(!ledger.mark_processed(RecordKind::Comment, "c1"));
    assert_eq!(ledger.processed_count(RecordKind::Comment), 1);
}

#[test]
fn test_namespaces_do_not_collide() {
    let dir = tempfile::tempdir().unwrap();
    let mut ledger = ledger_in(&dir);

    ledger.mark_processed(RecordKind::Video, "same-id");
    assert!(ledger.is_processed(RecordKind::Video, "same-id"));
    assert!(!ledger.is_processed(RecordKind::Comment, "same-id"));
}

#[test]
fn test_malformed_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("state.json"), "{ not json").unwrap();

    let mut ledger = ledger_in(&dir);
    assert_eq!(ledger.processed_count(RecordKind::Comment), 0);

    // The next persist replaces the broken file with a valid one.
    ledger.mark_processed(RecordKind::Comment, "c1");
    ledger.persist().unwrap();
    assert!(ledger_in(&dir).is_processed(RecordKind::Comment, "c1"));
}

#[test]
fn test_partial_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("state.json"),
        r#"{"processed_comments": ["x"]}"#,
    )
    .unwrap();

    let ledger = ledger_in(&dir);
    assert!(ledger.is_processed(RecordKind::Comment, "x"));
    assert_eq!(ledger.processed_count(RecordKind::Video), 0);
}

#[test]
fn test_persist_creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("deeper").join("state.json");

    let mut ledger = ActionLedger::open(&path);
    ledger.mark_processed(RecordKind::Video, "v");
    ledger.persist().unwrap();
    assert!(path.exists());
}

#[test]
fn test_persist_failure_keeps_memory_state() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "a file, not a directory").unwrap();

    let mut ledger = ActionLedger::open(blocker.join("state.json"));
    ledger.mark_processed(RecordKind::Comment, "c1");

    let err = ledger.persist().unwrap_err();
    assert!(matches!(err, LedgerError::CreateDir { .. }));
    assert!(ledger.is_processed(RecordKind::Comment, "c1"));
    assert!(ledger.last_run().is_none());
}

#[test]
fn test_failed_replace_leaves_previous_target_and_no_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    // A directory where the state file should be makes the rename fail.
    let target = dir.path().join("state.json");
    fs::create_dir(&target).unwrap();

    let mut ledger = ActionLedger::open(&target);
    ledger.mark_processed(RecordKind::Comment, "c1");

    assert!(matches!(
        ledger.persist(),
        Err(LedgerError::Replace { .. })
    ));
    assert!(target.is_dir());

    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_failed_write_removes_partial_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("state.json");
    fs::write(&target, "previous").unwrap();
    let tmp = dir.path().join(".state-partial.tmp");

    let result = replace_via(&tmp, &target, |path| {
        let mut file = fs::File::create(path)?;
        file.write_all(b"{\"processed_vid")?;
        Err(io::Error::new(io::ErrorKind::Other, "disk full"))
    });

    assert!(matches!(result, Err(LedgerError::Write { .. })));
    assert!(!tmp.exists());
    assert_eq!(fs::read_to_string(&target).unwrap(), "previous");
}

#[test]
fn test_default_path_shape() {
    let path = ActionLedger::default_path();
    assert!(path.ends_with(".engagerunner/state.json"));
}
