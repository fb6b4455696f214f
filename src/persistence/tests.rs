use super::file_log::{DurableLog, validate_component};
use crate::broker::message::{Message, Payload};
use crate::utils::error::PersistenceError;
use serde_json::json;
use std::fs;
use tempfile::{TempDir, tempdir};

fn create_test_log() -> (TempDir, DurableLog) {
    let dir = tempdir().unwrap();
    let log = DurableLog::open(dir.path()).unwrap();
    (dir, log)
}

fn message(log: &DurableLog, topic: &str, id: &str, amount: i64) -> Message {
    let mut payload = Payload::new();
    payload.insert("amount".to_string(), json!(amount));
    Message::new(topic, id, log.next_sequence(), payload)
}

#[tokio::test]
async fn test_write_creates_one_file_per_message() {
    let (dir, log) = create_test_log();
    let msg = message(&log, "orders", "m1", 10);

    log.write(&msg).await.unwrap();

    let path = dir.path().join("orders").join("m1");
    assert!(path.is_file());
    let stored: Message = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(stored, msg);
}

#[tokio::test]
async fn test_write_leaves_no_temp_files() {
    let (dir, log) = create_test_log();
    log.write(&message(&log, "orders", "m1", 1)).await.unwrap();
    log.write(&message(&log, "orders", "m2", 2)).await.unwrap();

    let names: Vec<String> = fs::read_dir(dir.path().join("orders"))
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.iter().all(|n| !n.starts_with('.')));
}

#[tokio::test]
async fn test_delete_removes_record_and_is_idempotent() {
    let (dir, log) = create_test_log();
    log.write(&message(&log, "orders", "m1", 10)).await.unwrap();

    assert!(log.delete("orders", "m1").await.unwrap());
    assert!(!dir.path().join("orders").join("m1").exists());
    assert!(!log.delete("orders", "m1").await.unwrap());
    assert!(!log.delete("missing", "m1").await.unwrap());
}

#[tokio::test]
async fn test_delete_does_not_touch_other_records() {
    let (_dir, log) = create_test_log();
    log.write(&message(&log, "orders", "m1", 1)).await.unwrap();
    log.write(&message(&log, "orders", "m2", 2)).await.unwrap();

    log.delete("orders", "m1").await.unwrap();

    let ids: Vec<String> = log
        .scan("orders")
        .unwrap()
        .map(|r| r.unwrap().0)
        .collect();
    assert_eq!(ids, vec!["m2".to_string()]);
}

#[tokio::test]
async fn test_scan_is_restartable() {
    let (_dir, log) = create_test_log();
    for (i, id) in ["a", "b", "c"].iter().enumerate() {
        log.write(&message(&log, "t", id, i as i64)).await.unwrap();
    }

    let mut first: Vec<String> = log.scan("t").unwrap().map(|r| r.unwrap().0).collect();
    let mut second: Vec<String> = log.scan("t").unwrap().map(|r| r.unwrap().0).collect();
    first.sort();
    second.sort();
    assert_eq!(first, vec!["a", "b", "c"]);
    assert_eq!(first, second);
}

#[test]
fn test_scan_of_unknown_topic_is_empty() {
    let (_dir, log) = create_test_log();
    assert_eq!(log.scan("nonexistent_topic").unwrap().count(), 0);
}

#[test]
fn test_scan_reports_corrupt_records() {
    let (dir, log) = create_test_log();
    let topic_dir = dir.path().join("orders");
    fs::create_dir_all(&topic_dir).unwrap();
    fs::write(topic_dir.join("broken"), b"{not json").unwrap();

    let results: Vec<_> = log.scan("orders").unwrap().collect();
    assert_eq!(results.len(), 1);
    assert!(results[0].is_err());
}

#[tokio::test]
async fn test_scan_rejects_record_stored_under_wrong_id() {
    let (dir, log) = create_test_log();
    log.write(&message(&log, "orders", "m1", 1)).await.unwrap();
    fs::rename(
        dir.path().join("orders").join("m1"),
        dir.path().join("orders").join("m9"),
    )
    .unwrap();

    let results: Vec<_> = log.scan("orders").unwrap().collect();
    assert!(results[0].is_err());
}

#[test]
fn test_topics_lists_directories_only() {
    let (dir, log) = create_test_log();
    fs::create_dir_all(dir.path().join("b")).unwrap();
    fs::create_dir_all(dir.path().join("a")).unwrap();
    fs::write(dir.path().join("stray-file"), b"x").unwrap();

    assert_eq!(log.topics().unwrap(), vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn test_remove_stale_temp() {
    let (dir, log) = create_test_log();
    let topic_dir = dir.path().join("orders");
    fs::create_dir_all(&topic_dir).unwrap();
    fs::write(topic_dir.join(".abc.tmp"), b"partial").unwrap();
    fs::write(topic_dir.join("m1"), b"{}").unwrap();

    assert_eq!(log.remove_stale_temp("orders").unwrap(), 1);
    assert!(!topic_dir.join(".abc.tmp").exists());
    assert!(topic_dir.join("m1").exists());
}

#[tokio::test]
async fn test_write_rejects_path_escaping_ids() {
    let (_dir, log) = create_test_log();
    let msg = Message::new("orders", "../evil", log.next_sequence(), Payload::new());
    assert!(log.write(&msg).await.is_err());
}

#[test]
fn test_sequence_moves_past_observed_values() {
    let (_dir, log) = create_test_log();
    assert_eq!(log.next_sequence(), 1);
    log.observe_sequence(41);
    assert_eq!(log.next_sequence(), 42);
    log.observe_sequence(3);
    assert_eq!(log.next_sequence(), 43);
}

#[test]
fn test_validate_component() {
    assert!(validate_component("orders").is_ok());
    assert!(validate_component("").is_err());
    assert!(validate_component(".hidden").is_err());
    assert!(validate_component("a/b").is_err());
    assert!(validate_component("a\\b").is_err());
    assert!(validate_component(&"x".repeat(256)).is_err());
}

#[tokio::test]
async fn test_write_fails_when_topic_path_is_not_a_directory() {
    let (dir, log) = create_test_log();
    fs::write(dir.path().join("orders"), b"").unwrap();

    let err = log.write(&message(&log, "orders", "m1", 1)).await.unwrap_err();
    assert!(matches!(err, PersistenceError::Io { .. }));
    assert!(dir.path().join("orders").is_file());
}

#[tokio::test]
async fn test_delete_reports_failure_and_keeps_entry() {
    let (dir, log) = create_test_log();
    let record = dir.path().join("orders").join("m1");
    fs::create_dir_all(&record).unwrap();

    let err = log.delete("orders", "m1").await.unwrap_err();
    assert!(matches!(err, PersistenceError::Io { op: "delete", .. }));
    assert!(record.is_dir());
}
