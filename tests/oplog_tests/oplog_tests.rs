//! Operation Log Tests
//!
//! Tests verify:
//! - One line per accepted mutation, in order
//! - Reads and expiry evictions are not logged
//! - The log is appended across reopen, never truncated

use std::fs;
use std::time::Duration;

use tempfile::TempDir;
use tidekv::oplog::{read_entries, OpKind, OpLogEntry, OpLogWriter};
use tidekv::{Engine, Value};

// =============================================================================
// Writer Tests
// =============================================================================

#[test]
fn test_writer_appends_lines() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("ops.log");

    let mut writer = OpLogWriter::open(&path, true).unwrap();
    writer
        .append(&OpLogEntry {
            timestamp_ms: 1,
            kind: OpKind::Set,
            key: "a".to_string(),
            value: Some(Value::from("1")),
            ttl: None,
        })
        .unwrap();
    writer
        .append(&OpLogEntry {
            timestamp_ms: 2,
            kind: OpKind::Delete,
            key: "a".to_string(),
            value: None,
            ttl: None,
        })
        .unwrap();

    assert_eq!(writer.entries_written(), 2);
    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text, "1\tSET\t\"a\"\t\"1\"\t\n2\tDELETE\t\"a\"\t\t\n");
}

#[test]
fn test_read_entries_missing_file() {
    let temp = TempDir::new().unwrap();

    let entries = read_entries(&temp.path().join("absent.log")).unwrap();

    assert!(entries.is_empty());
}

#[test]
fn test_read_entries_rejects_malformed_line() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("ops.log");
    fs::write(&path, "this is not a log line\n").unwrap();

    assert!(read_entries(&path).is_err());
}

// =============================================================================
// Engine Logging Tests
// =============================================================================

#[test]
fn test_engine_logs_every_mutation() {
    let temp = TempDir::new().unwrap();
    let engine = Engine::open_path(temp.path()).unwrap();

    engine.set("a", "1", None).unwrap();
    engine
        .set("b", Value::record([("city", "NYC")]), Some(Duration::from_secs(5)))
        .unwrap();
    engine.delete("a").unwrap();
    engine.delete("never-set").unwrap();

    let entries = read_entries(engine.oplog_path()).unwrap();
    let summary: Vec<(OpKind, &str)> = entries
        .iter()
        .map(|e| (e.kind, e.key.as_str()))
        .collect();

    assert_eq!(
        summary,
        vec![
            (OpKind::Set, "a"),
            (OpKind::Set, "b"),
            (OpKind::Delete, "a"),
            (OpKind::Delete, "never-set"),
        ]
    );
    assert_eq!(entries[1].value, Some(Value::record([("city", "NYC")])));
    assert_eq!(entries[1].ttl, Some(Duration::from_secs(5)));
    assert_eq!(entries[0].ttl, None);
}

#[test]
fn test_engine_reads_are_not_logged() {
    let temp = TempDir::new().unwrap();
    let engine = Engine::open_path(temp.path()).unwrap();

    engine.set("k", "v", Some(Duration::ZERO)).unwrap();
    assert_eq!(engine.get("k").unwrap(), None);
    assert!(!engine.exists("k").unwrap());
    engine.query("any", "x").unwrap();

    assert_eq!(read_entries(engine.oplog_path()).unwrap().len(), 1);
}

#[test]
fn test_engine_log_survives_reopen() {
    let temp = TempDir::new().unwrap();

    {
        let engine = Engine::open_path(temp.path()).unwrap();
        engine.set("a", "1", None).unwrap();
        engine.close().unwrap();
    }
    {
        let engine = Engine::open_path(temp.path()).unwrap();
        engine.set("b", "2", None).unwrap();
        engine.close().unwrap();
    }

    let entries = read_entries(&temp.path().join("operations.log")).unwrap();
    let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["a", "b"]);
}
