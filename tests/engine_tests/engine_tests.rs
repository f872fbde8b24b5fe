//! Tests for Engine
//!
//! These tests verify:
//! - Basic set/get/delete/exists operations
//! - Lazy TTL expiry and its effect on disk
//! - Snapshot round trip across reopen
//! - Command execution
//! - Concurrent access

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;
use tidekv::command::{Command, Response};
use tidekv::config::{Config, SnapshotWriteMode};
use tidekv::oplog::read_entries;
use tidekv::{Engine, Scalar, TideError, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(test_config(&temp_dir)).unwrap();
    (temp_dir, engine)
}

fn test_config(temp_dir: &TempDir) -> Config {
    Config::builder().data_dir(temp_dir.path()).build()
}

fn reopen(temp_dir: &TempDir) -> Engine {
    Engine::open(test_config(temp_dir)).unwrap()
}

fn read_snapshot(temp_dir: &TempDir) -> serde_json::Value {
    let bytes = fs::read(temp_dir.path().join("store.json")).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_engine_open_creates_directories() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("nested").join("db");

    let _engine = Engine::open(Config::builder().data_dir(&data_dir).build()).unwrap();

    assert!(data_dir.exists());
    assert!(data_dir.join("operations.log").exists());
}

#[test]
fn test_engine_set_get() {
    let (_temp, engine) = setup_temp_engine();

    engine.set("a", "1", None).unwrap();

    assert_eq!(engine.get("a").unwrap(), Some(Value::from("1")));
}

#[test]
fn test_engine_get_nonexistent_key() {
    let (_temp, engine) = setup_temp_engine();

    assert_eq!(engine.get("missing").unwrap(), None);
    assert!(!engine.exists("missing").unwrap());
}

#[test]
fn test_engine_set_overwrite() {
    let (_temp, engine) = setup_temp_engine();

    engine.set("key", "value1", None).unwrap();
    engine.set("key", Value::record([("n", 2i64)]), None).unwrap();

    assert_eq!(
        engine.get("key").unwrap(),
        Some(Value::record([("n", 2i64)]))
    );
    assert_eq!(engine.len(), 1);
}

#[test]
fn test_engine_delete() {
    let (_temp, engine) = setup_temp_engine();

    engine.set("key", "value", None).unwrap();
    assert!(engine.exists("key").unwrap());

    engine.delete("key").unwrap();

    assert_eq!(engine.get("key").unwrap(), None);
    assert!(!engine.exists("key").unwrap());
}

#[test]
fn test_engine_delete_twice_is_idempotent() {
    let (temp, engine) = setup_temp_engine();

    engine.set("key", "value", Some(Duration::from_secs(60))).unwrap();
    engine.delete("key").unwrap();
    let after_once = read_snapshot(&temp);

    engine.delete("key").unwrap();
    let after_twice = read_snapshot(&temp);

    assert_eq!(after_once, after_twice);
    assert!(engine.is_empty());
    assert!(engine.keys_with_ttl().is_empty());
}

#[test]
fn test_engine_delete_nonexistent_key() {
    let (_temp, engine) = setup_temp_engine();

    engine.delete("never-set").unwrap();
    assert_eq!(engine.get("never-set").unwrap(), None);
}

#[test]
fn test_engine_keys_sorted() {
    let (_temp, engine) = setup_temp_engine();

    engine.set("b", "2", None).unwrap();
    engine.set("a", "1", None).unwrap();
    engine.set("c", "3", None).unwrap();

    assert_eq!(engine.keys(), vec!["a", "b", "c"]);
}

#[test]
fn test_engine_rejects_non_finite_numbers() {
    let (temp, engine) = setup_temp_engine();

    let err = engine.set("inf", f64::INFINITY, None).unwrap_err();
    assert!(matches!(err, TideError::InvalidValue(_)));
    assert!(!err.is_divergent());

    let err = engine
        .set("r", Value::record([("score", f64::NAN)]), None)
        .unwrap_err();
    assert!(matches!(err, TideError::InvalidValue(_)));

    assert!(engine.is_empty());
    assert!(!temp.path().join("store.json").exists());
    assert!(read_entries(engine.oplog_path()).unwrap().is_empty());

    engine.set("ok", 1.5, None).unwrap();
    drop(engine);

    let engine = reopen(&temp);
    assert_eq!(engine.get("ok").unwrap(), Some(Value::from(1.5)));
    assert_eq!(engine.get("inf").unwrap(), None);
    assert!(engine.query("score", Scalar::Null).unwrap().is_empty());
}

// =============================================================================
// TTL Tests
// =============================================================================

#[test]
fn test_engine_ttl_expires_on_get() {
    let (temp, engine) = setup_temp_engine();

    engine.set("session", "token", Some(Duration::from_millis(50))).unwrap();
    assert_eq!(engine.get("session").unwrap(), Some(Value::from("token")));

    thread::sleep(Duration::from_millis(120));

    assert_eq!(engine.get("session").unwrap(), None);
    assert!(engine.keys_with_ttl().is_empty());

    let snapshot = read_snapshot(&temp);
    assert!(snapshot["store"].get("session").is_none());
    assert!(snapshot["ttl"].get("session").is_none());
}

#[test]
fn test_engine_ttl_expires_on_exists() {
    let (_temp, engine) = setup_temp_engine();

    engine.set("k", "v", Some(Duration::from_millis(50))).unwrap();
    thread::sleep(Duration::from_millis(120));

    assert!(!engine.exists("k").unwrap());
    assert!(engine.keys_with_ttl().is_empty());
}

#[test]
fn test_engine_expired_key_stays_until_read() {
    let (temp, engine) = setup_temp_engine();

    engine.set("k", "v", Some(Duration::from_millis(20))).unwrap();
    thread::sleep(Duration::from_millis(60));

    // Nothing has touched the key, so it is still on disk
    assert_eq!(engine.keys_with_ttl(), vec!["k"]);
    assert!(read_snapshot(&temp)["store"].get("k").is_some());

    // But it is not reported as live
    assert!(engine.keys().is_empty());
}

#[test]
fn test_engine_zero_ttl_expires_immediately() {
    let (_temp, engine) = setup_temp_engine();

    engine.set("k", "v", Some(Duration::ZERO)).unwrap();

    assert_eq!(engine.get("k").unwrap(), None);
}

#[test]
fn test_engine_set_without_ttl_clears_expiry() {
    let (_temp, engine) = setup_temp_engine();

    engine.set("k", "v1", Some(Duration::from_millis(50))).unwrap();
    engine.set("k", "v2", None).unwrap();
    thread::sleep(Duration::from_millis(120));

    assert_eq!(engine.get("k").unwrap(), Some(Value::from("v2")));
    assert_eq!(engine.ttl("k").unwrap(), None);
}

#[test]
fn test_engine_ttl_remaining() {
    let (_temp, engine) = setup_temp_engine();

    engine.set("k", "v", Some(Duration::from_secs(60))).unwrap();

    let left = engine.ttl("k").unwrap().unwrap();
    assert!(left <= Duration::from_secs(60));
    assert!(left > Duration::from_secs(50));
}

#[test]
fn test_engine_purge_expired() {
    let (_temp, engine) = setup_temp_engine();

    engine.set("short1", "x", Some(Duration::from_millis(20))).unwrap();
    engine.set("short2", "x", Some(Duration::from_millis(20))).unwrap();
    engine.set("long", "x", Some(Duration::from_secs(60))).unwrap();
    engine.set("forever", "x", None).unwrap();
    thread::sleep(Duration::from_millis(60));

    assert_eq!(engine.purge_expired().unwrap(), 2);
    assert_eq!(engine.keys_with_ttl(), vec!["long"]);
    assert_eq!(engine.keys(), vec!["forever", "long"]);
    assert_eq!(engine.purge_expired().unwrap(), 0);
}

#[test]
fn test_engine_query_skips_expired_record() {
    let (_temp, engine) = setup_temp_engine();

    engine
        .set("b", Value::record([("city", "NYC")]), Some(Duration::from_millis(20)))
        .unwrap();
    engine.set("c", Value::record([("city", "NYC")]), None).unwrap();
    thread::sleep(Duration::from_millis(60));

    assert_eq!(engine.query("city", "NYC").unwrap(), vec!["c"]);
    assert!(engine.indexed_fields("b").is_empty());
    assert!(engine.keys_with_ttl().is_empty());
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_engine_reopen_restores_state() {
    let temp = TempDir::new().unwrap();

    {
        let engine = reopen(&temp);
        engine.set("a", "1", None).unwrap();
        engine.set("b", Value::record([("city", "NYC")]), None).unwrap();
        engine.set("c", Value::record([("city", "NYC")]), Some(Duration::from_secs(3600))).unwrap();
        engine.set("gone", "x", None).unwrap();
        engine.delete("gone").unwrap();
        engine.close().unwrap();
    }

    let before = read_snapshot(&temp);
    let engine = reopen(&temp);

    assert_eq!(engine.get("a").unwrap(), Some(Value::from("1")));
    assert_eq!(engine.get("gone").unwrap(), None);
    assert_eq!(engine.keys_with_ttl(), vec!["c"]);
    assert_eq!(engine.query("city", "NYC").unwrap(), vec!["b", "c"]);

    // Saving again without changes reproduces the same document
    engine.delete("never-existed").unwrap();
    assert_eq!(read_snapshot(&temp), before);
}

#[test]
fn test_engine_snapshot_layout() {
    let (temp, engine) = setup_temp_engine();

    engine.set("u1", Value::record([("age", 30i64)]), None).unwrap();

    let snapshot = read_snapshot(&temp);
    assert_eq!(snapshot["store"]["u1"]["age"], 30);
    assert_eq!(snapshot["index"]["age"][0]["key"], "u1");
    assert_eq!(snapshot["index"]["age"][0]["value"], 30);
    assert!(snapshot["ttl"].as_object().unwrap().is_empty());
}

#[test]
fn test_engine_in_place_snapshot_mode() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .snapshot_write(SnapshotWriteMode::InPlace)
        .build();

    let engine = Engine::open(config.clone()).unwrap();
    engine.set("k", "v", None).unwrap();
    drop(engine);

    assert!(!temp.path().join("store.json.tmp").exists());
    let engine = Engine::open(config).unwrap();
    assert_eq!(engine.get("k").unwrap(), Some(Value::from("v")));
}

#[test]
fn test_engine_open_path() {
    let temp = TempDir::new().unwrap();

    let engine = Engine::open_path(temp.path()).unwrap();
    engine.set("k", "v", None).unwrap();

    assert_eq!(engine.snapshot_path(), temp.path().join("store.json"));
    assert_eq!(engine.oplog_path(), temp.path().join("operations.log"));
}

#[test]
fn test_engine_snapshot_failure_reports_divergence() {
    let (temp, engine) = setup_temp_engine();

    // A non-empty directory where the snapshot belongs makes every save fail
    let blocker = temp.path().join("store.json");
    fs::create_dir(&blocker).unwrap();
    fs::write(blocker.join("occupied"), b"x").unwrap();

    let err = engine.set("k", "v", None).unwrap_err();
    assert!(err.is_divergent());

    // The write stands in memory even though disk never saw it
    assert_eq!(engine.get("k").unwrap(), Some(Value::from("v")));
}

// =============================================================================
// Command Execution Tests
// =============================================================================

#[test]
fn test_engine_execute_set_and_get() {
    let (_temp, engine) = setup_temp_engine();

    let result = engine
        .execute(Command::Set {
            key: "key".to_string(),
            value: Value::from("value"),
            ttl: None,
        })
        .unwrap();
    assert_eq!(result, Response::Done);

    let result = engine
        .execute(Command::Get {
            key: "key".to_string(),
        })
        .unwrap();
    assert_eq!(result, Response::Value(Some(Value::from("value"))));
}

#[test]
fn test_engine_execute_query_and_exists() {
    let (_temp, engine) = setup_temp_engine();

    engine.set("u1", Value::record([("age", 30i64)]), None).unwrap();

    let result = engine
        .execute(Command::Query {
            field: "age".to_string(),
            value: Scalar::Int(30),
        })
        .unwrap();
    assert_eq!(result, Response::Keys(vec!["u1".to_string()]));

    let result = engine
        .execute(Command::Exists {
            key: "u2".to_string(),
        })
        .unwrap();
    assert_eq!(result, Response::Exists(false));
}

#[test]
fn test_engine_execute_delete_ttl_purge() {
    let (_temp, engine) = setup_temp_engine();

    engine.set("k", "v", None).unwrap();

    let result = engine.execute(Command::Ttl { key: "k".to_string() }).unwrap();
    assert_eq!(result, Response::Ttl(None));

    let result = engine.execute(Command::Delete { key: "k".to_string() }).unwrap();
    assert_eq!(result, Response::Done);

    let result = engine.execute(Command::Purge).unwrap();
    assert_eq!(result, Response::Purged(0));
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_engine_concurrent_writers() {
    let (_temp, engine) = setup_temp_engine();
    let engine = Arc::new(engine);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..25 {
                    let key = format!("t{}-k{:02}", t, i);
                    engine
                        .set(key.as_str(), Value::record([("thread", t as i64)]), None)
                        .unwrap();
                    assert!(engine.exists(&key).unwrap());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.len(), 100);
    for t in 0..4 {
        assert_eq!(engine.query("thread", t as i64).unwrap().len(), 25);
    }
}
