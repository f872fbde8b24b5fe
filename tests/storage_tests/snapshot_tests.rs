//! Snapshot Tests
//!
//! Tests verify:
//! - Save/load of the three-member document
//! - Missing and unreadable files
//! - Corrupt snapshot policies at engine open
//! - Repair of inconsistent snapshots

use std::collections::BTreeMap;
use std::fs;

use tempfile::TempDir;
use tidekv::config::{Config, CorruptSnapshotPolicy, SnapshotWriteMode};
use tidekv::index::IndexManager;
use tidekv::snapshot::{LoadOutcome, SnapshotCodec, SnapshotView};
use tidekv::{Engine, Scalar, TideError, Value};

// =============================================================================
// Codec Tests
// =============================================================================

#[test]
fn test_load_missing_file() {
    let temp = TempDir::new().unwrap();
    let codec = SnapshotCodec::new(
        temp.path().join("store.json"),
        SnapshotWriteMode::AtomicRename,
        false,
    );

    assert!(matches!(codec.load().unwrap(), LoadOutcome::Missing));
}

#[test]
fn test_save_then_load() {
    let temp = TempDir::new().unwrap();
    let codec = SnapshotCodec::new(
        temp.path().join("store.json"),
        SnapshotWriteMode::AtomicRename,
        true,
    );

    let mut store = BTreeMap::new();
    store.insert("a".to_string(), Value::from("1"));
    store.insert("u1".to_string(), Value::record([("age", 30i64)]));
    let mut ttl = BTreeMap::new();
    ttl.insert("a".to_string(), 1_700_000_000_000u64);
    let mut index = IndexManager::new();
    index.index("u1", &Value::record([("age", 30i64)]));

    codec
        .save(&SnapshotView {
            store: &store,
            ttl: &ttl,
            index: index.entries(),
        })
        .unwrap();

    assert!(!temp.path().join("store.json.tmp").exists());

    let snapshot = match codec.load().unwrap() {
        LoadOutcome::Loaded(snapshot) => snapshot,
        other => panic!("expected a loaded snapshot, got {:?}", other),
    };
    assert_eq!(snapshot.store, store);
    assert_eq!(snapshot.ttl, ttl);
    assert_eq!(snapshot.index["age"][0].key, "u1");
    assert_eq!(snapshot.index["age"][0].value, Scalar::Int(30));
}

#[test]
fn test_load_garbage_is_corrupt() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("store.json");
    fs::write(&path, b"{\"store\": {\"a\": ").unwrap();

    let codec = SnapshotCodec::new(&path, SnapshotWriteMode::InPlace, false);

    assert!(matches!(codec.load().unwrap(), LoadOutcome::Corrupt(_)));
}

#[test]
fn test_load_accepts_missing_members() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("store.json");
    fs::write(&path, br#"{"store": {"a": "1"}}"#).unwrap();

    let codec = SnapshotCodec::new(&path, SnapshotWriteMode::InPlace, false);

    match codec.load().unwrap() {
        LoadOutcome::Loaded(snapshot) => {
            assert_eq!(snapshot.store.len(), 1);
            assert!(snapshot.ttl.is_empty());
            assert!(snapshot.index.is_empty());
        }
        other => panic!("expected a loaded snapshot, got {:?}", other),
    }
}

// =============================================================================
// Corrupt Snapshot Policy Tests
// =============================================================================

#[test]
fn test_corrupt_snapshot_reset_opens_empty() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("store.json"), b"not json at all").unwrap();

    let engine = Engine::open_path(temp.path()).unwrap();

    assert!(engine.is_empty());
    let moved = temp.path().join("store.json.corrupt");
    assert_eq!(fs::read(moved).unwrap(), b"not json at all");

    // The store is usable and the next save creates a fresh file
    engine.set("k", "v", None).unwrap();
    assert!(temp.path().join("store.json").exists());
}

#[test]
fn test_corrupt_snapshot_fail_policy() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("store.json"), b"").unwrap();

    let config = Config::builder()
        .data_dir(temp.path())
        .corrupt_snapshot_policy(CorruptSnapshotPolicy::Fail)
        .build();

    let err = Engine::open(config).err().unwrap();
    assert!(matches!(err, TideError::CorruptSnapshot { .. }));
    assert!(temp.path().join("store.json").exists());
}

// =============================================================================
// Repair Tests
// =============================================================================

#[test]
fn test_open_repairs_inconsistent_snapshot() {
    let temp = TempDir::new().unwrap();
    let doc = r#"{
        "store": {
            "plain": "text",
            "rec": {"city": "NYC"}
        },
        "ttl": {"ghost": 99999999999999},
        "index": {
            "city": [
                {"key": "plain", "value": "NYC"},
                {"key": "missing", "value": "NYC"}
            ]
        }
    }"#;
    fs::write(temp.path().join("store.json"), doc).unwrap();

    let engine = Engine::open_path(temp.path()).unwrap();

    assert!(engine.keys_with_ttl().is_empty());
    assert_eq!(engine.query("city", "NYC").unwrap(), vec!["rec"]);
    assert!(engine.indexed_fields("plain").is_empty());
}

#[test]
fn test_open_drops_index_entries_that_disagree_with_store() {
    let temp = TempDir::new().unwrap();
    let doc = r#"{
        "store": {
            "k": {"age": 31},
            "j": {"age": 30, "city": "LA"}
        },
        "ttl": {},
        "index": {
            "age": [
                {"key": "j", "value": 30},
                {"key": "k", "value": 30}
            ],
            "zip": [
                {"key": "j", "value": "90001"}
            ]
        }
    }"#;
    fs::write(temp.path().join("store.json"), doc).unwrap();

    let engine = Engine::open_path(temp.path()).unwrap();

    assert_eq!(engine.query("age", 30i64).unwrap(), vec!["j"]);
    assert_eq!(engine.query("age", 31i64).unwrap(), vec!["k"]);
    assert!(engine.query("zip", "90001").unwrap().is_empty());
    assert_eq!(engine.indexed_fields("j"), vec!["age", "city"]);
}
