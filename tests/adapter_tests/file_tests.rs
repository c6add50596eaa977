//! File Adapter Tests
//!
//! Tests verify:
//! - Creation of the storage file and its parent directories
//! - Persistence across reopen
//! - Corrupt file detection
//! - Use behind a Store

use std::fs;
use std::sync::Arc;

use kvscope::adapter::{FileAdapter, KvAdapter};
use kvscope::{StorageExt, Store, StoreError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_adapter() -> (TempDir, FileAdapter) {
    let temp_dir = TempDir::new().unwrap();
    let adapter = FileAdapter::open(temp_dir.path().join("store.json")).unwrap();
    (temp_dir, adapter)
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_open_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("dir").join("store.json");

    let adapter = FileAdapter::open(&path).unwrap();

    assert!(path.parent().unwrap().exists());
    assert_eq!(adapter.path(), path.as_path());
    assert_eq!(adapter.len().unwrap(), 0);
}

#[test]
fn test_set_get_remove() {
    let (_temp_dir, adapter) = setup_temp_adapter();

    adapter.set("a", "1").unwrap();
    assert_eq!(adapter.get("a").unwrap(), Some("1".to_string()));

    adapter.remove("a").unwrap();
    assert_eq!(adapter.get("a").unwrap(), None);

    adapter.remove("a").unwrap();
}

#[test]
fn test_mutation_writes_file() {
    let (_temp_dir, adapter) = setup_temp_adapter();

    adapter.set("settings.theme", "\"dark\"").unwrap();

    let contents = fs::read_to_string(adapter.path()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
    assert_eq!(parsed["settings.theme"], "\"dark\"");
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_reopen_restores_data() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store.json");

    {
        let adapter = FileAdapter::open(&path).unwrap();
        adapter.set("a", "1").unwrap();
        adapter.set("b", "2").unwrap();
        adapter.remove("a").unwrap();
    }

    let adapter = FileAdapter::open(&path).unwrap();
    assert_eq!(adapter.get("a").unwrap(), None);
    assert_eq!(adapter.get("b").unwrap(), Some("2".to_string()));
    assert_eq!(adapter.keys().unwrap(), vec!["b".to_string()]);
}

#[test]
fn test_empty_file_opens_empty() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store.json");
    fs::write(&path, "").unwrap();

    let adapter = FileAdapter::open(&path).unwrap();
    assert_eq!(adapter.len().unwrap(), 0);
}

#[test]
fn test_corrupt_file_is_adapter_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store.json");
    fs::write(&path, "{not json").unwrap();

    let err = FileAdapter::open(&path).err().unwrap();
    assert!(matches!(err, StoreError::Adapter(_)));
}

// =============================================================================
// Store Integration Tests
// =============================================================================

#[test]
fn test_store_over_file_adapter_persists_and_notifies() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store.json");

    {
        let store = Store::new(Arc::new(FileAdapter::open(&path).unwrap()), "app");
        let changes = store.watch("count").unwrap();

        store.set_item("count", &3).unwrap();

        let event = changes.try_recv().unwrap();
        assert_eq!(event.new_item, Some(serde_json::json!(3)));
    }

    let store = Store::new(Arc::new(FileAdapter::open(&path).unwrap()), "app");
    assert_eq!(store.get_item::<i32>("count").unwrap(), Some(3));
    assert_eq!(store.keys().unwrap(), vec!["count".to_string()]);
}
