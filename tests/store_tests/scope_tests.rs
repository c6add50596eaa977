//! Scoped Store Tests
//!
//! Tests verify:
//! - Scope additivity (writes visible under the joined key in the parent)
//! - Key enumeration restricted to the scope
//! - Nested scopes
//! - Watch routing with prefix stripping
//! - Clear scoping
//! - Local disposal

use std::sync::Arc;

use serde_json::json;

use kvscope::adapter::MemoryAdapter;
use kvscope::{KeyFilter, Storage, StorageExt, Store, StoreError};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_store() -> Store {
    Store::new(Arc::new(MemoryAdapter::new()), "app")
}

fn sorted(mut keys: Vec<String>) -> Vec<String> {
    keys.sort();
    keys
}

// =============================================================================
// Delegation Tests
// =============================================================================

#[test]
fn test_scope_additivity() {
    let store = setup_store();
    let scope = store.scope("s");
    let before = store.len().unwrap();

    scope.set_item("k", "v").unwrap();

    assert_eq!(store.get_item::<String>("s.k").unwrap().as_deref(), Some("v"));
    assert_eq!(store.len().unwrap(), before + 1);
}

#[test]
fn test_scope_reads_parent_writes() {
    let store = setup_store();
    let scope = store.scope("s");

    store.set_item("s.k", &7).unwrap();

    assert!(scope.has_item("k").unwrap());
    assert_eq!(scope.get_item::<i32>("k").unwrap(), Some(7));
}

#[test]
fn test_scope_keys_are_stripped_and_restricted() {
    let store = setup_store();
    let scope = store.scope("s");
    store.set_item("outside", &0).unwrap();
    store.set_item("sibling.k", &0).unwrap();
    scope.set_item("a", &1).unwrap();
    scope.set_item("b", &2).unwrap();

    assert_eq!(sorted(scope.keys().unwrap()), vec!["a", "b"]);
    assert_eq!(scope.keys_filtered(|key| key == "b").unwrap(), vec!["b"]);
    assert_eq!(store.len().unwrap(), 4);
}

#[test]
fn test_scope_prefixes() {
    let store = setup_store();
    let scope = store.scope("s");
    let nested = scope.scope("t");

    assert_eq!(scope.prefix(), "s");
    assert_eq!(scope.effective_prefix(), "app.s");
    assert_eq!(nested.effective_prefix(), "app.s.t");
}

#[test]
fn test_nested_scope_round_trip() {
    let store = setup_store();
    let nested = store.scope("s").scope("t");

    nested.set_item("k", &[1, 2, 3]).unwrap();

    assert_eq!(store.get_item::<Vec<i32>>("s.t.k").unwrap(), Some(vec![1, 2, 3]));
    assert_eq!(store.scope("s").keys().unwrap(), vec!["t.k"]);
}

#[test]
fn test_scope_works_through_dyn_storage() {
    let store = setup_store();
    let scope = store.scope("s");
    let storage: &dyn Storage = &scope;

    storage.set_item("k", &true).unwrap();

    assert_eq!(storage.get_item::<bool>("k").unwrap(), Some(true));
}

// =============================================================================
// Clear Tests
// =============================================================================

#[test]
fn test_clear_scope_leaves_parent_keys() {
    let store = setup_store();
    let scope = store.scope("s");
    store.set_item("a", &0).unwrap();
    store.set_item("b", &0).unwrap();
    scope.set_item("x", &0).unwrap();
    scope.set_item("y", &0).unwrap();

    let parent_count = store.len().unwrap();
    let scoped_count = scope.len().unwrap();
    scope.clear().unwrap();

    assert!(scope.is_empty().unwrap());
    assert!(store.len().unwrap() >= parent_count - scoped_count);
    assert_eq!(sorted(store.keys().unwrap()), vec!["a", "b"]);
}

#[test]
fn test_clear_filtered_in_scope() {
    let store = setup_store();
    let scope = store.scope("s");
    scope.set_item("keep", &0).unwrap();
    scope.set_item("drop", &0).unwrap();
    store.set_item("drop", &0).unwrap();

    scope.clear_filtered(|key| key == "drop").unwrap();

    assert_eq!(scope.keys().unwrap(), vec!["keep"]);
    assert!(store.has_item("drop").unwrap());
}

// =============================================================================
// Watch Tests
// =============================================================================

#[test]
fn test_scope_watch_strips_prefix() {
    let store = setup_store();
    let scope = store.scope("s");
    let changes = scope.watch("k").unwrap();

    scope.set_item("k", &1).unwrap();
    store.set_item("k", &2).unwrap();
    store.set_item("s.other", &3).unwrap();

    let events = changes.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].key, "k");
    assert_eq!(events[0].new_item, Some(json!(1)));
}

#[test]
fn test_scope_sees_parent_writes_to_its_keys() {
    let store = setup_store();
    let scope = store.scope("s");
    let removed = scope.on_item_removed(KeyFilter::AllKeys).unwrap();

    store.set_item("s.k", &1).unwrap();
    store.remove_item("s.k").unwrap();

    let events = removed.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].key, "k");
    assert!(events[0].removed);
}

#[test]
fn test_nested_scope_watch() {
    let store = setup_store();
    let nested = store.scope("s").scope("t");
    let changes = nested.watch(KeyFilter::AllKeys).unwrap();

    store.set_item("s.t.k", &1).unwrap();
    store.set_item("s.k", &1).unwrap();

    let keys: Vec<String> = changes.drain().into_iter().map(|e| e.key).collect();
    assert_eq!(keys, vec!["k"]);
}

#[test]
fn test_scope_bulk_watch() {
    let store = setup_store();
    let scope = store.scope("s");
    let bulk = scope.watch_bulk(KeyFilter::AllKeys).unwrap();

    for i in 0..3 {
        scope.set_item("k", &i).unwrap();
    }

    let batch = bulk.try_recv_batch().unwrap();
    assert_eq!(batch.len(), 3);
    assert!(batch.iter().all(|e| e.key == "k"));
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_scope_dispose_is_local() {
    let store = setup_store();
    let scope = store.scope("s");
    let parent_changes = store.watch(KeyFilter::AllKeys).unwrap();
    let scope_changes = scope.watch(KeyFilter::AllKeys).unwrap();

    scope.dispose();
    scope.dispose();

    assert!(scope.is_disposed());
    assert!(!store.is_disposed());
    assert!(!scope_changes.is_active());
    assert!(parent_changes.is_active());

    store.set_item("s.k", &1).unwrap();
    assert!(scope_changes.try_recv().is_none());
    assert_eq!(parent_changes.try_recv().unwrap().key, "s.k");

    assert!(matches!(scope.get_item::<i32>("k"), Err(StoreError::Disposed)));
    assert!(matches!(scope.watch("k"), Err(StoreError::Disposed)));
}

#[test]
fn test_scope_dispose_discards_queued_events() {
    let store = setup_store();
    let scope = store.scope("s");
    let changes = scope.watch("k").unwrap();
    let bulk = scope.watch_bulk("k").unwrap();

    scope.set_item("k", &1).unwrap();
    scope.dispose();

    assert!(changes.try_recv().is_none());
    assert!(bulk.try_recv_batch().is_none());
}

#[test]
fn test_sibling_scopes_are_independent() {
    let store = setup_store();
    let first = store.scope("s");
    let second = store.scope("s");
    let changes = second.watch("k").unwrap();

    first.dispose();
    first.set_item("k", &1).unwrap_err();
    second.set_item("k", &1).unwrap();

    assert_eq!(changes.try_recv().unwrap().new_item, Some(json!(1)));
}

#[test]
fn test_parent_dispose_reaches_scope_operations() {
    let store = setup_store();
    let scope = store.scope("s");

    store.dispose();

    assert!(!scope.is_disposed());
    assert!(matches!(scope.set_item("k", &1), Err(StoreError::Disposed)));
}

#[test]
fn test_scope_clone_is_independent() {
    let store = setup_store();
    let scope = store.scope("s");
    let clone = scope.clone();

    clone.dispose();

    assert!(!scope.is_disposed());
    scope.set_item("k", &1).unwrap();
    assert_eq!(store.get_item::<i32>("s.k").unwrap(), Some(1));
}
