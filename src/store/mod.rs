//! Store Module
//!
//! The public façade over one logical namespace.
//!
//! ## Responsibilities
//! - CRUD on JSON-encoded values by logical key
//! - Enumeration (keys, items, entries, snapshots), eager and lazy
//! - Change subscriptions routed through the Change Bus
//! - Scoped sub-stores and per-key entries
//!
//! ## Layers
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ StorageExt   typed API (get_item<T>, watch..) │
//! ├───────────────────────────────────────────────┤
//! │ Storage      object-safe primitives           │
//! ├───────────────────────┬───────────────────────┤
//! │ Store                 │ ScopedStore           │
//! │ adapter + bus         │ delegates to parent   │
//! └───────────────────────┴───────────────────────┘
//! ```

mod entry;
mod scoped;
#[allow(clippy::module_inception)]
mod store;

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::bus::{
    decode_raw, BulkSubscription, ChangeEvent, EventKind, HandlerSubscription, Interest, KeyFilter,
    Registration, Sink, Subscription,
};
use crate::error::{Result, StoreError};

pub use entry::{Entry, EntrySnapshot, EntryStream};
pub use scoped::ScopedStore;
pub use store::Store;

/// Caller-supplied key predicate (applied to logical keys)
pub type KeyPredicate<'a> = &'a dyn Fn(&str) -> bool;

/// Object-safe storage primitives shared by [`Store`] and [`ScopedStore`]
///
/// Every method except `prefix`, `effective_prefix`, `is_disposed` and
/// `dispose` fails with [`StoreError::Disposed`] once the storage is disposed.
pub trait Storage: Send + Sync {
    /// This storage's own prefix (for a scope, its segment)
    fn prefix(&self) -> &str;

    /// Full prefix relative to the adapter namespace
    fn effective_prefix(&self) -> String {
        self.prefix().to_string()
    }

    fn is_disposed(&self) -> bool;

    /// Release subscriptions; idempotent, never touches stored data
    fn dispose(&self);

    /// True iff the key currently resolves to a raw value
    fn has_item(&self, key: &str) -> Result<bool>;

    /// Raw (JSON-encoded) value of a key
    fn get_raw(&self, key: &str) -> Result<Option<String>>;

    /// Write a raw (JSON-encoded) value
    fn set_raw(&self, key: &str, raw: &str) -> Result<()>;

    /// Remove a key; a no-op if absent
    fn remove_item(&self, key: &str) -> Result<()>;

    /// Logical keys of this namespace, from one enumeration pass
    fn keys_where(&self, filter: Option<KeyPredicate<'_>>) -> Result<Vec<String>>;

    /// Remove every key of this namespace matching `filter`
    fn clear_where(&self, filter: Option<KeyPredicate<'_>>) -> Result<()>;

    /// Route events matching `interest` to `sink`
    fn register(&self, interest: Interest, sink: Sink) -> Result<Registration>;
}

/// Typed API available on every [`Storage`]
pub trait StorageExt: Storage {
    // -------------------------------------------------------------------------
    // Values
    // -------------------------------------------------------------------------

    /// Decoded value of a key (`None` when absent or stored as `null`)
    fn get_item<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_raw(key)? {
            None => Ok(None),
            Some(raw) => serde_json::from_str::<Option<T>>(&raw).map_err(|source| {
                StoreError::Decode {
                    key: key.to_string(),
                    source,
                }
            }),
        }
    }

    /// JSON-encode and store a value
    fn set_item<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.set_raw(key, &raw)
    }

    /// Value of the `index`-th key in enumeration order
    fn get_item_by_index<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>> {
        match self.key(index)? {
            Some(key) => self.get_item(&key),
            None => Ok(None),
        }
    }

    // -------------------------------------------------------------------------
    // Enumeration
    // -------------------------------------------------------------------------

    /// Number of keys in this namespace
    fn len(&self) -> Result<usize> {
        Ok(self.keys()?.len())
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// The `index`-th key in enumeration order
    fn key(&self, index: usize) -> Result<Option<String>> {
        Ok(self.keys()?.into_iter().nth(index))
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.keys_where(None)
    }

    /// Keys accepted by `filter`
    fn keys_filtered<F: Fn(&str) -> bool>(&self, filter: F) -> Result<Vec<String>> {
        self.keys_where(Some(&filter as KeyPredicate<'_>))
    }

    fn keys_iter(&self, filter: Option<KeyPredicate<'_>>) -> Result<std::vec::IntoIter<String>> {
        Ok(self.keys_where(filter)?.into_iter())
    }

    /// Values of all (matching) keys
    ///
    /// Keys removed between enumeration and read are skipped.
    fn items<T: DeserializeOwned>(&self, filter: Option<KeyPredicate<'_>>) -> Result<Vec<T>> {
        self.items_iter(filter)?.collect()
    }

    fn items_iter<T: DeserializeOwned>(&self, filter: Option<KeyPredicate<'_>>) -> Result<Items<'_, Self, T>> {
        Ok(Items {
            store: self,
            keys: self.keys_iter(filter)?,
            _marker: PhantomData,
        })
    }

    /// Live entries for all (matching) keys
    fn entries(&self, filter: Option<KeyPredicate<'_>>) -> Result<Vec<Entry<'_, Self>>> {
        Ok(self.entries_iter(filter)?.collect())
    }

    fn entries_iter(&self, filter: Option<KeyPredicate<'_>>) -> Result<Entries<'_, Self>> {
        Ok(Entries {
            store: self,
            keys: self.keys_iter(filter)?,
        })
    }

    /// Point-in-time snapshots for all (matching) keys
    fn entries_snapshot<T: DeserializeOwned>(
        &self,
        filter: Option<KeyPredicate<'_>>,
    ) -> Result<Vec<EntrySnapshot<T>>> {
        self.entries_snapshot_iter(filter)?.collect()
    }

    fn entries_snapshot_iter<T: DeserializeOwned>(
        &self,
        filter: Option<KeyPredicate<'_>>,
    ) -> Result<Snapshots<'_, Self, T>> {
        Ok(Snapshots {
            store: self,
            keys: self.keys_iter(filter)?,
            _marker: PhantomData,
        })
    }

    /// Cursor bound to one key (whether or not it exists)
    fn entry<T>(&self, key: &str) -> Entry<'_, Self, T> {
        Entry::new(self, key)
    }

    /// Capture key, value and existence from one read
    fn entry_snapshot<T: DeserializeOwned>(&self, key: &str) -> Result<EntrySnapshot<T>> {
        let raw = self.get_raw(key)?;
        let exists = raw.is_some();
        let item = match raw {
            Some(raw) => serde_json::from_str::<Option<T>>(&raw).map_err(|source| {
                StoreError::Decode {
                    key: key.to_string(),
                    source,
                }
            })?,
            None => None,
        };

        Ok(EntrySnapshot {
            key: key.to_string(),
            item,
            exists,
        })
    }

    /// Remove every key of this namespace
    fn clear(&self) -> Result<()> {
        self.clear_where(None)
    }

    /// Remove only the keys accepted by `filter`
    fn clear_filtered<F: Fn(&str) -> bool>(&self, filter: F) -> Result<()> {
        self.clear_where(Some(&filter as KeyPredicate<'_>))
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Every change to keys matching `filter`
    fn watch(&self, filter: impl Into<KeyFilter>) -> Result<Subscription> {
        self.watch_kind(filter.into(), EventKind::Any)
    }

    /// Changes to keys matching `filter`, delivered in batches
    fn watch_bulk(&self, filter: impl Into<KeyFilter>) -> Result<BulkSubscription> {
        let (tx, rx) = crossbeam::channel::unbounded();
        let registration = self.register(Interest::new(filter.into(), EventKind::Any), Sink::Channel(tx))?;
        Ok(BulkSubscription::new(registration, rx))
    }

    /// Sets only (`removed == false`)
    fn on_item_changed(&self, filter: impl Into<KeyFilter>) -> Result<Subscription> {
        self.watch_kind(filter.into(), EventKind::Changed)
    }

    /// Removals only (`removed == true`)
    fn on_item_removed(&self, filter: impl Into<KeyFilter>) -> Result<Subscription> {
        self.watch_kind(filter.into(), EventKind::Removed)
    }

    /// Invoke `handler` for every change to keys matching `filter`
    ///
    /// The handler runs synchronously on the mutating thread. A panicking
    /// handler is logged and does not stop delivery to other subscribers.
    fn on_change<F>(&self, filter: impl Into<KeyFilter>, handler: F) -> Result<HandlerSubscription>
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let registration = self.register(
            Interest::new(filter.into(), EventKind::Any),
            Sink::Handler(std::sync::Arc::new(handler)),
        )?;
        Ok(HandlerSubscription::new(registration))
    }

    /// Channel subscription for one event kind
    fn watch_kind(&self, filter: KeyFilter, kind: EventKind) -> Result<Subscription> {
        let (tx, rx) = crossbeam::channel::unbounded();
        let registration = self.register(Interest::new(filter, kind), Sink::Channel(tx))?;
        Ok(Subscription::new(registration, rx))
    }
}

impl<S: Storage + ?Sized> StorageExt for S {}

// =============================================================================
// Lazy Iterators
// =============================================================================

/// Lazy values over one key enumeration pass
pub struct Items<'s, S: ?Sized, T> {
    store: &'s S,
    keys: std::vec::IntoIter<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<'s, S: Storage + ?Sized, T: DeserializeOwned> Iterator for Items<'s, S, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        for key in self.keys.by_ref() {
            match self.store.get_item::<T>(&key) {
                Ok(Some(value)) => return Some(Ok(value)),
                Ok(None) => continue, // Removed since enumeration
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

/// Lazy live entries over one key enumeration pass
pub struct Entries<'s, S: ?Sized> {
    store: &'s S,
    keys: std::vec::IntoIter<String>,
}

impl<'s, S: Storage + ?Sized> Iterator for Entries<'s, S> {
    type Item = Entry<'s, S>;

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.keys.next()?;
        Some(Entry::new(self.store, &key))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.keys.size_hint()
    }
}

/// Lazy snapshots over one key enumeration pass
pub struct Snapshots<'s, S: ?Sized, T> {
    store: &'s S,
    keys: std::vec::IntoIter<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<'s, S: Storage + ?Sized, T: DeserializeOwned> Iterator for Snapshots<'s, S, T> {
    type Item = Result<EntrySnapshot<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.keys.next()?;
        Some(self.store.entry_snapshot(&key))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.keys.size_hint()
    }
}

/// Current value of a key as a JSON value (`None` for absent or `null`)
pub(crate) fn current_value<S: Storage + ?Sized>(store: &S, key: &str) -> Result<Option<Value>> {
    decode_raw(key, store.get_raw(key)?.as_deref())
}
