//! Entries
//!
//! A live cursor on one key, and immutable snapshots of it.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bus::Subscription;
use crate::error::{Result, StoreError};

use super::{current_value, Storage, StorageExt};

/// Live cursor bound to one key of a store
///
/// Every read goes to the store; nothing is cached.
pub struct Entry<'s, S: Storage + ?Sized, T = Value> {
    key: String,
    store: &'s S,
    _marker: PhantomData<fn() -> T>,
}

impl<'s, S: Storage + ?Sized, T> Entry<'s, S, T> {
    pub fn new(store: &'s S, key: &str) -> Self {
        Self {
            key: key.to_string(),
            store,
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn store(&self) -> &'s S {
        self.store
    }

    /// True iff the key currently holds a value
    pub fn exists(&self) -> Result<bool> {
        self.store.has_item(&self.key)
    }

    pub fn remove(&self) -> Result<()> {
        self.store.remove_item(&self.key)
    }

    /// Every change to this key
    pub fn watch(&self) -> Result<Subscription> {
        self.store.watch(self.key.as_str())
    }

    /// Sets of this key
    pub fn on_changed(&self) -> Result<Subscription> {
        self.store.on_item_changed(self.key.as_str())
    }

    /// Removals of this key
    pub fn on_removed(&self) -> Result<Subscription> {
        self.store.on_item_removed(self.key.as_str())
    }

    /// Same key, different value type
    pub fn typed<U>(&self) -> Entry<'s, S, U> {
        Entry::new(self.store, &self.key)
    }
}

impl<'s, S: Storage + ?Sized, T: DeserializeOwned> Entry<'s, S, T> {
    pub fn get(&self) -> Result<Option<T>> {
        self.store.get_item(&self.key)
    }

    /// Freeze the current state
    pub fn snapshot(&self) -> Result<EntrySnapshot<T>> {
        self.store.entry_snapshot(&self.key)
    }

    /// Current value followed by each distinct new value
    ///
    /// The subscription is taken before the current value is read, so no
    /// change between the two is lost.
    pub fn stream(&self) -> Result<EntryStream<T>> {
        let subscription = self.watch()?;
        let initial = current_value(self.store, &self.key)?;

        Ok(EntryStream {
            key: self.key.clone(),
            initial: Some(initial),
            last: None,
            subscription,
            _marker: PhantomData,
        })
    }
}

impl<'s, S: Storage + ?Sized, T: Serialize> Entry<'s, S, T> {
    pub fn set(&self, value: &T) -> Result<()> {
        self.store.set_item(&self.key, value)
    }
}

impl<'s, S: Storage + ?Sized, T> Clone for Entry<'s, S, T> {
    fn clone(&self) -> Self {
        Entry::new(self.store, &self.key)
    }
}

impl<'s, S: Storage + ?Sized, T> std::fmt::Debug for Entry<'s, S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("prefix", &self.store.prefix())
            .finish()
    }
}

/// Immutable key/value/existence triple captured at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySnapshot<T = Value> {
    pub key: String,
    pub item: Option<T>,
    pub exists: bool,
}

/// Distinct values of one key over time
///
/// Yields the value at creation, then the new value of each change that
/// differs from the previously yielded one. Blocking iteration ends when the
/// owning store is disposed.
pub struct EntryStream<T> {
    key: String,
    initial: Option<Option<Value>>,
    last: Option<Value>,
    subscription: Subscription,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> EntryStream<T> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Next distinct value without blocking
    pub fn try_next(&mut self) -> Option<Result<Option<T>>> {
        if let Some(initial) = self.initial.take() {
            return Some(self.accept(initial));
        }

        while let Some(event) = self.subscription.try_recv() {
            if event.new_item != self.last {
                return Some(self.accept(event.new_item));
            }
        }
        None
    }

    fn accept(&mut self, value: Option<Value>) -> Result<Option<T>> {
        self.last = value.clone();
        value
            .map(|v| {
                serde_json::from_value(v).map_err(|source| StoreError::Decode {
                    key: self.key.clone(),
                    source,
                })
            })
            .transpose()
    }
}

impl<T: DeserializeOwned> Iterator for EntryStream<T> {
    type Item = Result<Option<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(initial) = self.initial.take() {
            return Some(self.accept(initial));
        }

        loop {
            let event = self.subscription.recv()?;
            if event.new_item != self.last {
                return Some(self.accept(event.new_item));
            }
        }
    }
}
