//! Store
//!
//! Prefix codec + adapter + change bus over one namespace.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::adapter::{KvAdapter, ObservedAdapter, SharedAdapter};
use crate::bus::{ChangeBus, Interest, Registration, Sink};
use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::prefix;

use super::{KeyPredicate, ScopedStore, Storage};

/// A namespace over a key-value adapter
///
/// ## State machine
/// ```text
/// Active ──dispose()──► Disposed (terminal)
/// ```
///
/// `Store` is a handle; scopes derived from it share its state, so disposing
/// the store is visible through them. [`Clone`] creates an independent store
/// (same adapter and prefix, own subscriptions and lifecycle).
pub struct Store {
    core: Arc<StoreCore>,
}

struct StoreCore {
    /// Namespace prefix (immutable)
    prefix: String,

    /// Underlying adapter, always one with a feed
    adapter: SharedAdapter,

    /// Change routing for this store
    bus: ChangeBus,

    disposed: AtomicBool,
}

impl Store {
    /// Open a store from configuration
    ///
    /// Without a configured adapter the process-wide
    /// [`shared_memory`](crate::adapter::shared_memory) adapter is used.
    pub fn open(config: Config) -> Self {
        let adapter = config.adapter.unwrap_or_else(crate::adapter::shared_memory);
        Self::new(adapter, config.prefix)
    }

    /// Create a store over `adapter` with the given prefix
    ///
    /// An adapter without a native feed is wrapped in a private
    /// [`ObservedAdapter`]; such a store then only observes its own writes.
    pub fn new(adapter: SharedAdapter, prefix: impl Into<String>) -> Self {
        let adapter: SharedAdapter = if adapter.feed().is_some() {
            adapter
        } else {
            Arc::new(ObservedAdapter::new(adapter))
        };
        let prefix = prefix.into();

        Self {
            core: Arc::new(StoreCore {
                bus: ChangeBus::new(prefix.clone(), Arc::clone(&adapter)),
                prefix,
                adapter,
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Nested namespace under `prefix`
    pub fn scope(&self, prefix: &str) -> ScopedStore {
        ScopedStore::new(Arc::new(self.share()), prefix)
    }

    /// The adapter this store writes through
    pub fn adapter(&self) -> &SharedAdapter {
        &self.core.adapter
    }

    /// This store's change bus
    pub fn bus(&self) -> &ChangeBus {
        &self.core.bus
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Another handle on the same store
    fn share(&self) -> Store {
        Store {
            core: Arc::clone(&self.core),
        }
    }

    fn physical(&self, key: &str) -> String {
        prefix::to_physical(&self.core.prefix, key)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(StoreError::Disposed);
        }
        Ok(())
    }
}

impl Clone for Store {
    fn clone(&self) -> Self {
        Store::new(Arc::clone(&self.core.adapter), self.core.prefix.clone())
    }
}

impl Storage for Store {
    fn prefix(&self) -> &str {
        &self.core.prefix
    }

    fn is_disposed(&self) -> bool {
        self.core.disposed.load(Ordering::Acquire)
    }

    fn dispose(&self) {
        if self.core.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.core.bus.close();
        tracing::debug!("Disposed store with prefix '{}'", self.core.prefix);
    }

    fn has_item(&self, key: &str) -> Result<bool> {
        self.ensure_active()?;
        Ok(self.core.adapter.get(&self.physical(key))?.is_some())
    }

    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        self.ensure_active()?;
        self.core.adapter.get(&self.physical(key))
    }

    fn set_raw(&self, key: &str, raw: &str) -> Result<()> {
        self.ensure_active()?;
        self.core.adapter.set(&self.physical(key), raw)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.ensure_active()?;
        self.core.adapter.remove(&self.physical(key))
    }

    fn keys_where(&self, filter: Option<KeyPredicate<'_>>) -> Result<Vec<String>> {
        self.ensure_active()?;

        let keys = self
            .core
            .adapter
            .keys()?
            .iter()
            .filter_map(|physical| prefix::from_physical(&self.core.prefix, physical))
            .filter(|key| filter.map_or(true, |f| f(*key)))
            .map(str::to_string)
            .collect();

        Ok(keys)
    }

    fn clear_where(&self, filter: Option<KeyPredicate<'_>>) -> Result<()> {
        for key in self.keys_where(filter)? {
            self.core.adapter.remove(&self.physical(&key))?;
        }
        Ok(())
    }

    fn register(&self, interest: Interest, sink: Sink) -> Result<Registration> {
        self.ensure_active()?;
        self.core.bus.register(interest, sink)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("prefix", &self.core.prefix)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
