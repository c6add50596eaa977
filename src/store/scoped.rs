//! Scoped Store
//!
//! A nested namespace that delegates everything to its parent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bus::{Interest, Registration, RegistrationHandle, Sink};
use crate::error::{Result, StoreError};
use crate::prefix;

use super::{KeyPredicate, Storage};

/// A namespace nested inside a parent storage
///
/// Keys are forwarded as `segment + "." + key`; the parent does the actual
/// adapter access and change routing. Disposal is local: it cancels this
/// scope's own subscriptions and leaves the parent untouched.
pub struct ScopedStore {
    core: Arc<ScopeCore>,
}

struct ScopeCore {
    /// Storage this scope lives in (shared)
    parent: Arc<dyn Storage>,

    /// Segment appended to the parent's prefix
    prefix: String,

    /// Subscriptions taken through this scope, cancelled on dispose
    registrations: Mutex<Vec<RegistrationHandle>>,

    disposed: AtomicBool,
}

impl ScopedStore {
    /// Scope `prefix` inside `parent`
    pub fn new(parent: Arc<dyn Storage>, prefix: &str) -> Self {
        Self {
            core: Arc::new(ScopeCore {
                parent,
                prefix: prefix.to_string(),
                registrations: Mutex::new(Vec::new()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Nested namespace under `prefix`, delegating through this scope
    pub fn scope(&self, prefix: &str) -> ScopedStore {
        ScopedStore::new(Arc::new(self.share()), prefix)
    }

    pub fn parent(&self) -> &Arc<dyn Storage> {
        &self.core.parent
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn share(&self) -> ScopedStore {
        ScopedStore {
            core: Arc::clone(&self.core),
        }
    }

    /// Key as the parent knows it
    fn parent_key(&self, key: &str) -> String {
        prefix::to_physical(&self.core.prefix, key)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(StoreError::Disposed);
        }
        Ok(())
    }
}

impl Clone for ScopedStore {
    fn clone(&self) -> Self {
        ScopedStore::new(Arc::clone(&self.core.parent), &self.core.prefix)
    }
}

impl Storage for ScopedStore {
    fn prefix(&self) -> &str {
        &self.core.prefix
    }

    fn effective_prefix(&self) -> String {
        prefix::join(&self.core.parent.effective_prefix(), &self.core.prefix)
    }

    fn is_disposed(&self) -> bool {
        self.core.disposed.load(Ordering::Acquire)
    }

    fn dispose(&self) {
        if self.core.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let registrations = std::mem::take(&mut *self.core.registrations.lock());
        for registration in &registrations {
            registration.cancel();
        }

        tracing::debug!(
            "Disposed scope '{}' ({} subscriptions cancelled)",
            self.core.prefix,
            registrations.len()
        );
    }

    fn has_item(&self, key: &str) -> Result<bool> {
        self.ensure_active()?;
        self.core.parent.has_item(&self.parent_key(key))
    }

    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        self.ensure_active()?;
        self.core.parent.get_raw(&self.parent_key(key))
    }

    fn set_raw(&self, key: &str, raw: &str) -> Result<()> {
        self.ensure_active()?;
        self.core.parent.set_raw(&self.parent_key(key), raw)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.ensure_active()?;
        self.core.parent.remove_item(&self.parent_key(key))
    }

    fn keys_where(&self, filter: Option<KeyPredicate<'_>>) -> Result<Vec<String>> {
        self.ensure_active()?;

        let scope = self.core.prefix.as_str();
        let in_scope = |key: &str| match prefix::from_physical(scope, key) {
            Some(key) => filter.map_or(true, |f| f(key)),
            None => false,
        };

        let keys = self
            .core
            .parent
            .keys_where(Some(&in_scope as KeyPredicate<'_>))?
            .iter()
            .filter_map(|key| prefix::from_physical(scope, key))
            .map(str::to_string)
            .collect();

        Ok(keys)
    }

    fn clear_where(&self, filter: Option<KeyPredicate<'_>>) -> Result<()> {
        self.ensure_active()?;

        let scope = self.core.prefix.as_str();
        let in_scope = |key: &str| match prefix::from_physical(scope, key) {
            Some(key) => filter.map_or(true, |f| f(key)),
            None => false,
        };

        self.core.parent.clear_where(Some(&in_scope as KeyPredicate<'_>))
    }

    fn register(&self, interest: Interest, sink: Sink) -> Result<Registration> {
        self.ensure_active()?;

        let registration = self
            .core
            .parent
            .register(interest.nested_in(&self.core.prefix), sink)?;

        let mut registrations = self.core.registrations.lock();
        registrations.retain(RegistrationHandle::is_active);
        registrations.push(registration.handle());

        Ok(registration)
    }
}

impl std::fmt::Debug for ScopedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedStore")
            .field("prefix", &self.core.prefix)
            .field("effective_prefix", &self.effective_prefix())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
