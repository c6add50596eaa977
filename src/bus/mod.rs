//! Change Bus Module
//!
//! Turns raw adapter mutations into typed change events.
//!
//! ## Responsibilities
//! - Classify (old, new) raw pairs into set / removal events
//! - Keep each Store's events inside its prefix
//! - Route events to subscribers by key filter, event kind and scope
//! - Deliver per event, in batches, or to callbacks
//!
//! ## Classification
//! ```text
//! old      new      →  event
//! ─────    ─────       ─────────────────────
//! any      Some        set     (removed = false)
//! Some     None        removal (removed = true)
//! None     None        none
//! ```

#[allow(clippy::module_inception)]
mod bus;
mod subscription;

use std::collections::BTreeSet;
use std::sync::Arc;

use crossbeam::channel::Sender;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::prefix;

pub use bus::ChangeBus;
pub use subscription::{
    BulkSubscription, HandlerSubscription, Registration, RegistrationHandle, Subscription,
    SubscriptionId,
};

/// A structured change to one logical key
///
/// A stored JSON `null` is reported as `None`, the same as absence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent<T = Value> {
    pub key: String,
    pub old_item: Option<T>,
    pub new_item: Option<T>,
    pub removed: bool,
}

impl ChangeEvent<Value> {
    /// Convert the JSON payloads into `T`
    pub fn decode<T: DeserializeOwned>(&self) -> Result<ChangeEvent<T>> {
        let decode = |value: &Option<Value>| -> Result<Option<T>> {
            value
                .as_ref()
                .map(|v| {
                    serde_json::from_value(v.clone()).map_err(|source| StoreError::Decode {
                        key: self.key.clone(),
                        source,
                    })
                })
                .transpose()
        };

        Ok(ChangeEvent {
            key: self.key.clone(),
            old_item: decode(&self.old_item)?,
            new_item: decode(&self.new_item)?,
            removed: self.removed,
        })
    }
}

impl<T> ChangeEvent<T> {
    /// Same event under a different key
    pub fn with_key(self, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..self
        }
    }
}

/// Decode a raw stored string, mapping JSON `null` to `None`
pub fn decode_raw(key: &str, raw: Option<&str>) -> Result<Option<Value>> {
    let Some(raw) = raw else {
        return Ok(None);
    };

    let value: Value = serde_json::from_str(raw).map_err(|source| StoreError::Decode {
        key: key.to_string(),
        source,
    })?;

    Ok(match value {
        Value::Null => None,
        value => Some(value),
    })
}

/// Classify a raw (old, new) pair into a change event
///
/// Returns `Ok(None)` when both sides are absent. Only an undecodable new
/// value is an error; an undecodable old value is reported as `None`.
pub fn classify(key: &str, old_raw: Option<&str>, new_raw: Option<&str>) -> Result<Option<ChangeEvent>> {
    if old_raw.is_none() && new_raw.is_none() {
        return Ok(None);
    }

    let new_item = decode_raw(key, new_raw)?;
    let old_item = decode_raw(key, old_raw).unwrap_or_else(|e| {
        tracing::warn!("Previous value of '{}' is not valid JSON, reporting it as absent: {}", key, e);
        None
    });

    Ok(Some(ChangeEvent {
        key: key.to_string(),
        old_item,
        new_item,
        removed: new_raw.is_none(),
    }))
}

// =============================================================================
// Routing
// =============================================================================

/// Which keys a subscriber wants
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum KeyFilter {
    #[default]
    AllKeys,
    OneKey(String),
    KeySet(BTreeSet<String>),
}

impl KeyFilter {
    /// Filter for a finite set of keys
    pub fn keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        KeyFilter::KeySet(keys.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyFilter::AllKeys => true,
            KeyFilter::OneKey(k) => k == key,
            KeyFilter::KeySet(keys) => keys.contains(key),
        }
    }
}

impl From<&str> for KeyFilter {
    fn from(key: &str) -> Self {
        KeyFilter::OneKey(key.to_string())
    }
}

impl From<String> for KeyFilter {
    fn from(key: String) -> Self {
        KeyFilter::OneKey(key)
    }
}

impl From<Vec<String>> for KeyFilter {
    fn from(keys: Vec<String>) -> Self {
        KeyFilter::KeySet(keys.into_iter().collect())
    }
}

impl From<&[&str]> for KeyFilter {
    fn from(keys: &[&str]) -> Self {
        KeyFilter::keys(keys.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for KeyFilter {
    fn from(keys: [&str; N]) -> Self {
        KeyFilter::keys(keys)
    }
}

impl From<Option<&str>> for KeyFilter {
    fn from(key: Option<&str>) -> Self {
        key.map(KeyFilter::from).unwrap_or_default()
    }
}

/// Which kinds of change a subscriber wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventKind {
    #[default]
    Any,
    /// Sets only (`removed == false`)
    Changed,
    /// Removals only (`removed == true`)
    Removed,
}

impl EventKind {
    pub fn admits(&self, removed: bool) -> bool {
        match self {
            EventKind::Any => true,
            EventKind::Changed => !removed,
            EventKind::Removed => removed,
        }
    }
}

/// A subscriber's full routing criteria
///
/// `within` is a scope prefix relative to the Store's logical keys (empty for
/// the Store itself). Keys in `keys` and in delivered events are relative to
/// `within`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Interest {
    pub within: String,
    pub keys: KeyFilter,
    pub kind: EventKind,
}

impl Interest {
    pub fn new(keys: KeyFilter, kind: EventKind) -> Self {
        Self {
            within: String::new(),
            keys,
            kind,
        }
    }

    /// The same interest as seen from a parent that holds this scope under `scope`
    pub fn nested_in(self, scope: &str) -> Self {
        Self {
            within: prefix::join(scope, &self.within),
            ..self
        }
    }

    /// The event as this subscriber should see it, or `None` if not wanted
    pub fn admit(&self, event: &ChangeEvent) -> Option<ChangeEvent> {
        if !self.kind.admits(event.removed) {
            return None;
        }

        let key = prefix::from_physical(&self.within, &event.key)?;
        if !self.keys.matches(key) {
            return None;
        }

        Some(event.clone().with_key(key))
    }
}

/// Callback invoked for each delivered event
pub type ChangeHandler = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Where a subscriber's events go
#[derive(Clone)]
pub enum Sink {
    Channel(Sender<ChangeEvent>),
    Handler(ChangeHandler),
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sink::Channel(_) => f.write_str("Sink::Channel"),
            Sink::Handler(_) => f.write_str("Sink::Handler"),
        }
    }
}
