//! Native change feed
//!
//! One listener hub per adapter instance. The feed's [`AreaId`] is the
//! adapter identity carried on every [`RawChange`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Identity of one storage area (one adapter instance)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AreaId(u64);

impl AreaId {
    fn next() -> Self {
        static NEXT_AREA: AtomicU64 = AtomicU64::new(1);
        AreaId(NEXT_AREA.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value (for logging)
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// A raw mutation as observed at the adapter level
///
/// `key == None` signals a bulk change (e.g. a foreign clear) whose
/// per-key effects are unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    pub area: AreaId,
    pub key: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// Identifier returned by [`ChangeFeed::listen`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Callback attached to a feed
pub type FeedListener = Arc<dyn Fn(&RawChange) + Send + Sync>;

/// Listener hub for one storage area
pub struct ChangeFeed {
    area: AreaId,
    listeners: RwLock<Vec<(ListenerId, FeedListener)>>,
    next_id: AtomicU64,
}

impl ChangeFeed {
    /// Create a feed with a fresh area identity
    pub fn new() -> Self {
        Self {
            area: AreaId::next(),
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Identity of the area this feed reports on
    pub fn area(&self) -> AreaId {
        self.area
    }

    /// Attach a listener
    pub fn listen(&self, listener: FeedListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    /// Detach a listener, returning whether it was attached
    pub fn unlisten(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Number of attached listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver a change to every listener
    ///
    /// Listeners run outside the feed lock, so they may attach or detach
    /// listeners themselves. A panicking listener is logged and skipped.
    pub fn publish(&self, change: RawChange) {
        let listeners: Vec<FeedListener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&change))).is_err() {
                tracing::error!(
                    "Feed listener panicked on change to {:?} (area {})",
                    change.key,
                    self.area.as_u64()
                );
            }
        }
    }

    /// Publish a keyed change originating in this area
    pub fn emit(&self, key: &str, old_value: Option<String>, new_value: Option<String>) {
        self.publish(RawChange {
            area: self.area,
            key: Some(key.to_string()),
            old_value,
            new_value,
        });
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("area", &self.area)
            .field("listeners", &self.listener_count())
            .finish()
    }
}
