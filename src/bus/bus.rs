//! Change Bus
//!
//! Attaches to an adapter's feed and fans events out to subscribers.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::adapter::{AreaId, ListenerId, RawChange, SharedAdapter};
use crate::error::{Result, StoreError};
use crate::prefix;

use super::subscription::{Registration, SubscriptionId};
use super::{classify, ChangeEvent, Interest, Sink};

/// Per-Store change router
///
/// ## Lifecycle
/// ```text
/// Detached ──first register()──► Attached ──close()──► Closed
/// ```
/// - Attaching registers ONE listener on the adapter's feed, however many
///   subscribers the bus later has.
/// - Closing detaches from the feed and drops every subscriber; channel
///   receivers then observe disconnection.
///
/// The feed listener only holds a weak reference to the bus state, so a bus
/// that is dropped without `close()` stops receiving immediately.
pub struct ChangeBus {
    /// Routing state shared with the feed listener and registrations
    shared: Arc<BusShared>,

    /// Adapter whose feed we listen on
    adapter: SharedAdapter,

    /// Feed attachment state
    attachment: Mutex<Attachment>,
}

enum Attachment {
    Detached,
    /// `None` when the adapter has no feed
    Attached(Option<ListenerId>),
    Closed,
}

/// State reachable from the feed listener
pub(crate) struct BusShared {
    /// Namespace this bus serves
    prefix: String,

    /// Registered subscribers, in registration order
    subscribers: Mutex<Vec<Subscriber>>,

    /// Next subscription ID
    next_id: AtomicU64,
}

struct Subscriber {
    id: SubscriptionId,
    interest: Interest,
    sink: Sink,
}

impl ChangeBus {
    /// Create a detached bus for `prefix` over `adapter`
    pub fn new(prefix: impl Into<String>, adapter: SharedAdapter) -> Self {
        Self {
            shared: Arc::new(BusShared {
                prefix: prefix.into(),
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
            adapter,
            attachment: Mutex::new(Attachment::Detached),
        }
    }

    /// Add a subscriber, attaching to the feed if this is the first one
    pub fn register(&self, interest: Interest, sink: Sink) -> Result<Registration> {
        {
            let mut attachment = self.attachment.lock();
            match *attachment {
                Attachment::Closed => return Err(StoreError::Disposed),
                Attachment::Attached(_) => {}
                Attachment::Detached => {
                    *attachment = Attachment::Attached(self.attach());
                }
            }
        }

        let id = SubscriptionId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        self.shared.subscribers.lock().push(Subscriber { id, interest, sink });

        Ok(Registration::new(id, Arc::downgrade(&self.shared)))
    }

    /// Remove a subscriber by ID
    pub fn unregister(&self, id: SubscriptionId) -> bool {
        self.shared.remove(id)
    }

    /// Detach from the feed and drop all subscribers (idempotent)
    pub fn close(&self) {
        let previous = std::mem::replace(&mut *self.attachment.lock(), Attachment::Closed);

        if let Attachment::Attached(Some(listener)) = previous {
            if let Some(feed) = self.adapter.feed() {
                feed.unlisten(listener);
                tracing::debug!(
                    "Change bus for prefix '{}' detached from area {}",
                    self.shared.prefix,
                    feed.area().as_u64()
                );
            }
        }

        // Sinks are dropped outside the lock; a handler may own a registration
        let subscribers = std::mem::take(&mut *self.shared.subscribers.lock());
        drop(subscribers);
    }

    /// Deliver a raw change as if it came from the feed
    pub fn dispatch(&self, change: &RawChange) {
        match self.adapter.feed() {
            Some(feed) => self.shared.dispatch(feed.area(), change),
            None => self.shared.dispatch(change.area, change),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.shared.prefix
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.lock().len()
    }

    /// Whether a feed listener is currently attached
    pub fn is_attached(&self) -> bool {
        matches!(*self.attachment.lock(), Attachment::Attached(Some(_)))
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.attachment.lock(), Attachment::Closed)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Attach one listener to the adapter's feed
    fn attach(&self) -> Option<ListenerId> {
        let feed = self.adapter.feed()?;
        let area = feed.area();
        let weak = Arc::downgrade(&self.shared);

        let listener = feed.listen(Arc::new(move |change: &RawChange| {
            if let Some(shared) = weak.upgrade() {
                shared.dispatch(area, change);
            }
        }));

        tracing::debug!(
            "Change bus for prefix '{}' attached to area {}",
            self.shared.prefix,
            area.as_u64()
        );

        Some(listener)
    }
}

impl Drop for ChangeBus {
    fn drop(&mut self) {
        self.close();
    }
}

impl BusShared {
    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let removed = {
            let mut subscribers = self.subscribers.lock();
            subscribers
                .iter()
                .position(|s| s.id == id)
                .map(|index| subscribers.remove(index))
        };
        removed.is_some()
    }

    pub(crate) fn is_registered(&self, id: SubscriptionId) -> bool {
        self.subscribers.lock().iter().any(|s| s.id == id)
    }

    /// Translate one raw change and deliver it
    fn dispatch(&self, area: AreaId, change: &RawChange) {
        if change.area != area {
            tracing::trace!(
                "Ignoring change from area {} (listening on {})",
                change.area.as_u64(),
                area.as_u64()
            );
            return;
        }

        let Some(physical) = change.key.as_deref() else {
            tracing::warn!(
                "Keyless change on area {}: prefix '{}' subscribers must re-enumerate",
                area.as_u64(),
                self.prefix
            );
            return;
        };

        let Some(key) = prefix::from_physical(&self.prefix, physical) else {
            return;
        };

        let event = match classify(key, change.old_value.as_deref(), change.new_value.as_deref()) {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Skipping undecodable change on '{}': {}", physical, e);
                return;
            }
        };

        tracing::trace!("Dispatching change on '{}' (removed={})", physical, event.removed);
        self.deliver(&event);
    }

    /// Fan an event out to every interested subscriber
    ///
    /// Sinks run outside the subscriber lock. A subscriber removed while the
    /// fan-out is in progress receives nothing further.
    fn deliver(&self, event: &ChangeEvent) {
        let targets: Vec<(SubscriptionId, ChangeEvent, Sink)> = self
            .subscribers
            .lock()
            .iter()
            .filter_map(|s| {
                s.interest
                    .admit(event)
                    .map(|admitted| (s.id, admitted, s.sink.clone()))
            })
            .collect();

        let mut disconnected = Vec::new();

        for (id, admitted, sink) in targets {
            if !self.is_registered(id) {
                continue;
            }

            match sink {
                Sink::Channel(tx) => {
                    if tx.send(admitted).is_err() {
                        disconnected.push(id);
                    }
                }
                Sink::Handler(handler) => {
                    if catch_unwind(AssertUnwindSafe(|| handler(&admitted))).is_err() {
                        tracing::error!(
                            "Change handler {} panicked on '{}'; continuing delivery",
                            id.as_u64(),
                            admitted.key
                        );
                    }
                }
            }
        }

        for id in disconnected {
            self.remove(id);
        }
    }
}
