//! Subscription handles
//!
//! Every handle owns a [`Registration`]; dropping the handle unsubscribes.

use std::sync::Weak;
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError};

use super::bus::BusShared;
use super::ChangeEvent;

/// Identifier of one subscriber on a bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl SubscriptionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// A subscriber's slot on a bus, released on drop
pub struct Registration {
    handle: RegistrationHandle,
}

impl Registration {
    pub(crate) fn new(id: SubscriptionId, bus: Weak<BusShared>) -> Self {
        Self {
            handle: RegistrationHandle { id, bus },
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.handle.id
    }

    /// Whether the bus still holds this subscriber
    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }

    /// A non-owning handle that can cancel this registration
    pub fn handle(&self) -> RegistrationHandle {
        self.handle.clone()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration").field("id", &self.handle.id).finish()
    }
}

/// Non-owning reference to a registration
#[derive(Clone)]
pub struct RegistrationHandle {
    id: SubscriptionId,
    bus: Weak<BusShared>,
}

impl RegistrationHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.bus
            .upgrade()
            .map(|bus| bus.is_registered(self.id))
            .unwrap_or(false)
    }

    /// Remove the subscriber from its bus, returning whether it was present
    pub fn cancel(&self) -> bool {
        self.bus
            .upgrade()
            .map(|bus| bus.remove(self.id))
            .unwrap_or(false)
    }
}

// =============================================================================
// Per-event subscription
// =============================================================================

/// Stream of individual change events
///
/// Once the registration is cancelled (unsubscribe, scope or store disposal)
/// every receive path reports nothing, including events that were already
/// queued.
pub struct Subscription {
    registration: Registration,
    rx: Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn new(registration: Registration, rx: Receiver<ChangeEvent>) -> Self {
        Self { registration, rx }
    }

    pub fn id(&self) -> SubscriptionId {
        self.registration.id()
    }

    pub fn is_active(&self) -> bool {
        self.registration.is_active()
    }

    /// Block until the next event; `None` once cancelled or the bus is closed
    pub fn recv(&self) -> Option<ChangeEvent> {
        let event = self.rx.recv().ok()?;
        self.is_active().then_some(event)
    }

    /// Next pending event, if any
    pub fn try_recv(&self) -> Option<ChangeEvent> {
        if !self.is_active() {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ChangeEvent> {
        let event = self.rx.recv_timeout(timeout).ok()?;
        self.is_active().then_some(event)
    }

    /// All pending events, in order
    pub fn drain(&self) -> Vec<ChangeEvent> {
        self.try_iter().collect()
    }

    /// Non-blocking iterator over pending events
    pub fn try_iter(&self) -> impl Iterator<Item = ChangeEvent> + '_ {
        let active = self.is_active();
        self.rx.try_iter().take_while(move |_| active)
    }

    /// Stop receiving; pending events are discarded
    pub fn unsubscribe(self) {}
}

// =============================================================================
// Bulk subscription
// =============================================================================

/// Stream of event batches
///
/// A batch holds every event enqueued since the previous batch was taken, in
/// mutation order. Synchronous bursts of writes made before the consumer reads
/// therefore arrive as one batch. Nothing is delivered after cancellation.
pub struct BulkSubscription {
    registration: Registration,
    rx: Receiver<ChangeEvent>,
}

impl BulkSubscription {
    pub fn new(registration: Registration, rx: Receiver<ChangeEvent>) -> Self {
        Self { registration, rx }
    }

    pub fn id(&self) -> SubscriptionId {
        self.registration.id()
    }

    pub fn is_active(&self) -> bool {
        self.registration.is_active()
    }

    /// The pending batch, or `None` if nothing happened since the last one
    pub fn try_recv_batch(&self) -> Option<Vec<ChangeEvent>> {
        if !self.is_active() {
            return None;
        }

        let batch: Vec<ChangeEvent> = self.rx.try_iter().collect();
        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }

    /// Block until at least one event is pending, then take the batch
    ///
    /// Returns `None` once the bus is closed and nothing is pending.
    pub fn recv_batch(&self) -> Option<Vec<ChangeEvent>> {
        let first = self.rx.recv().ok()?;
        self.collect_batch(first)
    }

    /// Like [`recv_batch`](Self::recv_batch) with a deadline
    pub fn recv_batch_timeout(&self, timeout: Duration) -> Option<Vec<ChangeEvent>> {
        match self.rx.recv_timeout(timeout) {
            Ok(first) => self.collect_batch(first),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Stop receiving; pending events are discarded
    pub fn unsubscribe(self) {}

    fn collect_batch(&self, first: ChangeEvent) -> Option<Vec<ChangeEvent>> {
        if !self.is_active() {
            return None;
        }

        let mut batch = vec![first];
        batch.extend(self.rx.try_iter());
        Some(batch)
    }
}

// =============================================================================
// Callback subscription
// =============================================================================

/// Keeps a callback subscribed until dropped
pub struct HandlerSubscription {
    registration: Registration,
}

impl HandlerSubscription {
    pub fn new(registration: Registration) -> Self {
        Self { registration }
    }

    pub fn id(&self) -> SubscriptionId {
        self.registration.id()
    }

    pub fn is_active(&self) -> bool {
        self.registration.is_active()
    }

    /// Stop invoking the callback
    pub fn unsubscribe(self) {}
}
