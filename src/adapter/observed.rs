//! Observing decorator
//!
//! Wraps an adapter and reports every effective mutation on a [`ChangeFeed`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::Result;

use super::{ChangeFeed, KvAdapter, RawChange};

/// Adapter wrapper that publishes a [`RawChange`](super::RawChange) per
/// effective mutation
///
/// ## Notification rules
/// - `set`: published only when the stored raw value actually changed
/// - `remove`: published only when a value existed
/// - `clear`: enumerate + remove, so each key gets its own notification
///
/// Writes through one wrapper are serialized by `write_lock` so the old/new
/// pair of a change is never interleaved with another writer's.
///
/// ## Publication order
/// ```text
/// writer ──write_lock──► mutate + enqueue ──unlock──► flush()
///                              │                        │
///                              ▼                        ▼
///                           pending (FIFO) ──► one drainer at a time ──► feed
/// ```
/// Changes are queued under `write_lock`, so the queue order is the mutation
/// order. Only one thread drains at a time; a writer that finds a drain in
/// progress (another thread, or a listener writing back) leaves its change
/// to that drainer.
pub struct ObservedAdapter<A> {
    inner: A,
    feed: ChangeFeed,
    write_lock: Mutex<()>,

    /// Changes awaiting publication, in mutation order
    pending: Mutex<VecDeque<RawChange>>,

    /// Set while some thread is publishing `pending`
    draining: AtomicBool,
}

impl<A: KvAdapter> ObservedAdapter<A> {
    /// Wrap an adapter with a fresh feed
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            feed: ChangeFeed::new(),
            write_lock: Mutex::new(()),
            pending: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        }
    }

    /// The wrapped adapter
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Unwrap, dropping the feed and its listeners
    pub fn into_inner(self) -> A {
        self.inner
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Queue a change; caller holds `write_lock`
    fn enqueue(&self, key: &str, old_value: Option<String>, new_value: Option<String>) {
        self.pending.lock().push_back(RawChange {
            area: self.feed.area(),
            key: Some(key.to_string()),
            old_value,
            new_value,
        });
    }

    /// Publish queued changes unless another drain is already running
    fn flush(&self) {
        loop {
            if self
                .draining
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }

            loop {
                let next = self.pending.lock().pop_front();
                match next {
                    Some(change) => self.feed.publish(change),
                    None => break,
                }
            }

            self.draining.store(false, Ordering::Release);

            // A change queued after the last pop but before the flag was
            // cleared would otherwise be stranded
            if self.pending.lock().is_empty() {
                return;
            }
        }
    }
}

impl<A: KvAdapter> KvAdapter for ObservedAdapter<A> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        {
            let _write_guard = self.write_lock.lock();

            let old_value = self.inner.get(key)?;
            self.inner.set(key, value)?;
            let new_value = self.inner.get(key)?;

            if old_value == new_value {
                return Ok(());
            }
            self.enqueue(key, old_value, new_value);
        }

        self.flush();
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        {
            let _write_guard = self.write_lock.lock();

            let old_value = self.inner.get(key)?;
            if old_value.is_none() {
                return Ok(());
            }
            self.inner.remove(key)?;
            self.enqueue(key, old_value, None);
        }

        self.flush();
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys()
    }

    fn clear(&self) -> Result<()> {
        for key in self.inner.keys()? {
            self.remove(&key)?;
        }
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        self.inner.len()
    }

    fn feed(&self) -> Option<&ChangeFeed> {
        Some(&self.feed)
    }
}
