//! Adapter Module
//!
//! The flat key-value primitive underneath every Store.
//!
//! ## Responsibilities
//! - get/set/remove of raw string values by physical key
//! - Enumerate physical keys (order not guaranteed)
//! - Optionally expose a native change feed
//!
//! ## Layering
//! ```text
//! ┌──────────────────────────────┐
//! │        ObservedAdapter       │  diff old/new, publish to feed
//! │  ┌────────────────────────┐  │
//! │  │ MemoryAdapter /        │  │  raw storage, no notifications
//! │  │ FileAdapter / custom   │  │
//! │  └────────────────────────┘  │
//! └──────────────┬───────────────┘
//!                │ RawChange
//!                ▼
//!           ChangeFeed ──► ChangeBus (one listener per Store)
//! ```

mod feed;
mod file;
mod memory;
mod observed;

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::error::Result;

pub use feed::{AreaId, ChangeFeed, FeedListener, ListenerId, RawChange};
pub use file::FileAdapter;
pub use memory::MemoryAdapter;
pub use observed::ObservedAdapter;

/// A shared, type-erased adapter
pub type SharedAdapter = Arc<dyn KvAdapter>;

/// Contract the core requires from a storage primitive
///
/// Implementations must be safe to share between Stores; several Stores with
/// different prefixes routinely sit on top of one adapter.
pub trait KvAdapter: Send + Sync {
    /// Raw value stored under a physical key
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a raw value under a physical key
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a physical key (no-op if absent)
    fn remove(&self, key: &str) -> Result<()>;

    /// Enumerate all physical keys
    fn keys(&self) -> Result<Vec<String>>;

    /// Remove every key, one at a time
    fn clear(&self) -> Result<()> {
        for key in self.keys()? {
            self.remove(&key)?;
        }
        Ok(())
    }

    /// Number of physical keys
    fn len(&self) -> Result<usize> {
        Ok(self.keys()?.len())
    }

    /// Native change feed, if the adapter reports its own mutations
    fn feed(&self) -> Option<&ChangeFeed> {
        None
    }
}

impl<A: KvAdapter + ?Sized> KvAdapter for Arc<A> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        (**self).keys()
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }

    fn len(&self) -> Result<usize> {
        (**self).len()
    }

    fn feed(&self) -> Option<&ChangeFeed> {
        (**self).feed()
    }
}

static SHARED_MEMORY: Lazy<SharedAdapter> =
    Lazy::new(|| Arc::new(ObservedAdapter::new(MemoryAdapter::new())));

/// The process-wide default adapter
///
/// Every call returns the same observed in-memory adapter. Stores opened
/// without an explicit adapter all share it, so two such Stores with the
/// same prefix see each other's data and change events.
pub fn shared_memory() -> SharedAdapter {
    Arc::clone(&SHARED_MEMORY)
}
