//! In-memory adapter
//!
//! HashMap-based storage with RwLock for concurrency.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{Result, StoreError};

use super::KvAdapter;

/// In-memory key-value storage
///
/// ## Size accounting
/// `size` tracks `key.len() + value.len()` over all entries so an optional
/// quota can reject writes the way browser storage does.
pub struct MemoryAdapter {
    /// Physical key → raw value, with the running byte size
    state: RwLock<MemoryState>,

    /// Maximum total size in bytes (None = unbounded)
    quota: Option<usize>,
}

#[derive(Default)]
struct MemoryState {
    data: HashMap<String, String>,
    size: usize,
}

impl MemoryAdapter {
    /// Create an empty, unbounded adapter
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            quota: None,
        }
    }

    /// Create an empty adapter that rejects writes beyond `bytes`
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            quota: Some(bytes),
        }
    }

    /// Approximate size in bytes
    pub fn size(&self) -> usize {
        self.state.read().size
    }

    /// Configured quota, if any
    pub fn quota(&self) -> Option<usize> {
        self.quota
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl KvAdapter for MemoryAdapter {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.state.read().data.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.write();

        let old_size = state
            .data
            .get(key)
            .map(|old| key.len() + old.len())
            .unwrap_or(0);
        let new_size = state.size - old_size + key.len() + value.len();

        if let Some(limit) = self.quota {
            if new_size > limit {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    limit,
                });
            }
        }

        state.data.insert(key.to_string(), value.to_string());
        state.size = new_size;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut state = self.state.write();
        if let Some(old) = state.data.remove(key) {
            state.size -= key.len() + old.len();
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.state.read().data.keys().cloned().collect())
    }

    fn clear(&self) -> Result<()> {
        let mut state = self.state.write();
        state.data.clear();
        state.size = 0;
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.state.read().data.len())
    }
}
