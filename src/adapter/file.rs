//! File-backed adapter
//!
//! Persists the whole key space as one JSON object.
//!
//! ## File Format
//! ```text
//! {
//!   "settings.theme": "\"dark\"",
//!   "settings.volume": "7"
//! }
//! ```
//! Keys are physical keys, values are the raw (already JSON-encoded) strings.
//! Every mutation rewrites the file through a temporary sibling + rename so
//! a crash leaves either the old or the new contents.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::{Result, StoreError};

use super::KvAdapter;

/// Adapter persisting to a single JSON file
pub struct FileAdapter {
    /// Location of the storage file
    path: PathBuf,

    /// Cached contents, always equal to what is on disk
    data: RwLock<BTreeMap<String, String>>,
}

impl FileAdapter {
    /// Open or create the storage file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let data = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents).map_err(|e| {
                    StoreError::Adapter(format!(
                        "corrupt storage file {}: {}",
                        path.display(),
                        e
                    ))
                })?
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!("Opened file adapter at {} ({} keys)", path.display(), data.len());

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Path of the storage file
    pub fn path(&self) -> &Path {
        &self.path
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Write `data` to disk atomically (temp file + rename)
    fn persist(&self, data: &BTreeMap<String, String>) -> Result<()> {
        let encoded = serde_json::to_string_pretty(data)
            .map_err(|e| StoreError::Adapter(format!("failed to encode storage file: {}", e)))?;

        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, encoded)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// "store.json" → "store.json.tmp"
    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl KvAdapter for FileAdapter {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut data = self.data.write();
        let previous = data.insert(key.to_string(), value.to_string());

        if let Err(e) = self.persist(&data) {
            // Keep the cache equal to the file
            match previous {
                Some(old) => data.insert(key.to_string(), old),
                None => data.remove(key),
            };
            return Err(e);
        }

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut data = self.data.write();
        let Some(previous) = data.remove(key) else {
            return Ok(());
        };

        if let Err(e) = self.persist(&data) {
            data.insert(key.to_string(), previous);
            return Err(e);
        }

        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.data.read().keys().cloned().collect())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.data.read().len())
    }
}
