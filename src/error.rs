//! Error types for kvscope
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for kvscope operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // Adapter Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Adapter error: {0}")]
    Adapter(String),

    #[error("Quota exceeded writing '{key}' (limit {limit} bytes)")]
    QuotaExceeded { key: String, limit: usize },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Failed to decode value of '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode value of '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Store has been disposed")]
    Disposed,
}

impl StoreError {
    /// True for failures raised by the underlying storage primitive
    pub fn is_adapter_error(&self) -> bool {
        matches!(
            self,
            StoreError::Io(_) | StoreError::Adapter(_) | StoreError::QuotaExceeded { .. }
        )
    }
}
