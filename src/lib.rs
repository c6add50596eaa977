//! # kvscope
//!
//! A reactive façade over a flat key-value store with:
//! - Prefixed namespaces that never leak into each other
//! - Scoped sub-stores nested to any depth
//! - JSON (de)serialization of stored values
//! - Change-notification streams (per event, batched, or callbacks)
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │            ScopedStore ──► ScopedStore ──► Store             │
//! │                (prefix segments joined with ".")             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ logical keys
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    Prefix Codec                              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ physical keys
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐   RawChange ┌─────────────┐
//!   │   Adapter   │────────────►│ Change Bus  │──► Subscriptions
//!   │ (+ feed)    │             │ (per Store) │
//!   └─────────────┘             └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use kvscope::{MemoryAdapter, Store, StorageExt};
//! use std::sync::Arc;
//!
//! let store = Store::new(Arc::new(MemoryAdapter::new()), "settings");
//! let changes = store.watch("theme").unwrap();
//!
//! store.set_item("theme", "dark").unwrap();
//! assert_eq!(store.get_item::<String>("theme").unwrap().as_deref(), Some("dark"));
//! assert!(!changes.try_recv().unwrap().removed);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod prefix;
pub mod adapter;
pub mod bus;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::Config;

pub use adapter::{shared_memory, FileAdapter, KvAdapter, MemoryAdapter, ObservedAdapter, SharedAdapter};
pub use bus::{BulkSubscription, ChangeEvent, EventKind, HandlerSubscription, KeyFilter, Subscription};
pub use store::{Entry, EntrySnapshot, EntryStream, ScopedStore, Storage, StorageExt, Store};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of kvscope
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
