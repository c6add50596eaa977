//! Configuration for kvscope
//!
//! Centralized configuration with sensible defaults.

use crate::adapter::SharedAdapter;

/// Configuration for opening a [`Store`](crate::Store)
#[derive(Clone, Default)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Namespace Configuration
    // -------------------------------------------------------------------------
    /// Prefix of the store's namespace ("" owns the whole adapter)
    pub prefix: String,

    // -------------------------------------------------------------------------
    // Adapter Configuration
    // -------------------------------------------------------------------------
    /// Backing adapter
    ///
    /// `None` selects the process-wide [`shared_memory`](crate::shared_memory)
    /// adapter, so every store opened that way shares data with the others.
    pub adapter: Option<SharedAdapter>,
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("prefix", &self.prefix)
            .field("adapter", &self.adapter.as_ref().map(|_| "<adapter>"))
            .finish()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the namespace prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = prefix.into();
        self
    }

    /// Set the backing adapter
    pub fn adapter(mut self, adapter: SharedAdapter) -> Self {
        self.config.adapter = Some(adapter);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
