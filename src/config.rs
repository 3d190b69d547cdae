//! Configuration for StreamVault
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::kv::EnvOptions;
use crate::stream::Volume;

/// Main configuration for a StreamVault instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Stream Store Configuration
    // -------------------------------------------------------------------------
    /// Storage volumes: directory roots that hold stream files.
    /// Internal structure per volume:
    ///   {volume}/
    ///     └── {feed}/{yyyy}/{mm}/{dd}/
    ///           ├── {id}.dat   (stream content)
    ///           └── {id}.meta  (stream manifest)
    pub volumes: Vec<Volume>,

    /// How a volume is chosen for each new stream
    pub strategy: SelectionStrategy,

    // -------------------------------------------------------------------------
    // Reference Data Configuration
    // -------------------------------------------------------------------------
    /// Path of the memory-mapped reference data region
    pub ref_store_path: PathBuf,

    /// Fixed size of the mapped region (in bytes)
    pub ref_store_max_size: u64,

    /// Maximum number of named stores in the region
    pub max_named_stores: usize,

    /// How long a write transaction waits for the writer lock (milliseconds)
    pub writer_lock_timeout_ms: u64,
}

/// Volume selection strategy for new streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Rotate through volumes in order
    RoundRobin,

    /// Pick the volume with the fewest used bytes
    LeastFull,

    /// Always use the volume at the given index
    Fixed(usize),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            volumes: vec![Volume::new("./streamvault_data/volume1")],
            strategy: SelectionStrategy::RoundRobin,
            ref_store_path: PathBuf::from("./streamvault_data/refdata.svd"),
            ref_store_max_size: 64 * 1024 * 1024, // 64 MB
            max_named_stores: 64,
            writer_lock_timeout_ms: 30_000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Engine options derived from this config
    pub fn env_options(&self) -> EnvOptions {
        EnvOptions {
            max_size: self.ref_store_max_size,
            max_named_stores: self.max_named_stores,
            lock_timeout: Duration::from_millis(self.writer_lock_timeout_ms),
        }
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
    volumes: Vec<Volume>,
}

impl ConfigBuilder {
    /// Add a storage volume with unlimited capacity
    pub fn volume(mut self, root: impl Into<PathBuf>) -> Self {
        self.volumes.push(Volume::new(root));
        self
    }

    /// Add a storage volume with a byte capacity
    pub fn volume_with_capacity(mut self, root: impl Into<PathBuf>, capacity_bytes: u64) -> Self {
        self.volumes.push(Volume::with_capacity(root, capacity_bytes));
        self
    }

    /// Set the volume selection strategy
    pub fn strategy(mut self, strategy: SelectionStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Set the reference data region path
    pub fn ref_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ref_store_path = path.into();
        self
    }

    /// Set the reference data region size (in bytes)
    pub fn ref_store_max_size(mut self, size: u64) -> Self {
        self.config.ref_store_max_size = size;
        self
    }

    /// Set the maximum number of named stores
    pub fn max_named_stores(mut self, count: usize) -> Self {
        self.config.max_named_stores = count;
        self
    }

    /// Set the writer lock timeout (in milliseconds)
    pub fn writer_lock_timeout_ms(mut self, ms: u64) -> Self {
        self.config.writer_lock_timeout_ms = ms;
        self
    }

    pub fn build(mut self) -> Config {
        if !self.volumes.is_empty() {
            self.config.volumes = self.volumes;
        }
        self.config
    }
}
