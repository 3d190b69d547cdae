//! # StreamVault
//!
//! An embedded storage core for event-stream processing:
//! - Multi-volume stream store with atomic close-time visibility
//! - Off-heap reference data store for effective-time lookups
//! - Transactional, memory-mapped key/value engine underneath
//! - Ingest handler turning inbound transfers into stored streams
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Ingest Handler                            │
//! │         (validate → header → content → footer)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────────┐
//!   │ StreamStore │          │ ReferenceData   │
//!   │  (Volumes)  │          │     Store       │
//!   └──────┬──────┘          └────────┬────────┘
//!          │                          │
//!          ▼                          ▼
//!   ┌─────────────┐          ┌─────────────────┐
//!   │ Filesystem  │          │    KV Engine    │
//!   │ .dat/.meta  │          │  (mmap region)  │
//!   └─────────────┘          └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod kv;
pub mod refdata;
pub mod stream;
pub mod ingest;
pub mod health;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Config, SelectionStrategy};
pub use error::{Result, StoreError};

pub use ingest::StreamIngester;
pub use kv::KvEnv;
pub use refdata::{RefDataEntry, ReferenceDataStore};
pub use stream::{FindStreamCriteria, MetaMap, StreamMeta, StreamStatus, StreamStore, Volume};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of StreamVault
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
