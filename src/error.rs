//! Error types for StreamVault
//!
//! Provides a unified error type for all storage operations.
//!
//! "Not found" is deliberately NOT an error: lookups return `Ok(None)` so
//! callers can always tell a missing entry apart from a store fault.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for StreamVault operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("Encoding error: {0}")]
    Encoding(String),

    // -------------------------------------------------------------------------
    // Key/Value Engine Errors
    // -------------------------------------------------------------------------
    #[error("Store init failed: {0}")]
    StoreInit(String),

    #[error("Store IO failure: {0}")]
    StoreIo(String),

    #[error("Store capacity exceeded: {0}")]
    StoreCapacity(String),

    #[error("Store busy: {0}")]
    StoreBusy(String),

    #[error("Cursor used after its transaction was closed")]
    UseAfterClose,

    // -------------------------------------------------------------------------
    // Stream Store Errors
    // -------------------------------------------------------------------------
    #[error("Stream {0} is locked")]
    StreamLocked(u64),

    #[error("Stream creation failed: {0}")]
    Create(String),

    // -------------------------------------------------------------------------
    // Ingest Errors
    // -------------------------------------------------------------------------
    #[error("Validation failed: {0}")]
    Validation(String),
}
