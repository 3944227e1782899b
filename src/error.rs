//! Error types for foliodb
//!
//! Provides a unified error type for all operations.
//!
//! "Key not found" is deliberately absent: reads surface absence as
//! `Ok(None)` rather than an error, so callers can supply defaults without
//! matching on error kinds.

use thiserror::Error;

/// Result type alias using FolioError
pub type Result<T> = std::result::Result<T, FolioError>;

/// Unified error type for foliodb operations
#[derive(Debug, Error)]
pub enum FolioError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Key Errors
    // -------------------------------------------------------------------------
    /// The key is empty or contains a path-separator character.
    /// Rejected before any lock is taken or any I/O is attempted.
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    /// Directory creation, rename, delete or sync failure. Fatal to the
    /// current operation, never swallowed.
    #[error("storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("encode error: {0}")]
    Encode(String),

    /// Raised only after the single permitted compatibility-mode decode
    /// attempt has also failed. The unreadable file is left on disk.
    #[error("decode error: {0}")]
    Decode(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    /// A lock `release` without a matching `acquire`. This is a bug in the
    /// calling code, not a runtime condition to recover from.
    #[error("lock protocol violation: {0}")]
    ProtocolViolation(String),

    // -------------------------------------------------------------------------
    // Registry Errors
    // -------------------------------------------------------------------------
    #[error("registry error: {0}")]
    Registry(String),

    /// A default-location operation was invoked on a registry constructed
    /// without a root directory. The caller must fix the call order.
    #[error("registry has no root directory: construct it with Registry::with_root or use book_at")]
    Uninitialized,
}
