//! # foliodb
//!
//! An embedded, file-backed key/value object store for single-device
//! applications:
//! - One file per value, addressed by a string key
//! - Atomic writes with backup-based crash recovery
//! - Per-key FIFO locking plus a store-wide barrier
//! - Pluggable value codec (bincode by default)
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Registry                              │
//! │        one Book (→ one Store) per (location, name)           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                         Store                                │
//! │        atomic write / self-healing read / enumerate          │
//! └──────────┬─────────────────────────────────┬────────────────┘
//!            │                                 │
//!            ▼                                 ▼
//!     ┌─────────────┐                   ┌─────────────┐
//!     │   KeyLock   │                   │    Codec    │
//!     │ (per key +  │                   │  (bincode)  │
//!     │   barrier)  │                   └──────┬──────┘
//!     └─────────────┘                          │
//!                                              ▼
//!                                    ┌──────────────────┐
//!                                    │   <key>.pt file  │
//!                                    │ (+ .bak during a │
//!                                    │  write window)   │
//!                                    └──────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use foliodb::Registry;
//!
//! # fn main() -> foliodb::Result<()> {
//! let registry = Registry::with_root("/var/lib/myapp");
//! let book = registry.book("settings")?;
//!
//! book.write("city", &"Lund".to_string())?;
//! let city: Option<String> = book.read("city")?;
//! assert_eq!(city.as_deref(), Some("Lund"));
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;

pub mod codec;
pub mod keylock;
pub mod paths;
pub mod registry;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use codec::{BincodeCodec, Codec};
pub use error::{FolioError, Result};
pub use keylock::KeyLock;
pub use registry::{Book, Registry, DEFAULT_BOOK_NAME};
pub use store::Store;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of foliodb
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
