//! Registry Module
//!
//! Names multiple stores ("books") and maps each logical name to a root
//! directory on disk. The registry is an explicit object with a normal
//! lifecycle — construct it once at startup and pass it by reference.
//!
//! ## The identity contract
//! Repeated requests for the same (location, name) pair always yield the
//! same underlying [`Store`] instance, and therefore the same lock table.
//! Two independent instances over one directory would let threads bypass
//! each other's locks and corrupt files, so this multiplexing is a hard
//! requirement, not a cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::codec::{BincodeCodec, Codec};
use crate::error::{FolioError, Result};
use crate::store::Store;

/// Name of the default book, reserved for [`Registry::default_book`]
pub const DEFAULT_BOOK_NAME: &str = "folio";

/// Hands out one [`Book`] per (location, name) pair
///
/// ## Concurrency:
/// - The handle map is behind a mutex; lookups are short and only taken
///   when a book handle is requested, never per store operation
pub struct Registry<C: Codec + Clone = BincodeCodec> {
    /// Base directory under which named books live; `None` until configured
    root: Option<PathBuf>,

    /// Codec prototype cloned into each new store
    codec: C,

    /// One store per (location, name); never dropped while the registry lives
    books: Mutex<HashMap<(PathBuf, String), Arc<Store<C>>>>,
}

impl Registry<BincodeCodec> {
    /// Create a registry with no default location.
    ///
    /// Only [`book_at`](Self::book_at) works on such a registry; the
    /// name-only accessors return [`FolioError::Uninitialized`].
    pub fn new() -> Self {
        Self::from_codec(None, BincodeCodec)
    }

    /// Create a registry whose named books live under `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self::from_codec(Some(root.into()), BincodeCodec)
    }
}

impl<C: Codec + Clone> Registry<C> {
    /// Create a registry with a custom codec, cloned into every store
    pub fn with_codec(root: impl Into<PathBuf>, codec: C) -> Self {
        Self::from_codec(Some(root.into()), codec)
    }

    fn from_codec(root: Option<PathBuf>, codec: C) -> Self {
        Self {
            root,
            codec,
            books: Mutex::new(HashMap::new()),
        }
    }

    /// The default book under the registry's root
    pub fn default_book(&self) -> Result<Book<C>> {
        let root = self.configured_root()?;
        Ok(self.book_in(&root, DEFAULT_BOOK_NAME))
    }

    /// The book named `name` under the registry's root.
    ///
    /// [`DEFAULT_BOOK_NAME`] is reserved for [`default_book`](Self::default_book).
    pub fn book(&self, name: &str) -> Result<Book<C>> {
        if name == DEFAULT_BOOK_NAME {
            return Err(FolioError::Registry(format!(
                "book name {DEFAULT_BOOK_NAME:?} is reserved for the default book"
            )));
        }
        let root = self.configured_root()?;
        Ok(self.book_in(&root, name))
    }

    /// The book named `name` stored under an explicit `location`, e.g. on
    /// removable media. Works even on a registry with no default root.
    pub fn book_at(&self, location: impl AsRef<Path>, name: &str) -> Book<C> {
        self.book_in(location.as_ref(), name)
    }

    fn configured_root(&self) -> Result<PathBuf> {
        self.root.clone().ok_or(FolioError::Uninitialized)
    }

    fn book_in(&self, location: &Path, name: &str) -> Book<C> {
        let mut books = self.books.lock();
        let store = books
            .entry((location.to_path_buf(), name.to_string()))
            .or_insert_with(|| {
                Arc::new(Store::with_codec(location.join(name), self.codec.clone()))
            });
        Book {
            store: Arc::clone(store),
        }
    }
}

impl Default for Registry<BincodeCodec> {
    fn default() -> Self {
        Self::new()
    }
}

/// Cheap cloneable handle to one named store
///
/// All clones of a `Book` (and every `Book` obtained for the same location
/// and name) share one [`Store`] and one lock table.
pub struct Book<C: Codec = BincodeCodec> {
    store: Arc<Store<C>>,
}

impl<C: Codec> Clone for Book<C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<C: Codec> Book<C> {
    /// See [`Store::write`]
    pub fn write<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.store.write(key, value)
    }

    /// See [`Store::read`]
    pub fn read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.store.read(key)
    }

    /// See [`Store::read_or`]
    pub fn read_or<T: serde::de::DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        self.store.read_or(key, default)
    }

    /// See [`Store::contains`]
    pub fn contains(&self, key: &str) -> Result<bool> {
        self.store.contains(key)
    }

    /// See [`Store::last_modified`]
    pub fn last_modified(&self, key: &str) -> Result<Option<std::time::SystemTime>> {
        self.store.last_modified(key)
    }

    /// See [`Store::delete`]
    pub fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(key)
    }

    /// See [`Store::all_keys`]
    pub fn all_keys(&self) -> Result<Vec<String>> {
        self.store.all_keys()
    }

    /// See [`Store::destroy`]
    pub fn destroy(&self) -> Result<()> {
        self.store.destroy()
    }

    /// See [`Store::root_path`]
    pub fn path(&self) -> &Path {
        self.store.root_path()
    }

    /// See [`Store::entry_path`]
    pub fn entry_path(&self, key: &str) -> Result<PathBuf> {
        self.store.entry_path(key)
    }

    /// The shared engine behind this handle, for identity checks and tests
    pub fn store(&self) -> &Arc<Store<C>> {
        &self.store
    }
}
