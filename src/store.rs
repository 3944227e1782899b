//! Store Module
//!
//! The file-based storage engine: one value per key, one file per value,
//! written atomically and recoverable after a crash.
//!
//! ## Responsibilities
//! - Atomic per-key writes with backup-based rollback
//! - Read with transparent self-healing after an interrupted write
//! - Existence/metadata queries, deletion, enumeration, destruction
//! - Lazy, race-safe creation of the store directory
//!
//! ## Write protocol (per key, under that key's lock)
//!
//! ```text
//!  primary exists?
//!    ├── yes, no backup  → rename primary → backup   (rollback point)
//!    ├── yes, backup too → delete primary            (failed-write remnant)
//!    └── no              → nothing to preserve
//!  encode into fresh primary, flush, fsync
//!    ├── ok   → delete backup                        (commit)
//!    └── err  → delete partial primary               (backup restored on next read)
//! ```
//!
//! A crash anywhere in that window leaves either a complete primary or a
//! complete backup on disk; the next `read` of the key collapses the state
//! back to a single primary holding the last committed value.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::codec::{BincodeCodec, Codec};
use crate::error::{FolioError, Result};
use crate::keylock::KeyLock;
use crate::paths;

/// On-disk envelope around a stored value
#[derive(Serialize, Deserialize)]
struct Record<T> {
    content: T,
}

/// File-backed key/value store for one root directory
///
/// ## Concurrency:
/// - `locks`: per-key FIFO exclusion + global barrier (see [`KeyLock`])
/// - `dir_created`: its own mutex, independent of `locks`, because directory
///   creation must be resolved before any key-specific lock exists
/// - All methods take `&self`; a `Store` is shared across threads as-is
///
/// Two `Store` instances over the same directory would bypass each other's
/// locks entirely — always obtain stores through a
/// [`Registry`](crate::registry::Registry), which hands out one instance per
/// location.
pub struct Store<C: Codec = BincodeCodec> {
    /// Root directory holding the `<key>.pt` files
    root: PathBuf,

    /// Lazily-created-directory flag; guarded independently of `locks`
    dir_created: Mutex<bool>,

    /// Two-level concurrency control for all operations
    locks: KeyLock,

    /// Injected value serializer
    codec: C,
}

impl Store<BincodeCodec> {
    /// Create a store over `root` with the default bincode codec.
    ///
    /// The directory is not touched until the first operation needs it.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self::with_codec(root, BincodeCodec)
    }
}

impl<C: Codec> Store<C> {
    /// Create a store over `root` with a custom codec
    pub fn with_codec(root: impl Into<PathBuf>, codec: C) -> Self {
        Self {
            root: root.into(),
            dir_created: Mutex::new(false),
            locks: KeyLock::new(),
            codec,
        }
    }

    // =========================================================================
    // Per-key operations
    // =========================================================================

    /// Write `value` under `key`, replacing any previous value wholesale.
    ///
    /// The previous committed value survives on disk (as the backup file)
    /// until the new one is durably synced, so a crash or failure at any
    /// point leaves the last good value readable.
    pub fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        paths::validate_key(key)?;
        self.locks.acquire(key);
        let outcome = self.write_locked(key, value);
        self.locks.release(key)?;
        outcome
    }

    /// Read the value stored under `key`.
    ///
    /// Returns `Ok(None)` for an absent key. If an interrupted write left a
    /// backup behind, the backup is restored first, transparently. A value
    /// that cannot be decoded (after the codec's one compatibility attempt)
    /// surfaces [`FolioError::Decode`] and the file is left on disk for
    /// inspection.
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        paths::validate_key(key)?;
        self.locks.acquire(key);
        let outcome = self.read_locked(key);
        self.locks.release(key)?;
        outcome
    }

    /// Read the value stored under `key`, or `default` if the key is absent
    pub fn read_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.read(key)?.unwrap_or(default))
    }

    /// Check whether a value is stored under `key`
    pub fn contains(&self, key: &str) -> Result<bool> {
        paths::validate_key(key)?;
        self.locks.acquire(key);
        let outcome = self.contains_locked(key);
        self.locks.release(key)?;
        outcome
    }

    /// Modification timestamp of the last write for `key`, or `None` if the
    /// key is absent.
    ///
    /// Note: many filesystems keep modification time in whole seconds, so
    /// only second granularity is guaranteed.
    pub fn last_modified(&self, key: &str) -> Result<Option<SystemTime>> {
        paths::validate_key(key)?;
        self.locks.acquire(key);
        let outcome = self.last_modified_locked(key);
        self.locks.release(key)?;
        outcome
    }

    /// Delete the value stored under `key`, if any.
    ///
    /// An absent key is a no-op, not an error. A deletion that fails leaves
    /// on-disk state inconsistent with the caller's expectation and is
    /// therefore a fatal [`FolioError::Storage`].
    pub fn delete(&self, key: &str) -> Result<()> {
        paths::validate_key(key)?;
        self.locks.acquire(key);
        let outcome = self.delete_locked(key);
        self.locks.release(key)?;
        outcome
    }

    // =========================================================================
    // Store-wide operations (global barrier)
    // =========================================================================

    /// All keys currently stored, in directory order.
    ///
    /// Runs under the global barrier: no per-key operation is mid-flight
    /// while the directory is scanned, and none is admitted until the scan
    /// completes. Backup-only crash remnants are not reported.
    pub fn all_keys(&self) -> Result<Vec<String>> {
        self.locks.acquire_global();
        let outcome = self.all_keys_locked();
        self.locks.release_global()?;
        outcome
    }

    /// Destroy all data in the store.
    ///
    /// Runs under the global barrier. The store stays usable afterward:
    /// the next write recreates the directory lazily.
    pub fn destroy(&self) -> Result<()> {
        self.locks.acquire_global();
        let outcome = self.destroy_locked();
        self.locks.release_global()?;
        outcome
    }

    // =========================================================================
    // Path accessors
    // =========================================================================

    /// Root directory of this store.
    ///
    /// Does not exist on disk until the first value has been written.
    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding the value for `key`.
    ///
    /// Handy for export; the file only exists after a successful write.
    pub fn entry_path(&self, key: &str) -> Result<PathBuf> {
        paths::validate_key(key)?;
        Ok(paths::primary_path(&self.root, key))
    }

    // =========================================================================
    // Internals (callers hold the relevant lock)
    // =========================================================================

    fn write_locked<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.ensure_dir()?;

        let primary = paths::primary_path(&self.root, key);
        let backup = paths::backup_path(&primary);

        // Preserve the current value so the write can be rolled back
        if primary.exists() {
            if !backup.exists() {
                fs::rename(&primary, &backup).map_err(|e| {
                    FolioError::Storage(format!(
                        "couldn't rename {} to backup {}: {e}",
                        primary.display(),
                        backup.display()
                    ))
                })?;
            } else {
                // Backup already present: this primary is the remnant of an
                // earlier failed write, not a committed value
                warn!(key, "discarding partially-written file from failed write");
                fs::remove_file(&primary).map_err(|e| {
                    FolioError::Storage(format!(
                        "couldn't discard stale file {}: {e}",
                        primary.display()
                    ))
                })?;
            }
        }

        self.commit_value(key, value, &primary, &backup)
    }

    /// Write the new primary, sync it, then drop the backup. On failure the
    /// partial primary is removed so the backup is restored on next read.
    fn commit_value<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        primary: &Path,
        backup: &Path,
    ) -> Result<()> {
        let written = self.encode_to_file(value, primary);

        match written {
            Ok(()) => {
                // The new primary is durable; drop the rollback point. A
                // backup left behind would be restored over the new primary
                // by the next read, reverting the commit, so a failed
                // removal fails the write.
                if backup.exists() {
                    fs::remove_file(backup).map_err(|e| {
                        FolioError::Storage(format!(
                            "couldn't delete backup file {} after committing key {key:?}: {e}",
                            backup.display()
                        ))
                    })?;
                }
                debug!(key, "value committed");
                Ok(())
            }
            Err(e) => {
                if primary.exists() {
                    fs::remove_file(primary).map_err(|del| {
                        FolioError::Storage(format!(
                            "couldn't clean up partially-written file {}: {del} (after: {e})",
                            primary.display()
                        ))
                    })?;
                }
                let context = format!(
                    "couldn't save value for key {key:?}; the backed up value will be used on the next read"
                );
                Err(match e {
                    FolioError::Encode(msg) => FolioError::Encode(format!("{context}: {msg}")),
                    other => FolioError::Storage(format!("{context}: {other}")),
                })
            }
        }
    }

    /// Encode into a fresh file, flush the buffer, fsync before closing
    fn encode_to_file<T: Serialize>(&self, value: &T, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.codec.encode(&Record { content: value }, &mut writer)?;
        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| FolioError::Storage(format!("couldn't flush {}: {e}", path.display())))?;
        file.sync_all()?;
        Ok(())
    }

    fn read_locked<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.ensure_dir()?;

        let primary = paths::primary_path(&self.root, key);
        let backup = paths::backup_path(&primary);

        // A backup on disk means the last write for this key never
        // committed: the primary (if any) is incomplete and the backup holds
        // the last good value. Complete the interrupted transition.
        if backup.exists() {
            warn!(key, "restoring backup left by an interrupted write");
            if primary.exists() {
                fs::remove_file(&primary).map_err(|e| {
                    FolioError::Storage(format!(
                        "couldn't discard incomplete file {} before restore: {e}",
                        primary.display()
                    ))
                })?;
            }
            fs::rename(&backup, &primary).map_err(|e| {
                FolioError::Storage(format!(
                    "couldn't restore backup {} to {}: {e}",
                    backup.display(),
                    primary.display()
                ))
            })?;
        }

        if !primary.exists() {
            return Ok(None);
        }

        self.decode_from_file(key, &primary).map(Some)
    }

    /// Decode the primary file, giving the codec one compatibility-mode
    /// retry. The file is never deleted here — unreadable content is left
    /// intact for diagnosis.
    fn decode_from_file<T: DeserializeOwned>(&self, key: &str, primary: &Path) -> Result<T> {
        let mut reader = BufReader::new(File::open(primary)?);
        let primary_err = match self.codec.decode::<Record<T>>(&mut reader) {
            Ok(record) => return Ok(record.content),
            Err(e) => e,
        };
        drop(reader);

        // One more chance: read in compatibility mode
        let mut reader = BufReader::new(File::open(primary)?);
        match self.codec.decode_compat::<Record<T>>(&mut reader) {
            Some(Ok(record)) => {
                debug!(key, "value read in compatibility mode");
                Ok(record.content)
            }
            Some(Err(compat_err)) => Err(FolioError::Decode(format!(
                "couldn't read file {} for key {key:?}: {compat_err}",
                primary.display()
            ))),
            None => Err(FolioError::Decode(format!(
                "couldn't read file {} for key {key:?}: {primary_err}",
                primary.display()
            ))),
        }
    }

    fn contains_locked(&self, key: &str) -> Result<bool> {
        self.ensure_dir()?;
        Ok(paths::primary_path(&self.root, key).exists())
    }

    fn last_modified_locked(&self, key: &str) -> Result<Option<SystemTime>> {
        self.ensure_dir()?;
        let primary = paths::primary_path(&self.root, key);
        match fs::metadata(&primary) {
            Ok(meta) => Ok(Some(meta.modified()?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_locked(&self, key: &str) -> Result<()> {
        self.ensure_dir()?;
        let primary = paths::primary_path(&self.root, key);
        if !primary.exists() {
            return Ok(());
        }
        fs::remove_file(&primary).map_err(|e| {
            FolioError::Storage(format!(
                "couldn't delete file {} for key {key:?}: {e}",
                primary.display()
            ))
        })?;
        debug!(key, "value deleted");
        Ok(())
    }

    fn all_keys_locked(&self) -> Result<Vec<String>> {
        self.ensure_dir()?;
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(key) = name.to_str().and_then(paths::key_for_entry) {
                keys.push(key.to_string());
            }
        }
        Ok(keys)
    }

    fn destroy_locked(&self) -> Result<()> {
        self.ensure_dir()?;

        // Clear the flag before attempting removal: even if removal fails
        // halfway, the next operation re-runs directory creation instead of
        // trusting a gone or half-gone directory.
        *self.dir_created.lock() = false;

        fs::remove_dir_all(&self.root).map_err(|e| {
            FolioError::Storage(format!(
                "couldn't delete store dir {}: {e}",
                self.root.display()
            ))
        })?;
        debug!(root = %self.root.display(), "store destroyed");
        Ok(())
    }

    /// Create the store directory on first use.
    ///
    /// Guarded by its own mutex so concurrent first operations (possibly for
    /// different keys) race safely; creation itself is idempotent.
    fn ensure_dir(&self) -> Result<()> {
        let mut created = self.dir_created.lock();
        if !*created {
            if !self.root.exists() {
                fs::create_dir_all(&self.root).map_err(|e| {
                    FolioError::Storage(format!(
                        "couldn't create store dir {}: {e}",
                        self.root.display()
                    ))
                })?;
            }
            *created = true;
        }
        Ok(())
    }
}
