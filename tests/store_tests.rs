//! Tests for the Store engine
//!
//! These tests verify:
//! - Round trips through the default codec
//! - Last-write-wins semantics and backup cleanup
//! - Crash recovery (interrupted writes healed on next read)
//! - Soft not-found behavior and defaults
//! - Key validation and enumeration
//! - Whole-store destruction and lazy re-creation

use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use foliodb::{BincodeCodec, Codec, FolioError, Store};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Person {
    name: String,
    age: u32,
    phones: Vec<String>,
}

fn sample_person() -> Person {
    Person {
        name: "elizabeth".to_string(),
        age: 41,
        phones: vec!["+46 46 555 0100".to_string()],
    }
}

fn setup_store() -> (TempDir, Store) {
    let temp = TempDir::new().unwrap();
    let store = Store::open(temp.path().join("book"));
    (temp, store)
}

fn primary_file(store: &Store, key: &str) -> PathBuf {
    store.entry_path(key).unwrap()
}

fn backup_file(store: &Store, key: &str) -> PathBuf {
    let mut name = primary_file(store, key).into_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

/// Codec that encodes normally until its switch is flipped, then fails every
/// encode. Decoding always delegates to the default codec.
#[derive(Clone)]
struct FlakyCodec {
    fail_writes: Arc<AtomicBool>,
}

impl Codec for FlakyCodec {
    fn encode<T: Serialize>(&self, value: &T, sink: &mut dyn Write) -> foliodb::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(FolioError::Encode("unsupported structure".to_string()));
        }
        BincodeCodec.encode(value, sink)
    }

    fn decode<T: DeserializeOwned>(&self, source: &mut dyn Read) -> foliodb::Result<T> {
        BincodeCodec.decode(source)
    }

    fn decode_compat<T: DeserializeOwned>(&self, source: &mut dyn Read) -> Option<foliodb::Result<T>> {
        BincodeCodec.decode_compat(source)
    }
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_write_read_roundtrip() {
    let (_temp, store) = setup_store();

    store.write("person", &sample_person()).unwrap();

    let read: Option<Person> = store.read("person").unwrap();
    assert_eq!(read, Some(sample_person()));
}

#[test]
fn test_roundtrip_various_types() {
    let (_temp, store) = setup_store();

    store.write("string", &"hello".to_string()).unwrap();
    store.write("number", &42u64).unwrap();
    store.write("list", &vec![1i32, 2, 3]).unwrap();

    assert_eq!(store.read::<String>("string").unwrap().unwrap(), "hello");
    assert_eq!(store.read::<u64>("number").unwrap().unwrap(), 42);
    assert_eq!(store.read::<Vec<i32>>("list").unwrap().unwrap(), vec![1, 2, 3]);
}

#[test]
fn test_last_write_wins() {
    let (_temp, store) = setup_store();

    let mut v2 = sample_person();
    v2.age = 42;

    store.write("person", &sample_person()).unwrap();
    store.write("person", &v2).unwrap();

    let read: Option<Person> = store.read("person").unwrap();
    assert_eq!(read, Some(v2));

    // Steady state after a successful overwrite: no backup remains
    assert!(primary_file(&store, "person").exists());
    assert!(!backup_file(&store, "person").exists());
}

// =============================================================================
// Not-Found Tests
// =============================================================================

#[test]
fn test_read_missing_returns_none() {
    let (_temp, store) = setup_store();
    assert_eq!(store.read::<Person>("missing").unwrap(), None);
}

#[test]
fn test_read_or_default() {
    let (_temp, store) = setup_store();

    let fallback = sample_person();
    let read: Person = store.read_or("missing", fallback.clone()).unwrap();
    assert_eq!(read, fallback);

    // A present key ignores the default
    store.write("present", &42u32).unwrap();
    assert_eq!(store.read_or("present", 0u32).unwrap(), 42);
}

#[test]
fn test_contains() {
    let (_temp, store) = setup_store();

    assert!(!store.contains("city").unwrap());
    store.write("city", &"Lund".to_string()).unwrap();
    assert!(store.contains("city").unwrap());
}

#[test]
fn test_delete_missing_is_noop() {
    let (_temp, store) = setup_store();

    store.write("keep", &1u8).unwrap();
    store.delete("missing").unwrap();

    assert_eq!(store.all_keys().unwrap(), vec!["keep".to_string()]);
}

#[test]
fn test_delete_removes_value() {
    let (_temp, store) = setup_store();

    store.write("city", &"Lund".to_string()).unwrap();
    store.delete("city").unwrap();

    assert!(!store.contains("city").unwrap());
    assert_eq!(store.read::<String>("city").unwrap(), None);
}

// =============================================================================
// Crash Recovery Tests
// =============================================================================

#[test]
fn test_read_heals_interrupted_write() {
    let (_temp, store) = setup_store();
    store.write("person", &sample_person()).unwrap();

    // Simulate a write interrupted after the primary → backup pivot but
    // before the new primary was synced: backup holds the last good value,
    // primary is a partial write.
    let primary = primary_file(&store, "person");
    let backup = backup_file(&store, "person");
    fs::rename(&primary, &backup).unwrap();
    fs::write(&primary, b"partial garbage").unwrap();

    let read: Option<Person> = store.read("person").unwrap();
    assert_eq!(read, Some(sample_person()));

    // Healed back to steady state
    assert!(primary.exists());
    assert!(!backup.exists());
}

#[test]
fn test_read_heals_when_primary_is_missing() {
    let (_temp, store) = setup_store();
    store.write("person", &sample_person()).unwrap();

    // Crash variant: primary never reappeared at all
    let primary = primary_file(&store, "person");
    let backup = backup_file(&store, "person");
    fs::rename(&primary, &backup).unwrap();

    let read: Option<Person> = store.read("person").unwrap();
    assert_eq!(read, Some(sample_person()));
    assert!(primary.exists());
    assert!(!backup.exists());
}

#[test]
fn test_write_discards_stale_primary_next_to_backup() {
    let (_temp, store) = setup_store();
    store.write("person", &sample_person()).unwrap();

    // Crash state again: valid backup plus partial primary
    let primary = primary_file(&store, "person");
    let backup = backup_file(&store, "person");
    fs::rename(&primary, &backup).unwrap();
    fs::write(&primary, b"partial garbage").unwrap();

    // A new write must not promote the partial primary to a backup
    let mut v2 = sample_person();
    v2.name = "peter".to_string();
    store.write("person", &v2).unwrap();

    let read: Option<Person> = store.read("person").unwrap();
    assert_eq!(read, Some(v2));
    assert!(!backup.exists());
}

#[test]
fn test_failed_write_rolls_back_to_previous_value() {
    let temp = TempDir::new().unwrap();
    let fail_writes = Arc::new(AtomicBool::new(false));
    let store = Store::with_codec(
        temp.path().join("book"),
        FlakyCodec {
            fail_writes: Arc::clone(&fail_writes),
        },
    );

    store.write("person", &sample_person()).unwrap();

    // Second write fails mid-encode, after the primary → backup pivot
    fail_writes.store(true, Ordering::SeqCst);
    let mut v2 = sample_person();
    v2.age = 42;
    let err = store.write("person", &v2).unwrap_err();

    // The failure keeps its codec kind and points the caller at the backup
    assert!(matches!(err, FolioError::Encode(_)));
    assert!(err.to_string().contains("backed up value will be used on the next read"));

    // Rollback state on disk: no partial primary, backup intact
    let primary = store.entry_path("person").unwrap();
    let mut backup = primary.clone().into_os_string();
    backup.push(".bak");
    let backup = PathBuf::from(backup);
    assert!(!primary.exists());
    assert!(backup.exists());

    // The next read restores the previous committed value
    fail_writes.store(false, Ordering::SeqCst);
    let read: Option<Person> = store.read("person").unwrap();
    assert_eq!(read, Some(sample_person()));
    assert!(primary.exists());
    assert!(!backup.exists());
}

#[test]
fn test_undeletable_backup_fails_the_write() {
    let (_temp, store) = setup_store();
    store.write("person", &sample_person()).unwrap();

    // A backup that cannot be removed must fail the write loudly: if it
    // survived a commit, the next read would restore it over the fresh
    // primary and silently revert the committed value. A directory in the
    // backup's place makes remove_file fail deterministically.
    let backup = backup_file(&store, "person");
    fs::create_dir(&backup).unwrap();

    let mut v2 = sample_person();
    v2.age = 42;
    let result = store.write("person", &v2);
    assert!(matches!(result, Err(FolioError::Storage(_))));
}

#[test]
fn test_unreadable_value_is_left_for_inspection() {
    let (_temp, store) = setup_store();
    store.write("person", &sample_person()).unwrap();

    let primary = primary_file(&store, "person");
    fs::write(&primary, [0xff; 32]).unwrap();

    let result = store.read::<Person>("person");
    assert!(matches!(result, Err(FolioError::Decode(_))));

    // Corrupt content is a forensic artifact, never auto-deleted
    assert!(primary.exists());
    assert_eq!(fs::read(&primary).unwrap(), vec![0xff; 32]);
}

// =============================================================================
// Key Validation Tests
// =============================================================================

#[test]
fn test_invalid_key_rejected_before_io() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("book");
    let store = Store::open(&root);

    let result = store.write("a/b", &1u8);
    assert!(matches!(result, Err(FolioError::InvalidKey { .. })));

    // Rejected before any I/O: not even the store directory was created
    assert!(!root.exists());
}

#[test]
fn test_invalid_key_rejected_everywhere() {
    let (_temp, store) = setup_store();

    assert!(matches!(store.read::<u8>(""), Err(FolioError::InvalidKey { .. })));
    assert!(matches!(store.contains("a/b"), Err(FolioError::InvalidKey { .. })));
    assert!(matches!(store.delete("a\\b"), Err(FolioError::InvalidKey { .. })));
    assert!(matches!(store.last_modified(""), Err(FolioError::InvalidKey { .. })));
    assert!(matches!(store.entry_path("a/b"), Err(FolioError::InvalidKey { .. })));
}

// =============================================================================
// Metadata Tests
// =============================================================================

#[test]
fn test_last_modified() {
    let (_temp, store) = setup_store();

    assert_eq!(store.last_modified("city").unwrap(), None);

    let before = std::time::SystemTime::now();
    store.write("city", &"Lund".to_string()).unwrap();
    let modified = store.last_modified("city").unwrap().unwrap();

    // Filesystem mtime may be second-granular; allow slack on both sides
    let slack = std::time::Duration::from_secs(2);
    assert!(modified + slack >= before);
    assert!(modified <= std::time::SystemTime::now() + slack);
}

#[test]
fn test_entry_path_points_at_primary_file() {
    let (_temp, store) = setup_store();

    let path = store.entry_path("city").unwrap();
    assert!(!path.exists());

    store.write("city", &"Lund".to_string()).unwrap();
    assert!(path.exists());
    assert_eq!(path.extension().unwrap(), "pt");
    assert!(path.starts_with(store.root_path()));
}

// =============================================================================
// Enumeration Tests
// =============================================================================

#[test]
fn test_all_keys() {
    let (_temp, store) = setup_store();

    for key in ["a", "b", "c"] {
        store.write(key, &key.to_string()).unwrap();
    }

    let mut keys = store.all_keys().unwrap();
    keys.sort();
    assert_eq!(keys, vec!["a", "b", "c"]);
}

#[test]
fn test_all_keys_ignores_stray_files() {
    let (_temp, store) = setup_store();

    store.write("a", &1u8).unwrap();
    store.write("b", &2u8).unwrap();

    // A backup-only remnant and an unrelated file must not show up
    fs::write(store.root_path().join("ghost.pt.bak"), b"remnant").unwrap();
    fs::write(store.root_path().join("notes.txt"), b"unrelated").unwrap();

    let mut keys = store.all_keys().unwrap();
    keys.sort();
    assert_eq!(keys, vec!["a", "b"]);
}

#[test]
fn test_all_keys_on_empty_store() {
    let (_temp, store) = setup_store();
    assert!(store.all_keys().unwrap().is_empty());
}

// =============================================================================
// Destroy Tests
// =============================================================================

#[test]
fn test_destroy_removes_everything() {
    let (_temp, store) = setup_store();

    store.write("a", &1u8).unwrap();
    store.write("b", &2u8).unwrap();
    store.destroy().unwrap();

    assert!(!store.root_path().exists());
}

#[test]
fn test_store_usable_after_destroy() {
    let (_temp, store) = setup_store();

    store.write("a", &1u8).unwrap();
    store.destroy().unwrap();

    // The directory is recreated lazily by the next write
    store.write("b", &2u8).unwrap();
    assert_eq!(store.all_keys().unwrap(), vec!["b".to_string()]);
    assert!(!store.contains("a").unwrap());
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_values_survive_reopen() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("book");

    {
        let store = Store::open(&root);
        store.write("person", &sample_person()).unwrap();
    }

    // A fresh engine over the same directory sees the committed value.
    // (Production code must go through a Registry to get a shared instance;
    // here the first store is dropped before the second exists.)
    let store = Store::open(&root);
    let read: Option<Person> = store.read("person").unwrap();
    assert_eq!(read, Some(sample_person()));
}

#[test]
fn test_large_value_roundtrip() {
    let (_temp, store) = setup_store();

    let dataset: Vec<u64> = (0..100_000).collect();
    store.write("dataset", &dataset).unwrap();

    let read: Vec<u64> = store.read("dataset").unwrap().unwrap();
    assert_eq!(read, dataset);
}
