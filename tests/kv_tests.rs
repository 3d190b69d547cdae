//! Key/value engine tests

use std::thread;
use std::time::Duration;

use streamvault::kv::{Direction, EnvOptions, KvEnv};
use streamvault::StoreError;
use tempfile::TempDir;

fn small_opts() -> EnvOptions {
    EnvOptions {
        max_size: 1024 * 1024,
        ..EnvOptions::default()
    }
}

fn open_env(dir: &TempDir) -> KvEnv {
    KvEnv::open(&dir.path().join("region.svd"), small_opts()).unwrap()
}

// =============================================================================
// Basic Operations
// =============================================================================

#[test]
fn test_put_get_delete() {
    let dir = TempDir::new().unwrap();
    let env = open_env(&dir);
    let store = env.open_store("main").unwrap();

    let mut txn = env.begin_write().unwrap();
    txn.put(store, b"alpha", b"1");
    txn.put(store, b"beta", b"2");
    txn.commit().unwrap();

    let txn = env.begin_read();
    assert_eq!(txn.get(store, b"alpha").as_deref(), Some(&b"1"[..]));
    assert_eq!(txn.get(store, b"missing"), None);
    txn.close();

    let mut txn = env.begin_write().unwrap();
    txn.delete(store, b"alpha");
    txn.commit().unwrap();

    let txn = env.begin_read();
    assert_eq!(txn.get(store, b"alpha"), None);
    assert_eq!(txn.get(store, b"beta").as_deref(), Some(&b"2"[..]));
}

#[test]
fn test_abort_discards_staged_writes() {
    let dir = TempDir::new().unwrap();
    let env = open_env(&dir);
    let store = env.open_store("main").unwrap();

    let mut txn = env.begin_write().unwrap();
    txn.put(store, b"key", b"value");
    txn.abort();

    let txn = env.begin_read();
    assert_eq!(txn.get(store, b"key"), None);
}

#[test]
fn test_staged_writes_visible_inside_own_txn() {
    let dir = TempDir::new().unwrap();
    let env = open_env(&dir);
    let store = env.open_store("main").unwrap();

    let mut txn = env.begin_write().unwrap();
    txn.put(store, b"key", b"value");
    assert_eq!(txn.get(store, b"key").as_deref(), Some(&b"value"[..]));
    txn.delete(store, b"key");
    assert_eq!(txn.get(store, b"key"), None);
    txn.abort();
}

// =============================================================================
// Durability
// =============================================================================

#[test]
fn test_reopen_recovers_committed_state() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("region.svd");

    {
        let env = KvEnv::open(&path, small_opts()).unwrap();
        let store = env.open_store("main").unwrap();
        let mut txn = env.begin_write().unwrap();
        txn.put(store, b"persisted", b"yes");
        txn.put(store, b"doomed", b"no");
        txn.commit().unwrap();

        let mut txn = env.begin_write().unwrap();
        txn.delete(store, b"doomed");
        txn.commit().unwrap();
    }

    let env = KvEnv::open(&path, small_opts()).unwrap();
    let store = env.open_store("main").unwrap();
    let txn = env.begin_read();
    assert_eq!(txn.get(store, b"persisted").as_deref(), Some(&b"yes"[..]));
    assert_eq!(txn.get(store, b"doomed"), None);
}

#[test]
fn test_reopen_recovers_named_stores() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("region.svd");

    let first_id;
    {
        let env = KvEnv::open(&path, small_opts()).unwrap();
        first_id = env.open_store("catalogued").unwrap();
    }

    let env = KvEnv::open(&path, small_opts()).unwrap();
    assert_eq!(env.open_store("catalogued").unwrap(), first_id);
}

#[test]
fn test_open_rejects_size_mismatch() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("region.svd");

    {
        KvEnv::open(&path, small_opts()).unwrap();
    }

    let result = KvEnv::open(
        &path,
        EnvOptions {
            max_size: 2 * 1024 * 1024,
            ..EnvOptions::default()
        },
    );
    assert!(matches!(result, Err(StoreError::StoreInit(_))));
}

// =============================================================================
// Capacity
// =============================================================================

#[test]
fn test_full_region_rejects_commit() {
    let dir = TempDir::new().unwrap();
    let env = KvEnv::open(
        &dir.path().join("tiny.svd"),
        EnvOptions {
            max_size: 4096,
            ..EnvOptions::default()
        },
    )
    .unwrap();
    let store = env.open_store("main").unwrap();

    let mut txn = env.begin_write().unwrap();
    txn.put(store, b"big", &vec![0u8; 8192]);
    let result = txn.commit();
    assert!(matches!(result, Err(StoreError::StoreCapacity(_))));

    // The failed commit must leave nothing visible and the env usable
    let txn = env.begin_read();
    assert_eq!(txn.get(store, b"big"), None);
    txn.close();

    let mut txn = env.begin_write().unwrap();
    txn.put(store, b"small", b"fits");
    txn.commit().unwrap();
}

// =============================================================================
// Cursors
// =============================================================================

#[test]
fn test_cursor_ascending_from_start_key() {
    let dir = TempDir::new().unwrap();
    let env = open_env(&dir);
    let store = env.open_store("main").unwrap();

    let mut txn = env.begin_write().unwrap();
    for key in [b"a", b"c", b"e"] {
        txn.put(store, key, b"v");
    }
    txn.commit().unwrap();

    let txn = env.begin_read();
    let mut cursor = txn.cursor(store, b"b", Direction::Ascending);
    assert_eq!(cursor.next().unwrap().unwrap().0, b"c");
    assert_eq!(cursor.next().unwrap().unwrap().0, b"e");
    assert!(cursor.next().unwrap().is_none());
}

#[test]
fn test_cursor_descending_includes_start_key() {
    let dir = TempDir::new().unwrap();
    let env = open_env(&dir);
    let store = env.open_store("main").unwrap();

    let mut txn = env.begin_write().unwrap();
    for key in [b"a", b"c", b"e"] {
        txn.put(store, key, b"v");
    }
    txn.commit().unwrap();

    let txn = env.begin_read();
    let mut cursor = txn.cursor(store, b"c", Direction::Descending);
    assert_eq!(cursor.next().unwrap().unwrap().0, b"c");
    assert_eq!(cursor.next().unwrap().unwrap().0, b"a");
    assert!(cursor.next().unwrap().is_none());
}

#[test]
fn test_write_txn_cursor_merges_staged_writes() {
    let dir = TempDir::new().unwrap();
    let env = open_env(&dir);
    let store = env.open_store("main").unwrap();

    let mut txn = env.begin_write().unwrap();
    txn.put(store, b"a", b"committed");
    txn.put(store, b"c", b"3");
    txn.commit().unwrap();

    let mut txn = env.begin_write().unwrap();
    txn.put(store, b"a", b"staged"); // overwrite shadows the snapshot
    txn.put(store, b"b", b"2"); // new key interleaves
    txn.delete(store, b"c"); // staged deletion disappears

    let mut cursor = txn.cursor(store, b"", Direction::Ascending);
    let (key, value) = cursor.next().unwrap().unwrap();
    assert_eq!((key.as_slice(), value.as_ref()), (&b"a"[..], &b"staged"[..]));
    assert_eq!(cursor.next().unwrap().unwrap().0, b"b");
    assert!(cursor.next().unwrap().is_none());

    let mut cursor = txn.cursor(store, b"z", Direction::Descending);
    assert_eq!(cursor.next().unwrap().unwrap().0, b"b");
    assert_eq!(cursor.next().unwrap().unwrap().0, b"a");
    assert!(cursor.next().unwrap().is_none());

    txn.abort();
}

#[test]
fn test_cursor_fails_after_txn_close() {
    let dir = TempDir::new().unwrap();
    let env = open_env(&dir);
    let store = env.open_store("main").unwrap();

    let mut txn = env.begin_write().unwrap();
    txn.put(store, b"a", b"v");
    txn.commit().unwrap();

    let txn = env.begin_read();
    let mut cursor = txn.cursor(store, b"", Direction::Ascending);
    assert!(cursor.next().unwrap().is_some());
    txn.close();

    assert!(matches!(cursor.next(), Err(StoreError::UseAfterClose)));
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_second_writer_times_out() {
    let dir = TempDir::new().unwrap();
    let env = KvEnv::open(
        &dir.path().join("region.svd"),
        EnvOptions {
            max_size: 1024 * 1024,
            lock_timeout: Duration::from_millis(50),
            ..EnvOptions::default()
        },
    )
    .unwrap();

    let _held = env.begin_write().unwrap();
    let result = env.begin_write();
    assert!(matches!(result, Err(StoreError::StoreBusy(_))));
}

#[test]
fn test_second_writer_blocks_until_first_commits() {
    let dir = TempDir::new().unwrap();
    let env = open_env(&dir);
    let store = env.open_store("main").unwrap();

    let mut held = env.begin_write().unwrap();
    held.put(store, b"key", b"first");

    let env2 = env.clone();
    let started = std::time::Instant::now();
    let waiter = thread::spawn(move || {
        let mut txn = env2.begin_write().unwrap();
        let waited = started.elapsed();
        txn.put(store, b"key", b"second");
        txn.commit().unwrap();
        waited
    });

    thread::sleep(Duration::from_millis(300));
    held.commit().unwrap();

    // The second writer suspended until the first committed, then won
    let waited = waiter.join().unwrap();
    assert!(waited >= Duration::from_millis(250), "waited {:?}", waited);
    assert_eq!(
        env.begin_read().get(store, b"key").as_deref(),
        Some(&b"second"[..])
    );
}

#[test]
fn test_waiting_writer_proceeds_after_release() {
    let dir = TempDir::new().unwrap();
    let env = open_env(&dir);
    let store = env.open_store("main").unwrap();

    let held = env.begin_write().unwrap();

    let env2 = env.clone();
    let waiter = thread::spawn(move || {
        let mut txn = env2.begin_write().unwrap();
        txn.put(store, b"from-waiter", b"v");
        txn.commit().unwrap();
    });

    thread::sleep(Duration::from_millis(50));
    held.abort();
    waiter.join().unwrap();

    let txn = env.begin_read();
    assert_eq!(txn.get(store, b"from-waiter").as_deref(), Some(&b"v"[..]));
}

#[test]
fn test_readers_see_snapshot_not_later_commits() {
    let dir = TempDir::new().unwrap();
    let env = open_env(&dir);
    let store = env.open_store("main").unwrap();

    let mut txn = env.begin_write().unwrap();
    txn.put(store, b"key", b"before");
    txn.commit().unwrap();

    let reader = env.begin_read();

    let mut txn = env.begin_write().unwrap();
    txn.put(store, b"key", b"after");
    txn.commit().unwrap();

    // The old reader keeps its snapshot; a new reader sees the commit
    assert_eq!(reader.get(store, b"key").as_deref(), Some(&b"before"[..]));
    assert_eq!(
        env.begin_read().get(store, b"key").as_deref(),
        Some(&b"after"[..])
    );
}

#[test]
fn test_dropped_txn_releases_writer_lock() {
    let dir = TempDir::new().unwrap();
    let env = KvEnv::open(
        &dir.path().join("region.svd"),
        EnvOptions {
            max_size: 1024 * 1024,
            lock_timeout: Duration::from_millis(100),
            ..EnvOptions::default()
        },
    )
    .unwrap();

    {
        let _dropped = env.begin_write().unwrap();
    }
    // Must not time out
    env.begin_write().unwrap().abort();
}
