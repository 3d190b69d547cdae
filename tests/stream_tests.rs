//! Stream store tests

use std::io::Read;

use streamvault::{
    Config, FindStreamCriteria, MetaMap, SelectionStrategy, StoreError, StreamStatus, StreamStore,
};
use tempfile::TempDir;

fn config_for(dir: &TempDir) -> Config {
    Config::builder()
        .volume(dir.path().join("volume1"))
        .ref_store_path(dir.path().join("refdata.svd"))
        .build()
}

fn headers() -> MetaMap {
    let mut map = MetaMap::new();
    map.insert("Feed", "WEB");
    map.insert("Environment", "test");
    map
}

fn write_stream(store: &StreamStore, feed: &str, stream_type: &str, content: &[u8]) -> u64 {
    let mut target = store.create_stream(feed, stream_type, headers()).unwrap();
    target.write(content).unwrap();
    target.close().unwrap().id
}

// =============================================================================
// Create / Close
// =============================================================================

#[test]
fn test_closed_stream_is_visible_and_readable() {
    let dir = TempDir::new().unwrap();
    let store = StreamStore::open(&config_for(&dir)).unwrap();

    let id = write_stream(&store, "WEB", "EVENTS", b"hello");

    let found = store.find_meta(&FindStreamCriteria::new());
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, id);
    assert_eq!(found[0].feed, "WEB");
    assert_eq!(found[0].size, 5);
    assert_eq!(found[0].status, StreamStatus::Unlocked);
    assert_eq!(found[0].meta_map.get("Environment"), Some("test"));

    let mut source = store.open_stream_for_read(id).unwrap().unwrap();
    let mut content = Vec::new();
    source.read_to_end(&mut content).unwrap();
    assert_eq!(content, b"hello");
}

#[test]
fn test_unclosed_stream_never_becomes_visible() {
    let dir = TempDir::new().unwrap();
    let store = StreamStore::open(&config_for(&dir)).unwrap();

    {
        let mut target = store.create_stream("WEB", "EVENTS", headers()).unwrap();
        target.write(b"partial").unwrap();
        // dropped without close
    }

    assert!(store.find_meta(&FindStreamCriteria::new()).is_empty());
    // The content file is gone too
    assert!(dir_is_dat_free(&dir));
}

fn dir_is_dat_free(dir: &TempDir) -> bool {
    !walk_files(dir.path().join("volume1"))
        .iter()
        .any(|p| p.extension().and_then(|e| e.to_str()) == Some("dat"))
}

fn walk_files(root: std::path::PathBuf) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![root];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files
}

#[test]
fn test_aborted_stream_leaves_no_trace() {
    let dir = TempDir::new().unwrap();
    let store = StreamStore::open(&config_for(&dir)).unwrap();

    let mut target = store.create_stream("WEB", "EVENTS", headers()).unwrap();
    target.write(b"doomed").unwrap();
    target.abort();

    assert!(store.find_meta(&FindStreamCriteria::new()).is_empty());
    assert!(dir_is_dat_free(&dir));
}

#[test]
fn test_footer_is_persisted() {
    let dir = TempDir::new().unwrap();
    let store = StreamStore::open(&config_for(&dir)).unwrap();

    let mut target = store.create_stream("WEB", "EVENTS", headers()).unwrap();
    target.write(b"body").unwrap();
    let mut footer = MetaMap::new();
    footer.insert("StreamSize", "4");
    target.set_footer(footer);
    let meta = target.close().unwrap();

    assert_eq!(
        meta.footer.as_ref().and_then(|f| f.get("StreamSize")),
        Some("4")
    );
}

// =============================================================================
// Search
// =============================================================================

#[test]
fn test_find_filters_by_feed_and_type() {
    let dir = TempDir::new().unwrap();
    let store = StreamStore::open(&config_for(&dir)).unwrap();

    write_stream(&store, "WEB", "EVENTS", b"1");
    write_stream(&store, "WEB", "ERRORS", b"2");
    write_stream(&store, "MAIL", "EVENTS", b"3");

    let web = store.find_meta(&FindStreamCriteria::new().with_feed("WEB"));
    assert_eq!(web.len(), 2);

    let web_events = store.find_meta(
        &FindStreamCriteria::new()
            .with_feed("WEB")
            .with_stream_type("EVENTS"),
    );
    assert_eq!(web_events.len(), 1);

    let any = store.find_meta(&FindStreamCriteria::new());
    assert_eq!(any.len(), 3);
    // Results come back ordered by id
    assert!(any.windows(2).all(|w| w[0].id < w[1].id));
}

// =============================================================================
// Locking
// =============================================================================

#[test]
fn test_open_reader_locks_stream() {
    let dir = TempDir::new().unwrap();
    let store = StreamStore::open(&config_for(&dir)).unwrap();
    let id = write_stream(&store, "WEB", "EVENTS", b"data");

    let source = store.open_stream_for_read(id).unwrap().unwrap();
    assert_eq!(source.meta().status, StreamStatus::Locked);

    let found = store.find_meta(&FindStreamCriteria::new().with_status(StreamStatus::Locked));
    assert_eq!(found.len(), 1);

    drop(source);
    let found = store.find_meta(&FindStreamCriteria::new().with_status(StreamStatus::Unlocked));
    assert_eq!(found.len(), 1);
}

#[test]
fn test_stream_stays_locked_until_last_reader() {
    let dir = TempDir::new().unwrap();
    let store = StreamStore::open(&config_for(&dir)).unwrap();
    let id = write_stream(&store, "WEB", "EVENTS", b"data");

    let first = store.open_stream_for_read(id).unwrap().unwrap();
    let second = store.open_stream_for_read(id).unwrap().unwrap();

    drop(first);
    let locked = store.find_meta(&FindStreamCriteria::new().with_status(StreamStatus::Locked));
    assert_eq!(locked.len(), 1);

    drop(second);
    let locked = store.find_meta(&FindStreamCriteria::new().with_status(StreamStatus::Locked));
    assert!(locked.is_empty());
}

#[test]
fn test_delete_fails_while_locked() {
    let dir = TempDir::new().unwrap();
    let store = StreamStore::open(&config_for(&dir)).unwrap();
    let id = write_stream(&store, "WEB", "EVENTS", b"data");

    let source = store.open_stream_for_read(id).unwrap().unwrap();
    assert!(matches!(
        store.delete_stream(id),
        Err(StoreError::StreamLocked(_))
    ));

    drop(source);
    assert!(store.delete_stream(id).unwrap());
}

// =============================================================================
// Delete / Sweep
// =============================================================================

#[test]
fn test_deleted_stream_hidden_then_swept() {
    let dir = TempDir::new().unwrap();
    let store = StreamStore::open(&config_for(&dir)).unwrap();
    let id = write_stream(&store, "WEB", "EVENTS", b"data");

    assert!(store.delete_stream(id).unwrap());

    // Hidden from default searches, unreadable, but still findable by status
    assert!(store.find_meta(&FindStreamCriteria::new()).is_empty());
    assert!(store.open_stream_for_read(id).unwrap().is_none());
    let deleted = store.find_meta(&FindStreamCriteria::new().with_status(StreamStatus::Deleted));
    assert_eq!(deleted.len(), 1);

    // Deleting again is a no-op
    assert!(!store.delete_stream(id).unwrap());

    assert_eq!(store.sweep().unwrap(), 1);
    assert!(dir_is_dat_free(&dir));
    assert_eq!(store.stream_count(), 0);

    // Sweep is idempotent
    assert_eq!(store.sweep().unwrap(), 0);
}

#[test]
fn test_pending_sweep_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let config = config_for(&dir);

    let id = {
        let store = StreamStore::open(&config).unwrap();
        let id = write_stream(&store, "WEB", "EVENTS", b"data");
        store.delete_stream(id).unwrap();
        id
    };

    let store = StreamStore::open(&config).unwrap();
    assert_eq!(store.pending_sweep_count(), 1);
    assert_eq!(store.sweep().unwrap(), 1);
    assert!(store.open_stream_for_read(id).unwrap().is_none());
}

// =============================================================================
// Volumes / Persistence
// =============================================================================

#[test]
fn test_round_robin_spreads_streams_across_volumes() {
    let dir = TempDir::new().unwrap();
    let config = Config::builder()
        .volume(dir.path().join("volume1"))
        .volume(dir.path().join("volume2"))
        .strategy(SelectionStrategy::RoundRobin)
        .ref_store_path(dir.path().join("refdata.svd"))
        .build();
    let store = StreamStore::open(&config).unwrap();

    for i in 0..4 {
        write_stream(&store, "WEB", "EVENTS", format!("s{}", i).as_bytes());
    }

    let in_v1 = walk_files(dir.path().join("volume1"))
        .iter()
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("dat"))
        .count();
    let in_v2 = walk_files(dir.path().join("volume2"))
        .iter()
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("dat"))
        .count();
    assert_eq!(in_v1, 2);
    assert_eq!(in_v2, 2);
}

#[test]
fn test_in_flight_writes_count_against_capacity() {
    let dir = TempDir::new().unwrap();
    let config = Config::builder()
        .volume_with_capacity(dir.path().join("volume1"), 64)
        .ref_store_path(dir.path().join("refdata.svd"))
        .build();
    let store = StreamStore::open(&config).unwrap();

    let mut target = store.create_stream("WEB", "EVENTS", headers()).unwrap();
    target.write(&[0u8; 128]).unwrap();

    // The unclosed stream already fills the volume
    assert!(matches!(
        store.create_stream("WEB", "EVENTS", headers()),
        Err(StoreError::Create(_))
    ));

    // Aborting releases the reserved bytes
    target.abort();
    store
        .create_stream("WEB", "EVENTS", headers())
        .unwrap()
        .abort();
}

#[test]
fn test_reopen_recovers_streams_and_ids() {
    let dir = TempDir::new().unwrap();
    let config = config_for(&dir);

    let first_id = {
        let store = StreamStore::open(&config).unwrap();
        write_stream(&store, "WEB", "EVENTS", b"persisted")
    };

    let store = StreamStore::open(&config).unwrap();
    let found = store.find_meta(&FindStreamCriteria::new());
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].feed, "WEB");

    let mut source = store.open_stream_for_read(first_id).unwrap().unwrap();
    let mut content = Vec::new();
    source.read_to_end(&mut content).unwrap();
    assert_eq!(content, b"persisted");

    // New ids never collide with recovered ones
    let next_id = write_stream(&store, "WEB", "EVENTS", b"new");
    assert!(next_id > first_id);
}
