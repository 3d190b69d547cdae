//! Transactions
//!
//! Read transactions are a cheap `Arc` clone of the published snapshot.
//! Write transactions stage their changes in memory and make them durable
//! and visible only at commit.
//!
//! The writer lock is released on every exit path — commit, abort, or
//! drop — so a panicking or forgotten transaction can never wedge the
//! environment.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;

use super::cursor::{Cursor, Direction, Overlay};
use super::env::{EnvInner, Snapshot, StoreId, StoreMap};
use super::log::{Record, REC_CATALOG, REC_DELETE, REC_PUT};

// =============================================================================
// Read transactions
// =============================================================================

/// A read-only view of the environment at one commit point.
///
/// Any number of read transactions may be open at once; none of them block
/// a writer, and commits made after open are invisible to them.
pub struct ReadTxn {
    snapshot: Arc<Snapshot>,
    alive: Arc<AtomicBool>,
}

impl ReadTxn {
    pub(crate) fn new(snapshot: Arc<Snapshot>) -> Self {
        Self {
            snapshot,
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Get a value. `None` means the key is absent — never an error.
    pub fn get(&self, store: StoreId, key: &[u8]) -> Option<Bytes> {
        self.snapshot
            .stores
            .get(&store)
            .and_then(|map| map.get(key).cloned())
    }

    /// Open a lazy ordered cursor over `store`, positioned at `start_key`.
    pub fn cursor(&self, store: StoreId, start_key: &[u8], direction: Direction) -> Cursor {
        Cursor::new(
            self.store_map(store),
            Arc::new(Overlay::new()),
            Arc::clone(&self.alive),
            start_key.to_vec(),
            direction,
        )
    }

    /// Explicitly end the transaction (dropping does the same).
    pub fn close(self) {}

    fn store_map(&self, store: StoreId) -> Arc<StoreMap> {
        self.snapshot
            .stores
            .get(&store)
            .cloned()
            .unwrap_or_else(|| Arc::new(BTreeMap::new()))
    }
}

impl Drop for ReadTxn {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
    }
}

// =============================================================================
// Write transactions
// =============================================================================

/// The single writer: staged puts/deletes, atomic commit.
pub struct WriteTxn {
    env: Arc<EnvInner>,
    snapshot: Arc<Snapshot>,
    staged: BTreeMap<(StoreId, Vec<u8>), Option<Bytes>>,
    staged_catalog: Vec<(String, StoreId)>,
    alive: Arc<AtomicBool>,
    finished: bool,
}

impl WriteTxn {
    pub(crate) fn new(env: Arc<EnvInner>, snapshot: Arc<Snapshot>, alive: Arc<AtomicBool>) -> Self {
        Self {
            env,
            snapshot,
            staged: BTreeMap::new(),
            staged_catalog: Vec::new(),
            alive,
            finished: false,
        }
    }

    /// Insert or overwrite a key
    pub fn put(&mut self, store: StoreId, key: &[u8], value: &[u8]) {
        self.staged
            .insert((store, key.to_vec()), Some(Bytes::copy_from_slice(value)));
    }

    /// Delete a key (absent keys are fine)
    pub fn delete(&mut self, store: StoreId, key: &[u8]) {
        self.staged.insert((store, key.to_vec()), None);
    }

    /// Get a value; the transaction's own staged writes are visible.
    pub fn get(&self, store: StoreId, key: &[u8]) -> Option<Bytes> {
        match self.staged.get(&(store, key.to_vec())) {
            Some(staged) => staged.clone(),
            None => self
                .snapshot
                .stores
                .get(&store)
                .and_then(|map| map.get(key).cloned()),
        }
    }

    /// Open a cursor over the transaction's merged view of `store`
    /// (snapshot plus writes staged before the cursor was opened).
    ///
    /// The snapshot is shared, not copied; only the staged entries for
    /// `store` are collected into the cursor's overlay.
    pub fn cursor(&self, store: StoreId, start_key: &[u8], direction: Direction) -> Cursor {
        let mut overlay = Overlay::new();
        for ((sid, key), staged) in &self.staged {
            if *sid == store {
                overlay.insert(key.clone(), staged.clone());
            }
        }

        let map = self
            .snapshot
            .stores
            .get(&store)
            .cloned()
            .unwrap_or_else(|| Arc::new(BTreeMap::new()));

        Cursor::new(
            map,
            Arc::new(overlay),
            Arc::clone(&self.alive),
            start_key.to_vec(),
            direction,
        )
    }

    pub(crate) fn catalog(&self) -> &HashMap<String, StoreId> {
        &self.snapshot.catalog
    }

    pub(crate) fn register_store(&mut self, name: &str, id: StoreId) {
        self.staged_catalog.push((name.to_string(), id));
    }

    /// Make every staged write durable and visible, atomically.
    ///
    /// On any log failure the transaction is aborted (nothing becomes
    /// visible) and the error propagates. The writer lock is released
    /// either way.
    pub fn commit(mut self) -> Result<()> {
        let mut records: Vec<Record> =
            Vec::with_capacity(self.staged_catalog.len() + self.staged.len());

        for (name, id) in &self.staged_catalog {
            records.push(Record {
                store: 0,
                kind: REC_CATALOG,
                key: name.as_bytes().to_vec(),
                value: id.to_be_bytes().to_vec(),
            });
        }
        for ((store, key), staged) in &self.staged {
            records.push(match staged {
                Some(value) => Record {
                    store: *store,
                    kind: REC_PUT,
                    key: key.clone(),
                    value: value.to_vec(),
                },
                None => Record {
                    store: *store,
                    kind: REC_DELETE,
                    key: key.clone(),
                    value: Vec::new(),
                },
            });
        }

        // Durability first: nothing is published unless the log accepts
        // the whole batch. The guard must be gone before finish() runs.
        let appended = self.env.log.lock().append_all(&records);
        if let Err(e) = appended {
            self.finish();
            return Err(e);
        }

        // Publish: build the successor snapshot and swap it in
        let mut next = (*self.snapshot).clone();
        for (name, id) in self.staged_catalog.drain(..) {
            next.catalog.insert(name, id);
        }
        for ((store, key), staged) in std::mem::take(&mut self.staged) {
            let entry = next.stores.entry(store).or_insert_with(|| Arc::new(BTreeMap::new()));
            let map = Arc::make_mut(entry);
            match staged {
                Some(value) => {
                    map.insert(key, value);
                }
                None => {
                    map.remove(&key);
                }
            }
        }
        *self.env.state.write() = Arc::new(next);

        self.finish();
        Ok(())
    }

    /// Discard every staged write and release the writer lock.
    pub fn abort(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.alive.store(false, Ordering::Release);
            self.env.writer.release();
        }
    }
}

impl Drop for WriteTxn {
    fn drop(&mut self) {
        // A dropped transaction aborts: the lock must never stay held
        self.finish();
    }
}
