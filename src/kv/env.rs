//! Key/Value environment
//!
//! The engine entry point: owns the mapped log, the published snapshot, and
//! the writer lock.
//!
//! ## Concurrency Model: Single-Writer / Multiple-Reader
//!
//! - **Write transactions**: serialized by an explicit per-environment lock
//!   (Mutex + Condvar). A waiting writer suspends — it never spins — and
//!   gives up with `StoreBusy` after the configured timeout.
//! - **Read transactions**: grab an `Arc` of the current snapshot and never
//!   take the writer lock. They cannot block a writer and a writer cannot
//!   block them.
//!
//! Commit publishes a new snapshot by swapping the `Arc`, so readers opened
//! before a commit keep seeing the old state (snapshot isolation).

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::info;

use crate::error::{Result, StoreError};

use super::log::{Log, REC_CATALOG, REC_DELETE, REC_PUT};
use super::txn::{ReadTxn, WriteTxn};

/// Identifier of a named store within an environment
pub type StoreId = u32;

/// Ordered contents of one named store
pub(crate) type StoreMap = BTreeMap<Vec<u8>, Bytes>;

/// Options for opening an environment
#[derive(Debug, Clone)]
pub struct EnvOptions {
    /// Fixed size of the mapped region (in bytes)
    pub max_size: u64,

    /// Maximum number of named stores
    pub max_named_stores: usize,

    /// How long `begin_write` waits for the writer lock
    pub lock_timeout: Duration,
}

impl Default for EnvOptions {
    fn default() -> Self {
        Self {
            max_size: 64 * 1024 * 1024,
            max_named_stores: 64,
            lock_timeout: Duration::from_secs(30),
        }
    }
}

/// Immutable view of the whole environment at one commit point
#[derive(Default, Clone)]
pub(crate) struct Snapshot {
    /// Named store contents, keyed by store id
    pub stores: HashMap<StoreId, Arc<StoreMap>>,

    /// Persisted name → id interning table
    pub catalog: HashMap<String, StoreId>,
}

/// Explicit writer lock: one write transaction at a time, waiters suspend.
pub(crate) struct WriterLock {
    busy: Mutex<bool>,
    cv: Condvar,
}

impl WriterLock {
    fn new() -> Self {
        Self {
            busy: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    pub fn acquire(&self, timeout: Duration) -> Result<()> {
        let mut busy = self.busy.lock();
        while *busy {
            if self.cv.wait_for(&mut busy, timeout).timed_out() {
                return Err(StoreError::StoreBusy(format!(
                    "writer lock not released within {:?}",
                    timeout
                )));
            }
        }
        *busy = true;
        Ok(())
    }

    pub fn release(&self) {
        *self.busy.lock() = false;
        self.cv.notify_one();
    }
}

pub(crate) struct EnvInner {
    pub path: PathBuf,
    pub log: Mutex<Log>,
    pub state: RwLock<Arc<Snapshot>>,
    pub writer: WriterLock,
    pub opts: EnvOptions,
}

/// A transactional, memory-mapped key/value environment.
///
/// Cheap to clone; all clones share the same region.
#[derive(Clone)]
pub struct KvEnv {
    pub(crate) inner: Arc<EnvInner>,
}

impl KvEnv {
    /// Open or create the environment backing file.
    ///
    /// Fails with `StoreInit` if the region cannot be created, sized, or
    /// mapped, or if its committed contents fail checksum verification.
    pub fn open(path: &Path, opts: EnvOptions) -> Result<Self> {
        let (log, records) = Log::open(path, opts.max_size)?;

        // Rebuild the in-memory indexes from the committed record history
        let mut catalog: HashMap<String, StoreId> = HashMap::new();
        let mut stores: HashMap<StoreId, StoreMap> = HashMap::new();
        let replayed = records.len();

        for record in records {
            match record.kind {
                REC_CATALOG => {
                    let name = String::from_utf8(record.key).map_err(|_| {
                        StoreError::StoreInit("catalog entry is not valid UTF-8".to_string())
                    })?;
                    let id_bytes: [u8; 4] = record.value.as_slice().try_into().map_err(|_| {
                        StoreError::StoreInit("catalog entry has malformed id".to_string())
                    })?;
                    catalog.insert(name, u32::from_be_bytes(id_bytes));
                }
                REC_PUT => {
                    stores
                        .entry(record.store)
                        .or_default()
                        .insert(record.key, Bytes::from(record.value));
                }
                REC_DELETE => {
                    if let Some(map) = stores.get_mut(&record.store) {
                        map.remove(&record.key);
                    }
                }
                _ => unreachable!("record kind validated during replay"),
            }
        }

        if replayed > 0 {
            info!(
                path = %path.display(),
                records = replayed,
                stores = catalog.len(),
                "replayed key/value region"
            );
        }

        let snapshot = Snapshot {
            stores: stores.into_iter().map(|(id, m)| (id, Arc::new(m))).collect(),
            catalog,
        };

        Ok(Self {
            inner: Arc::new(EnvInner {
                path: path.to_path_buf(),
                log: Mutex::new(log),
                state: RwLock::new(Arc::new(snapshot)),
                writer: WriterLock::new(),
                opts,
            }),
        })
    }

    /// Resolve a named store, creating and persisting it on first use.
    pub fn open_store(&self, name: &str) -> Result<StoreId> {
        if let Some(&id) = self.inner.state.read().catalog.get(name) {
            return Ok(id);
        }

        let mut txn = self.begin_write()?;

        // Another writer may have created it while we waited for the lock
        if let Some(&id) = txn.catalog().get(name) {
            return Ok(id);
        }

        let id = txn.catalog().len() as StoreId;
        if id as usize >= self.inner.opts.max_named_stores {
            return Err(StoreError::StoreCapacity(format!(
                "named store limit {} reached",
                self.inner.opts.max_named_stores
            )));
        }

        txn.register_store(name, id);
        txn.commit()?;
        Ok(id)
    }

    /// Begin a read transaction: a consistent snapshot, never blocks.
    pub fn begin_read(&self) -> ReadTxn {
        ReadTxn::new(self.inner.state.read().clone())
    }

    /// Begin a write transaction.
    ///
    /// Blocks (suspended, not spinning) until the previous writer commits
    /// or aborts; fails with `StoreBusy` after the configured timeout.
    pub fn begin_write(&self) -> Result<WriteTxn> {
        self.inner.writer.acquire(self.inner.opts.lock_timeout)?;
        let snapshot = self.inner.state.read().clone();
        Ok(WriteTxn::new(
            Arc::clone(&self.inner),
            snapshot,
            Arc::new(AtomicBool::new(true)),
        ))
    }

    /// (used bytes, capacity) of the backing region
    pub fn usage(&self) -> (u64, u64) {
        let log = self.inner.log.lock();
        (log.used(), log.capacity())
    }

    /// Path of the backing region file
    pub fn path(&self) -> &Path {
        &self.inner.path
    }
}
