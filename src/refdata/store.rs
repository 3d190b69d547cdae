//! Reference data store
//!
//! Domain layer over the key/value engine: (map name, key, effective time)
//! lookups against bulk-loaded lookup tables.
//!
//! ## Versioning policy
//!
//! Each entry is stored verbatim under (map, key, effective_from). Distinct
//! effective-from values coexist; a lookup walks a descending cursor from
//! (map, key, at_time) and takes the newest entry whose effective-from is
//! at or before the probe time. Re-loading an existing (map, key,
//! effective_from) replaces the stored entry entirely — including its
//! effective-to — so the last load wins and no interval merging ever
//! happens. Pipelines rely on that load-order override behavior.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::codec::Serde;
use crate::error::{Result, StoreError};
use crate::kv::{Direction, KvEnv, StoreId};

use super::key;

/// Named store holding the map-name interning table
const NAMES_STORE: &str = "ref_map_names";

/// Named store holding every reference entry, keyed by composite key
const ENTRIES_STORE: &str = "ref_entries";

/// One entry of a bulk load batch
#[derive(Debug, Clone)]
pub struct RefDataEntry {
    pub key: Vec<u8>,
    /// Inclusive start of the validity range (epoch milliseconds)
    pub effective_from: u64,
    /// Exclusive end of the validity range (epoch milliseconds)
    pub effective_to: u64,
    pub value: Vec<u8>,
}

/// Decode a persisted map id (4 bytes, big-endian)
fn decode_map_id(raw: &[u8]) -> Result<u32> {
    let id_bytes: [u8; 4] = raw
        .try_into()
        .map_err(|_| StoreError::Encoding("malformed map id".to_string()))?;
    Ok(u32::from_be_bytes(id_bytes))
}

/// Effective-time versioned lookup tables over the key/value engine.
pub struct ReferenceDataStore {
    env: KvEnv,
    names: StoreId,
    entries: StoreId,
    /// In-memory mirror of the persisted interning table
    interned: RwLock<HashMap<String, u32>>,
}

impl ReferenceDataStore {
    /// Open the store, recovering the interning table from the engine.
    pub fn open(env: KvEnv) -> Result<Self> {
        let names = env.open_store(NAMES_STORE)?;
        let entries = env.open_store(ENTRIES_STORE)?;

        let mut interned = HashMap::new();

        let txn = env.begin_read();
        let mut cursor = txn.cursor(names, &[], Direction::Ascending);
        while let Some((raw_name, raw_id)) = cursor.next()? {
            let name = String::from_utf8(raw_name).map_err(|_| {
                StoreError::Encoding("map name is not valid UTF-8".to_string())
            })?;
            interned.insert(name, decode_map_id(&raw_id)?);
        }
        drop(cursor);
        txn.close();

        if !interned.is_empty() {
            info!(maps = interned.len(), "recovered reference data maps");
        }

        Ok(Self {
            env,
            names,
            entries,
            interned: RwLock::new(interned),
        })
    }

    /// Bulk-load a batch of entries into `map_name`.
    ///
    /// The whole batch runs in one write transaction: concurrent lookups
    /// see either none of it or all of it, never a partial batch.
    pub fn load(&self, map_name: &str, batch: &[RefDataEntry]) -> Result<()> {
        let mut txn = self.env.begin_write()?;

        // The persisted interning entry is the authority; the cache may
        // trail a load that committed on another thread moments ago
        let map_id = match txn.get(self.names, map_name.as_bytes()) {
            Some(raw) => decode_map_id(&raw)?,
            None => {
                // Allocate from the persisted table, inside the txn, so
                // a failed load leaves no id behind
                let mut max_id: Option<u32> = None;
                let mut cursor = txn.cursor(self.names, &[], Direction::Ascending);
                while let Some((_, raw_id)) = cursor.next()? {
                    let id = decode_map_id(&raw_id)?;
                    max_id = Some(max_id.map_or(id, |m| m.max(id)));
                }
                drop(cursor);

                let id = max_id.map_or(0, |m| m + 1);
                txn.put(self.names, map_name.as_bytes(), &id.to_be_bytes());
                id
            }
        };

        for entry in batch {
            txn.put(
                self.entries,
                &key::encode(map_id, &entry.key, entry.effective_from),
                &key::encode_value(entry.effective_to, &entry.value),
            );
        }

        txn.commit()?;

        // Only committed interning records may enter the cache
        self.interned.write().insert(map_name.to_string(), map_id);

        debug!(map = %map_name, entries = batch.len(), "loaded reference data batch");
        Ok(())
    }

    /// Find the value for `key` in `map_name` that is effective at
    /// `at_time` (epoch milliseconds).
    ///
    /// Returns `Ok(None)` when no entry covers the probe time — the range
    /// is `[from, to)`, so a probe exactly at `to` is not covered. Store
    /// faults surface as `Err`, never as `None`.
    pub fn lookup(&self, map_name: &str, probe_key: &[u8], at_time: u64) -> Result<Option<Bytes>> {
        let map_id = match self.map_id(map_name) {
            Some(id) => id,
            None => return Ok(None),
        };

        let txn = self.env.begin_read();
        let search_key = key::encode(map_id, probe_key, at_time);
        let mut cursor = txn.cursor(self.entries, &search_key, Direction::Descending);

        // The first hit at or below the search key is the newest
        // effective-from <= at_time, if it belongs to this (map, key)
        match cursor.next()? {
            None => Ok(None),
            Some((raw_key, raw_value)) => {
                let decoded = key::decode(&raw_key)?;
                if decoded.map_id != map_id || decoded.key != probe_key {
                    return Ok(None);
                }
                let (effective_to, payload) = key::decode_value(&raw_value)?;
                if effective_to <= at_time {
                    // Newest candidate range has already expired
                    return Ok(None);
                }
                Ok(Some(payload))
            }
        }
    }

    /// Like [`lookup`](Self::lookup), decoding the payload with a codec.
    pub fn lookup_as<T>(
        &self,
        map_name: &str,
        probe_key: &[u8],
        at_time: u64,
        serde: &dyn Serde<T>,
    ) -> Result<Option<T>> {
        match self.lookup(map_name, probe_key, at_time)? {
            Some(payload) => Ok(Some(serde.deserialize(&payload)?)),
            None => Ok(None),
        }
    }

    /// Delete every entry of `map_name`, in one write transaction.
    ///
    /// Safe to run while lookups are in flight: they finish on their own
    /// snapshot. The interning entry survives so a reloaded map keeps its
    /// id. Returns the number of entries removed.
    pub fn purge(&self, map_name: &str) -> Result<usize> {
        let map_id = match self.map_id(map_name) {
            Some(id) => id,
            None => return Ok(0),
        };

        let mut txn = self.env.begin_write()?;
        let prefix = key::map_prefix(map_id);

        let mut doomed = Vec::new();
        let mut cursor = txn.cursor(self.entries, &prefix, Direction::Ascending);
        while let Some((raw_key, _)) = cursor.next()? {
            if !raw_key.starts_with(&prefix) {
                break;
            }
            doomed.push(raw_key);
        }
        drop(cursor);

        for raw_key in &doomed {
            txn.delete(self.entries, raw_key);
        }
        txn.commit()?;

        info!(map = %map_name, entries = doomed.len(), "purged reference data map");
        Ok(doomed.len())
    }

    /// Number of maps ever loaded
    pub fn map_count(&self) -> usize {
        self.interned.read().len()
    }

    fn map_id(&self, map_name: &str) -> Option<u32> {
        self.interned.read().get(map_name).copied()
    }
}
