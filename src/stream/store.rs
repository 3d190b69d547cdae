//! File-system stream store
//!
//! Persists ingested streams across one or more volumes and answers
//! criteria-based metadata searches without touching stream content.
//!
//! ## Layout
//!
//! Each stream occupies two files under its volume:
//!
//! ```text
//! {volume}/{feed}/{yyyy}/{mm}/{dd}/
//!   ├── {id}.dat    stream content
//!   └── {id}.meta   bincode manifest (header map, footer, size, status)
//! ```
//!
//! The manifest is written only when a stream is closed. A stream without
//! a manifest is incomplete: it never appears in search results and its
//! content file is removed when the write handle goes away. That is the
//! whole "no partial streams" story — there is no journal to replay.
//!
//! ## Lifecycle
//!
//! ```text
//! Creating ──close──▶ Unlocked ──read──▶ Locked ──release──▶ Unlocked
//!     │                  │
//!   abort             delete ──▶ Deleted ──sweep──▶ gone
//! ```
//!
//! Deletion is logical; physical removal happens in a separate, idempotent
//! sweep that is safe to retry.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crossbeam::queue::SegQueue;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, StoreError};

use super::meta::{FindStreamCriteria, MetaMap, StreamMeta, StreamStatus};
use super::volume::{stream_rel_dir, Volume, VolumeSelector};

/// Persisted per-stream manifest
#[derive(Serialize, Deserialize)]
struct StreamManifest {
    meta: StreamMeta,
    rel_dir: String,
}

/// Where a stream's files live
#[derive(Clone)]
struct Location {
    volume: usize,
    rel_dir: String,
}

struct StoreInner {
    volumes: Vec<Volume>,
    /// Bytes per volume, counting in-flight writes as well as closed streams
    used: Vec<AtomicU64>,
    selector: VolumeSelector,
    /// Metadata of every complete stream, by id
    registry: RwLock<HashMap<u64, StreamMeta>>,
    locations: RwLock<HashMap<u64, Location>>,
    /// Reader use counts; a stream is Locked while its count is > 0
    locks: Mutex<HashMap<u64, usize>>,
    /// Ids awaiting physical removal
    pending_sweep: SegQueue<u64>,
    next_id: AtomicU64,
}

/// Multi-volume stream store. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct StreamStore {
    inner: Arc<StoreInner>,
}

impl StreamStore {
    /// Open the store: create volume roots and recover stream metadata
    /// from the manifests found on disk.
    pub fn open(config: &Config) -> Result<Self> {
        if config.volumes.is_empty() {
            return Err(StoreError::Create("no volumes configured".to_string()));
        }

        let mut registry = HashMap::new();
        let mut locations = HashMap::new();
        let used: Vec<AtomicU64> = config.volumes.iter().map(|_| AtomicU64::new(0)).collect();
        let pending_sweep = SegQueue::new();
        let mut max_id = 0u64;

        for (volume_idx, volume) in config.volumes.iter().enumerate() {
            fs::create_dir_all(&volume.root)?;
            scan_volume(
                &volume.root,
                volume_idx,
                &mut registry,
                &mut locations,
                &used[volume_idx],
                &pending_sweep,
                &mut max_id,
            )?;
        }

        info!(
            volumes = config.volumes.len(),
            streams = registry.len(),
            "opened stream store"
        );

        Ok(Self {
            inner: Arc::new(StoreInner {
                volumes: config.volumes.clone(),
                used,
                selector: VolumeSelector::from_strategy(config.strategy),
                registry: RwLock::new(registry),
                locations: RwLock::new(locations),
                locks: Mutex::new(HashMap::new()),
                pending_sweep,
                next_id: AtomicU64::new(max_id + 1),
            }),
        })
    }

    /// Create a new stream and return its write handle.
    ///
    /// The stream stays invisible until [`StreamTarget::close`]; any I/O
    /// failure during creation removes whatever was written.
    pub fn create_stream(
        &self,
        feed: &str,
        stream_type: &str,
        meta_map: MetaMap,
    ) -> Result<StreamTarget> {
        if feed.is_empty() {
            return Err(StoreError::Create("empty feed name".to_string()));
        }

        let volume_idx = self
            .inner
            .selector
            .select(&self.inner.volumes, &self.inner.used)?;
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let create_time_ms = now_ms();

        let rel_dir = stream_rel_dir(feed, create_time_ms);
        let dir = self.inner.volumes[volume_idx].root.join(&rel_dir);
        fs::create_dir_all(&dir)
            .map_err(|e| StoreError::Create(format!("cannot create {}: {}", dir.display(), e)))?;

        let data_path = dir.join(format!("{}.dat", id));
        let file = File::create(&data_path)
            .map_err(|e| StoreError::Create(format!("cannot create {}: {}", data_path.display(), e)))?;

        debug!(stream = id, feed, volume = volume_idx, "creating stream");

        Ok(StreamTarget {
            store: Arc::clone(&self.inner),
            id,
            feed: feed.to_string(),
            stream_type: stream_type.to_string(),
            create_time_ms,
            meta_map,
            footer: None,
            writer: BufWriter::new(file),
            bytes_written: 0,
            volume_idx,
            rel_dir,
            data_path,
            finished: false,
        })
    }

    /// Open a stream for reading, transitioning it to `Locked`.
    ///
    /// Returns `Ok(None)` for an unknown or deleted stream. Concurrent
    /// readers are allowed; the stream returns to `Unlocked` when the
    /// last reader drops its handle.
    pub fn open_stream_for_read(&self, id: u64) -> Result<Option<StreamSource>> {
        let meta = match self.inner.registry.read().get(&id) {
            Some(meta) if meta.status != StreamStatus::Deleted => meta.clone(),
            _ => return Ok(None),
        };

        let location = match self.inner.locations.read().get(&id) {
            Some(loc) => loc.clone(),
            None => return Ok(None),
        };

        let data_path = self.data_path(&location, id);
        let file = File::open(&data_path)?;

        // Lock only after the file is open, so a failed open leaks nothing
        {
            let mut locks = self.inner.locks.lock();
            *locks.entry(id).or_insert(0) += 1;
            if let Some(entry) = self.inner.registry.write().get_mut(&id) {
                entry.status = StreamStatus::Locked;
            }
        }

        let mut meta = meta;
        meta.status = StreamStatus::Locked;

        Ok(Some(StreamSource {
            store: Arc::clone(&self.inner),
            id,
            meta,
            reader: BufReader::new(file),
        }))
    }

    /// Find stream metadata matching `criteria`; never reads content.
    pub fn find_meta(&self, criteria: &FindStreamCriteria) -> Vec<StreamMeta> {
        let registry = self.inner.registry.read();
        let mut found: Vec<StreamMeta> = registry
            .values()
            .filter(|meta| criteria.matches(meta))
            .cloned()
            .collect();
        found.sort_by_key(|meta| meta.id);
        found
    }

    /// Logically delete a stream.
    ///
    /// Fails with `StreamLocked` while the stream is in use. Returns
    /// `Ok(false)` if the stream is unknown or already deleted. Physical
    /// removal is deferred to [`sweep`](Self::sweep).
    pub fn delete_stream(&self, id: u64) -> Result<bool> {
        let locks = self.inner.locks.lock();
        if locks.get(&id).copied().unwrap_or(0) > 0 {
            return Err(StoreError::StreamLocked(id));
        }

        let mut registry = self.inner.registry.write();
        let meta = match registry.get_mut(&id) {
            Some(meta) if meta.status != StreamStatus::Deleted => meta,
            _ => return Ok(false),
        };
        meta.status = StreamStatus::Deleted;
        let manifest = StreamManifest {
            meta: meta.clone(),
            rel_dir: String::new(), // filled below from the location table
        };
        drop(registry);
        drop(locks);

        // Persist the Deleted status so a restart re-enqueues the sweep
        if let Some(location) = self.inner.locations.read().get(&id) {
            let manifest = StreamManifest {
                rel_dir: location.rel_dir.clone(),
                ..manifest
            };
            let bytes = bincode::serialize(&manifest)
                .map_err(|e| StoreError::StoreIo(format!("manifest encode failed: {}", e)))?;
            fs::write(self.meta_path(location, id), bytes)?;
        }

        self.inner.pending_sweep.push(id);
        info!(stream = id, "stream marked deleted");
        Ok(true)
    }

    /// Physically remove deleted streams. Idempotent and safe to retry:
    /// files already gone are fine, and a hard failure re-queues the id.
    pub fn sweep(&self) -> Result<usize> {
        let mut removed = 0;
        while let Some(id) = self.inner.pending_sweep.pop() {
            let location = match self.inner.locations.read().get(&id) {
                Some(loc) => loc.clone(),
                None => continue, // already swept
            };

            let result = remove_if_exists(&self.data_path(&location, id))
                .and_then(|_| remove_if_exists(&self.meta_path(&location, id)));
            if let Err(e) = result {
                self.inner.pending_sweep.push(id);
                return Err(StoreError::Io(e));
            }

            if let Some(meta) = self.inner.registry.write().remove(&id) {
                self.inner.used[location.volume].fetch_sub(meta.size, Ordering::Relaxed);
            }
            self.inner.locations.write().remove(&id);
            removed += 1;
        }

        if removed > 0 {
            info!(removed, "swept deleted streams");
        }
        Ok(removed)
    }

    /// Number of streams known to the store (including deleted, unswept)
    pub fn stream_count(&self) -> usize {
        self.inner.registry.read().len()
    }

    /// Streams waiting for physical removal
    pub fn pending_sweep_count(&self) -> usize {
        self.inner.pending_sweep.len()
    }

    fn data_path(&self, location: &Location, id: u64) -> PathBuf {
        self.inner.volumes[location.volume]
            .root
            .join(&location.rel_dir)
            .join(format!("{}.dat", id))
    }

    fn meta_path(&self, location: &Location, id: u64) -> PathBuf {
        self.inner.volumes[location.volume]
            .root
            .join(&location.rel_dir)
            .join(format!("{}.meta", id))
    }
}

// =============================================================================
// Write handle
// =============================================================================

/// Append handle for a stream being created.
///
/// Call [`close`](Self::close) to make the stream visible; dropping the
/// handle without closing discards it completely.
pub struct StreamTarget {
    store: Arc<StoreInner>,
    id: u64,
    feed: String,
    stream_type: String,
    create_time_ms: u64,
    meta_map: MetaMap,
    footer: Option<MetaMap>,
    writer: BufWriter<File>,
    bytes_written: u64,
    volume_idx: usize,
    rel_dir: String,
    data_path: PathBuf,
    finished: bool,
}

impl StreamTarget {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Append content bytes
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.writer.write_all(buf)?;
        self.bytes_written += buf.len() as u64;
        // Count against the volume as written, so capacity checks see
        // in-flight streams, not just closed ones
        self.store.used[self.volume_idx].fetch_add(buf.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Attach a footer map, written into the manifest at close
    pub fn set_footer(&mut self, footer: MetaMap) {
        self.footer = Some(footer);
    }

    /// Finish the stream: sync content, persist the manifest, register
    /// the stream as `Unlocked`.
    pub fn close(mut self) -> Result<StreamMeta> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;

        let meta = StreamMeta {
            id: self.id,
            feed: self.feed.clone(),
            stream_type: self.stream_type.clone(),
            create_time_ms: self.create_time_ms,
            size: self.bytes_written,
            status: StreamStatus::Unlocked,
            meta_map: self.meta_map.clone(),
            footer: self.footer.clone(),
        };

        let manifest = StreamManifest {
            meta: meta.clone(),
            rel_dir: self.rel_dir.clone(),
        };
        let bytes = bincode::serialize(&manifest)
            .map_err(|e| StoreError::StoreIo(format!("manifest encode failed: {}", e)))?;
        fs::write(self.data_path.with_extension("meta"), bytes)?;

        self.store.registry.write().insert(self.id, meta.clone());
        self.store.locations.write().insert(
            self.id,
            Location {
                volume: self.volume_idx,
                rel_dir: self.rel_dir.clone(),
            },
        );
        self.finished = true;
        info!(stream = self.id, feed = %self.feed, size = self.bytes_written, "closed stream");
        Ok(meta)
    }

    /// Discard the stream: nothing was or will be visible.
    pub fn abort(mut self) {
        self.cleanup();
    }

    fn cleanup(&mut self) {
        if !self.finished {
            self.finished = true;
            self.store.used[self.volume_idx].fetch_sub(self.bytes_written, Ordering::Relaxed);
            let _ = fs::remove_file(&self.data_path);
            let _ = fs::remove_file(self.data_path.with_extension("meta"));
        }
    }
}

impl Drop for StreamTarget {
    fn drop(&mut self) {
        if !self.finished {
            warn!(stream = self.id, "stream handle dropped before close, discarding");
            self.cleanup();
        }
    }
}

// =============================================================================
// Read handle
// =============================================================================

/// Read handle for a stored stream; holds the stream `Locked` while alive.
pub struct StreamSource {
    store: Arc<StoreInner>,
    id: u64,
    meta: StreamMeta,
    reader: BufReader<File>,
}

impl StreamSource {
    /// Header metadata, including the verbatim sender-supplied map
    pub fn meta(&self) -> &StreamMeta {
        &self.meta
    }
}

impl Read for StreamSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Drop for StreamSource {
    fn drop(&mut self) {
        let mut locks = self.store.locks.lock();
        let remaining = match locks.get_mut(&self.id) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            locks.remove(&self.id);
            if let Some(entry) = self.store.registry.write().get_mut(&self.id) {
                if entry.status == StreamStatus::Locked {
                    entry.status = StreamStatus::Unlocked;
                }
            }
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Recursively collect manifests under one volume root.
#[allow(clippy::too_many_arguments)]
fn scan_volume(
    dir: &Path,
    volume_idx: usize,
    registry: &mut HashMap<u64, StreamMeta>,
    locations: &mut HashMap<u64, Location>,
    used: &AtomicU64,
    pending_sweep: &SegQueue<u64>,
    max_id: &mut u64,
) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            scan_volume(
                &path,
                volume_idx,
                registry,
                locations,
                used,
                pending_sweep,
                max_id,
            )?;
            continue;
        }

        if path.extension().and_then(|e| e.to_str()) != Some("meta") {
            continue;
        }

        let bytes = fs::read(&path)?;
        let manifest: StreamManifest = match bincode::deserialize(&bytes) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping corrupt stream manifest");
                continue;
            }
        };

        let id = manifest.meta.id;
        *max_id = (*max_id).max(id);
        used.fetch_add(manifest.meta.size, Ordering::Relaxed);
        if manifest.meta.status == StreamStatus::Deleted {
            pending_sweep.push(id);
        }
        locations.insert(
            id,
            Location {
                volume: volume_idx,
                rel_dir: manifest.rel_dir,
            },
        );
        registry.insert(id, manifest.meta);
    }
    Ok(())
}
