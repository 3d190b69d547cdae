//! Memory-mapped record log
//!
//! The engine persists everything in one fixed-size, memory-mapped region.
//! Layout:
//!
//! ```text
//! ┌──────────┬─────────────┬──────────┬──────────────┬─────────────────────┐
//! │ Magic(4) │ Version(2)  │ Pad (2)  │ Head (8)     │  Records ...        │
//! └──────────┴─────────────┴──────────┴──────────────┴─────────────────────┘
//! ```
//!
//! `Head` is the durable commit point: bytes past it are garbage from a
//! torn write and are never replayed. Each record carries a CRC32 so a
//! corrupt region is detected at open time rather than served.
//!
//! Record format (all integers big-endian):
//!
//! ```text
//! ┌──────────┬─────────┬────────────┬────────────┬─────┬───────┬─────────┐
//! │ Store(4) │ Kind(1) │ KeyLen(4)  │ ValLen(4)  │ Key │ Value │ CRC(4)  │
//! └──────────┴─────────┴────────────┴────────────┴─────┴───────┴─────────┘
//! ```

use std::fs::OpenOptions;
use std::path::Path;

use memmap2::MmapMut;

use crate::error::{Result, StoreError};

/// File magic: "SVKV"
pub(crate) const MAGIC: &[u8; 4] = b"SVKV";

/// Region format version
pub(crate) const VERSION: u16 = 1;

/// Header size: magic + version + padding + head pointer
pub(crate) const HEADER_SIZE: u64 = 16;

/// Byte offset of the durable head pointer within the header
const HEAD_OFFSET: usize = 8;

/// Fixed part of a record: store(4) + kind(1) + key_len(4) + val_len(4)
const RECORD_FIXED: usize = 13;

// Record kinds
pub(crate) const REC_PUT: u8 = 1;
pub(crate) const REC_DELETE: u8 = 2;
pub(crate) const REC_CATALOG: u8 = 3;

/// A single durable log record.
pub(crate) struct Record {
    pub store: u32,
    pub kind: u8,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Record {
    pub fn encoded_len(&self) -> u64 {
        (RECORD_FIXED + self.key.len() + self.value.len() + 4) as u64
    }

    /// Write this record into `buf` at `pos`, returning the position after
    /// the trailing CRC. The caller has already checked capacity.
    fn write_to(&self, buf: &mut [u8], pos: usize) -> usize {
        let body_end = pos + RECORD_FIXED + self.key.len() + self.value.len();

        buf[pos..pos + 4].copy_from_slice(&self.store.to_be_bytes());
        buf[pos + 4] = self.kind;
        buf[pos + 5..pos + 9].copy_from_slice(&(self.key.len() as u32).to_be_bytes());
        buf[pos + 9..pos + 13].copy_from_slice(&(self.value.len() as u32).to_be_bytes());

        let key_start = pos + RECORD_FIXED;
        buf[key_start..key_start + self.key.len()].copy_from_slice(&self.key);
        let val_start = key_start + self.key.len();
        buf[val_start..body_end].copy_from_slice(&self.value);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&buf[pos..body_end]);
        let crc = hasher.finalize();
        buf[body_end..body_end + 4].copy_from_slice(&crc.to_be_bytes());

        body_end + 4
    }

    /// Parse one record at `pos`, bounded by `limit` (the durable head).
    fn read_from(buf: &[u8], pos: usize, limit: usize) -> Result<(Record, usize)> {
        if pos + RECORD_FIXED > limit {
            return Err(StoreError::StoreInit(format!(
                "truncated record header at offset {}",
                pos
            )));
        }

        let store = u32::from_be_bytes(buf[pos..pos + 4].try_into().unwrap());
        let kind = buf[pos + 4];
        let key_len = u32::from_be_bytes(buf[pos + 5..pos + 9].try_into().unwrap()) as usize;
        let val_len = u32::from_be_bytes(buf[pos + 9..pos + 13].try_into().unwrap()) as usize;

        if !(REC_PUT..=REC_CATALOG).contains(&kind) {
            return Err(StoreError::StoreInit(format!(
                "unknown record kind {} at offset {}",
                kind, pos
            )));
        }

        let body_end = pos + RECORD_FIXED + key_len + val_len;
        if body_end + 4 > limit {
            return Err(StoreError::StoreInit(format!(
                "truncated record body at offset {}",
                pos
            )));
        }

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&buf[pos..body_end]);
        let expected = hasher.finalize();
        let stored = u32::from_be_bytes(buf[body_end..body_end + 4].try_into().unwrap());
        if expected != stored {
            return Err(StoreError::StoreInit(format!(
                "record checksum mismatch at offset {}",
                pos
            )));
        }

        let key_start = pos + RECORD_FIXED;
        let record = Record {
            store,
            kind,
            key: buf[key_start..key_start + key_len].to_vec(),
            value: buf[key_start + key_len..body_end].to_vec(),
        };

        Ok((record, body_end + 4))
    }
}

/// The mapped region plus its durable head.
pub(crate) struct Log {
    mmap: MmapMut,
    head: u64,
    capacity: u64,
}

impl Log {
    /// Open or create the region at `path`, sized to exactly `max_size`.
    ///
    /// Returns the log and every committed record, in write order, for
    /// index replay.
    pub fn open(path: &Path, max_size: u64) -> Result<(Self, Vec<Record>)> {
        if max_size < HEADER_SIZE + 64 {
            return Err(StoreError::StoreInit(format!(
                "region size {} is too small",
                max_size
            )));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|e| StoreError::StoreInit(format!("cannot open {}: {}", path.display(), e)))?;

        let len = file
            .metadata()
            .map_err(|e| StoreError::StoreInit(format!("cannot stat {}: {}", path.display(), e)))?
            .len();

        let fresh = len == 0;
        if fresh {
            file.set_len(max_size).map_err(|e| {
                StoreError::StoreInit(format!("cannot size {}: {}", path.display(), e))
            })?;
        } else if len != max_size {
            return Err(StoreError::StoreInit(format!(
                "existing region is {} bytes, expected {}",
                len, max_size
            )));
        }

        let mut mmap = unsafe { MmapMut::map_mut(&file) }
            .map_err(|e| StoreError::StoreInit(format!("mmap failed: {}", e)))?;

        let head = if fresh {
            mmap[0..4].copy_from_slice(MAGIC);
            mmap[4..6].copy_from_slice(&VERSION.to_be_bytes());
            mmap[6..8].copy_from_slice(&[0u8; 2]);
            mmap[HEAD_OFFSET..HEAD_OFFSET + 8].copy_from_slice(&HEADER_SIZE.to_be_bytes());
            mmap.flush_range(0, HEADER_SIZE as usize)
                .map_err(|e| StoreError::StoreInit(format!("header flush failed: {}", e)))?;
            HEADER_SIZE
        } else {
            if &mmap[0..4] != MAGIC {
                return Err(StoreError::StoreInit(format!(
                    "bad magic in {}",
                    path.display()
                )));
            }
            let version = u16::from_be_bytes(mmap[4..6].try_into().unwrap());
            if version != VERSION {
                return Err(StoreError::StoreInit(format!(
                    "unsupported region version {}",
                    version
                )));
            }
            let head = u64::from_be_bytes(mmap[HEAD_OFFSET..HEAD_OFFSET + 8].try_into().unwrap());
            if head < HEADER_SIZE || head > max_size {
                return Err(StoreError::StoreInit(format!(
                    "corrupt head pointer {}",
                    head
                )));
            }
            head
        };

        // Replay: everything below head is committed and CRC-checked
        let mut records = Vec::new();
        let mut pos = HEADER_SIZE as usize;
        let limit = head as usize;
        while pos < limit {
            let (record, next) = Record::read_from(&mmap, pos, limit)?;
            records.push(record);
            pos = next;
        }

        Ok((
            Self {
                mmap,
                head,
                capacity: max_size,
            },
            records,
        ))
    }

    /// Append a batch of records atomically.
    ///
    /// Records are written and flushed first; only then is the head pointer
    /// advanced and flushed. A crash in between leaves the old head, so the
    /// partial batch is invisible on replay.
    pub fn append_all(&mut self, records: &[Record]) -> Result<()> {
        let total: u64 = records.iter().map(Record::encoded_len).sum();
        if self.head + total > self.capacity {
            return Err(StoreError::StoreCapacity(format!(
                "region full: batch needs {} bytes, {} free",
                total,
                self.capacity - self.head
            )));
        }

        let start = self.head as usize;
        let mut pos = start;
        for record in records {
            pos = record.write_to(&mut self.mmap, pos);
        }

        self.mmap
            .flush_range(start, pos - start)
            .map_err(|e| StoreError::StoreIo(format!("record flush failed: {}", e)))?;

        let new_head = pos as u64;
        self.mmap[HEAD_OFFSET..HEAD_OFFSET + 8].copy_from_slice(&new_head.to_be_bytes());
        self.mmap
            .flush_range(HEAD_OFFSET, 8)
            .map_err(|e| StoreError::StoreIo(format!("head flush failed: {}", e)))?;

        self.head = new_head;
        Ok(())
    }

    /// Bytes written so far (including the header)
    pub fn used(&self) -> u64 {
        self.head
    }

    /// Total region size
    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}
