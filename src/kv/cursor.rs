//! Ordered cursors
//!
//! A cursor is a lazy sequence of (key, value) pairs in byte-lexicographic
//! order, walking up or down from a start position. It is bound to the
//! transaction that opened it: once that transaction ends, `next()` fails
//! with `UseAfterClose`. Restarting means opening a new cursor.
//!
//! A write transaction's cursor sees the snapshot merged with the writes
//! staged before the cursor was opened. The merge is lazy: both sides are
//! range-scanned per step, never materialized into one map.
//!
//! Dropping a cursor releases everything it holds; there is nothing else
//! to clean up.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{Result, StoreError};

use super::env::StoreMap;

/// Staged writes of one store: `Some` is a put, `None` a delete.
pub(crate) type Overlay = BTreeMap<Vec<u8>, Option<Bytes>>;

/// Cursor scan direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Keys at or after the start key, ascending
    Ascending,
    /// Keys at or before the start key, descending
    Descending,
}

enum Position {
    /// Not yet advanced; the start key itself is a candidate
    Start(Vec<u8>),
    /// Last key considered
    After(Vec<u8>),
    /// Exhausted
    Done,
}

/// The next entry of `map` relative to `position`, in `direction`.
fn bounded_next<'a, V>(
    map: &'a BTreeMap<Vec<u8>, V>,
    position: &Position,
    direction: Direction,
) -> Option<(&'a Vec<u8>, &'a V)> {
    match (position, direction) {
        (Position::Done, _) => None,
        (Position::Start(key), Direction::Ascending) => map
            .range::<[u8], _>((Included(key.as_slice()), Unbounded))
            .next(),
        (Position::After(key), Direction::Ascending) => map
            .range::<[u8], _>((Excluded(key.as_slice()), Unbounded))
            .next(),
        (Position::Start(key), Direction::Descending) => map
            .range::<[u8], _>((Unbounded, Included(key.as_slice())))
            .next_back(),
        (Position::After(key), Direction::Descending) => map
            .range::<[u8], _>((Unbounded, Excluded(key.as_slice())))
            .next_back(),
    }
}

/// Lazy ordered iteration over one named store.
pub struct Cursor {
    map: Arc<StoreMap>,
    overlay: Arc<Overlay>,
    txn_alive: Arc<AtomicBool>,
    direction: Direction,
    position: Position,
}

impl Cursor {
    pub(crate) fn new(
        map: Arc<StoreMap>,
        overlay: Arc<Overlay>,
        txn_alive: Arc<AtomicBool>,
        start_key: Vec<u8>,
        direction: Direction,
    ) -> Self {
        Self {
            map,
            overlay,
            txn_alive,
            direction,
            position: Position::Start(start_key),
        }
    }

    /// Advance to the next entry.
    ///
    /// Returns `Ok(None)` when the sequence is exhausted and
    /// `Err(UseAfterClose)` if the owning transaction has ended.
    pub fn next(&mut self) -> Result<Option<(Vec<u8>, Bytes)>> {
        if !self.txn_alive.load(Ordering::Acquire) {
            return Err(StoreError::UseAfterClose);
        }

        loop {
            let base = bounded_next(&self.map, &self.position, self.direction);
            let staged = bounded_next(&self.overlay, &self.position, self.direction);

            // Nearest key wins; on a tie the overlay shadows the snapshot
            let chosen: Option<(Vec<u8>, Option<Bytes>)> = match (base, staged) {
                (None, None) => None,
                (Some((key, value)), None) => Some((key.clone(), Some(value.clone()))),
                (None, Some((key, staged))) => Some((key.clone(), staged.clone())),
                (Some((base_key, value)), Some((staged_key, staged))) => {
                    let staged_first = match self.direction {
                        Direction::Ascending => staged_key <= base_key,
                        Direction::Descending => staged_key >= base_key,
                    };
                    if staged_first {
                        Some((staged_key.clone(), staged.clone()))
                    } else {
                        Some((base_key.clone(), Some(value.clone())))
                    }
                }
            };

            match chosen {
                None => {
                    self.position = Position::Done;
                    return Ok(None);
                }
                Some((key, Some(value))) => {
                    self.position = Position::After(key.clone());
                    return Ok(Some((key, value)));
                }
                // Staged deletion: skip the key on both sides
                Some((key, None)) => {
                    self.position = Position::After(key);
                }
            }
        }
    }
}
