//! Off-heap key/value engine
//!
//! A transactional, memory-mapped key/value store with ordered byte keys:
//!
//! - fixed-size mapped region, CRC-checked record log, durable commit head
//! - named stores interned to small ids, persisted in the region itself
//! - single-writer / multi-reader transactions with snapshot isolation
//! - lazy range cursors in both directions
//!
//! ## Layers
//!
//! - [`log`]: the on-disk format — record framing, checksums, replay
//! - [`env`]: open/recover, named-store catalog, writer lock
//! - [`txn`]: read and write transaction handles
//! - [`cursor`]: ordered iteration bound to a transaction

mod cursor;
mod env;
mod log;
mod txn;

pub use cursor::{Cursor, Direction};
pub use env::{EnvOptions, KvEnv, StoreId};
pub use txn::{ReadTxn, WriteTxn};
