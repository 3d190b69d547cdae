//! Multi-volume stream store
//!
//! Streams are immutable once written: created through a write handle,
//! made visible atomically at close, then only read, searched, and
//! eventually deleted. See [`store`] for the on-disk layout and
//! lifecycle, [`volume`] for placement.

mod meta;
mod store;
mod volume;

pub use meta::{FindStreamCriteria, MetaMap, StreamMeta, StreamStatus};
pub use store::{StreamSource, StreamStore, StreamTarget};
pub use volume::Volume;
