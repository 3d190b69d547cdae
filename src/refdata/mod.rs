//! Reference data store
//!
//! Effective-time versioned lookup tables used to enrich records during
//! pipeline processing. Built on the [`crate::kv`] engine with composite
//! encoded keys; see [`key`] for the layout and [`store`] for the
//! versioning policy.

mod key;
mod store;

pub use store::{RefDataEntry, ReferenceDataStore};
