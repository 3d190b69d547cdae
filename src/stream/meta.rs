//! Stream metadata types
//!
//! `MetaMap` carries arbitrary sender-supplied headers; the store persists
//! and returns it verbatim and never interprets a key. Insertion order is
//! preserved because senders see their headers echoed back.

use serde::{Deserialize, Serialize};

/// Ordered string-to-string header map attached to a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaMap {
    entries: Vec<(String, String)>,
}

impl MetaMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a header, keeping the original position on replace
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Headers in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for MetaMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut map = MetaMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// Lifecycle status of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamStatus {
    /// Complete and idle
    Unlocked,
    /// In use by one or more readers ("in use", not exclusive)
    Locked,
    /// Logically deleted; physical removal happens in a later sweep
    Deleted,
}

impl std::fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamStatus::Unlocked => write!(f, "unlocked"),
            StreamStatus::Locked => write!(f, "locked"),
            StreamStatus::Deleted => write!(f, "deleted"),
        }
    }
}

/// Metadata of one stored stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMeta {
    pub id: u64,
    pub feed: String,
    pub stream_type: String,
    /// Creation time (epoch milliseconds)
    pub create_time_ms: u64,
    /// Content size in bytes
    pub size: u64,
    pub status: StreamStatus,
    /// Sender-supplied header map, verbatim
    pub meta_map: MetaMap,
    /// Optional footer map written at close
    pub footer: Option<MetaMap>,
}

/// Search criteria for [`find_meta`](crate::stream::StreamStore::find_meta).
///
/// All populated fields are ANDed; an empty criteria matches every
/// non-deleted stream.
#[derive(Debug, Clone, Default)]
pub struct FindStreamCriteria {
    /// Match any of these feeds (empty = any feed)
    pub feeds: Vec<String>,
    /// Match any of these stream types (empty = any type)
    pub stream_types: Vec<String>,
    /// Inclusive lower bound on creation time (epoch milliseconds)
    pub created_after_ms: Option<u64>,
    /// Inclusive upper bound on creation time (epoch milliseconds)
    pub created_before_ms: Option<u64>,
    /// Exact status to match; `None` matches everything except `Deleted`
    pub status: Option<StreamStatus>,
}

impl FindStreamCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(mut self, feed: impl Into<String>) -> Self {
        self.feeds.push(feed.into());
        self
    }

    pub fn with_stream_type(mut self, stream_type: impl Into<String>) -> Self {
        self.stream_types.push(stream_type.into());
        self
    }

    pub fn created_between(mut self, after_ms: u64, before_ms: u64) -> Self {
        self.created_after_ms = Some(after_ms);
        self.created_before_ms = Some(before_ms);
        self
    }

    pub fn with_status(mut self, status: StreamStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub(crate) fn matches(&self, meta: &StreamMeta) -> bool {
        if !self.feeds.is_empty() && !self.feeds.iter().any(|f| *f == meta.feed) {
            return false;
        }
        if !self.stream_types.is_empty()
            && !self.stream_types.iter().any(|t| *t == meta.stream_type)
        {
            return false;
        }
        if let Some(after) = self.created_after_ms {
            if meta.create_time_ms < after {
                return false;
            }
        }
        if let Some(before) = self.created_before_ms {
            if meta.create_time_ms > before {
                return false;
            }
        }
        match self.status {
            Some(status) => meta.status == status,
            None => meta.status != StreamStatus::Deleted,
        }
    }
}
