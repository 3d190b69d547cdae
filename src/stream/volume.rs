//! Storage volumes and selection
//!
//! A volume is a directory root holding a subset of streams. Every stream
//! gets a deterministic relative directory derived from its creation date
//! and feed; the globally unique stream id makes the final path
//! collision-free. Once assigned, a stream's volume never changes.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::{Datelike, TimeZone, Utc};

use crate::config::SelectionStrategy;
use crate::error::{Result, StoreError};

/// A physical storage root
#[derive(Debug, Clone)]
pub struct Volume {
    pub root: PathBuf,
    /// Optional byte capacity; `None` means unlimited
    pub capacity_bytes: Option<u64>,
}

impl Volume {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            capacity_bytes: None,
        }
    }

    pub fn with_capacity(root: impl Into<PathBuf>, capacity_bytes: u64) -> Self {
        Self {
            root: root.into(),
            capacity_bytes: Some(capacity_bytes),
        }
    }
}

/// Picks a volume for each new stream.
///
/// One enum, one variant per strategy — strategies carry their own state
/// and must stay safe under concurrent invocation.
#[derive(Debug)]
pub(crate) enum VolumeSelector {
    RoundRobin { next: AtomicUsize },
    LeastFull,
    Fixed { index: usize },
}

impl VolumeSelector {
    pub fn from_strategy(strategy: SelectionStrategy) -> Self {
        match strategy {
            SelectionStrategy::RoundRobin => VolumeSelector::RoundRobin {
                next: AtomicUsize::new(0),
            },
            SelectionStrategy::LeastFull => VolumeSelector::LeastFull,
            SelectionStrategy::Fixed(index) => VolumeSelector::Fixed { index },
        }
    }

    /// Choose a volume index among those with remaining capacity.
    pub fn select(&self, volumes: &[Volume], used: &[AtomicU64]) -> Result<usize> {
        let open: Vec<usize> = (0..volumes.len())
            .filter(|&i| match volumes[i].capacity_bytes {
                Some(cap) => used[i].load(Ordering::Relaxed) < cap,
                None => true,
            })
            .collect();

        if open.is_empty() {
            return Err(StoreError::Create(
                "no volume with remaining capacity".to_string(),
            ));
        }

        match self {
            VolumeSelector::RoundRobin { next } => {
                let n = next.fetch_add(1, Ordering::Relaxed);
                Ok(open[n % open.len()])
            }
            VolumeSelector::LeastFull => {
                let mut best = open[0];
                for &i in &open[1..] {
                    if used[i].load(Ordering::Relaxed) < used[best].load(Ordering::Relaxed) {
                        best = i;
                    }
                }
                Ok(best)
            }
            VolumeSelector::Fixed { index } => {
                if open.contains(index) {
                    Ok(*index)
                } else {
                    Err(StoreError::Create(format!(
                        "fixed volume {} is missing or full",
                        index
                    )))
                }
            }
        }
    }
}

/// Relative directory for a stream: `{feed}/{yyyy}/{mm}/{dd}`
pub(crate) fn stream_rel_dir(feed: &str, create_time_ms: u64) -> String {
    let date = Utc
        .timestamp_millis_opt(create_time_ms as i64)
        .single()
        .unwrap_or_default();
    format!(
        "{}/{:04}/{:02}/{:02}",
        sanitize_feed(feed),
        date.year(),
        date.month(),
        date.day()
    )
}

/// Feed names come from senders; keep them filesystem-safe
fn sanitize_feed(feed: &str) -> String {
    feed.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
