//! Ingest handler
//!
//! Turns one inbound transfer into one stored stream. The handler is a
//! small state machine driven by the transport layer:
//!
//! ```text
//! set_meta_map ─▶ validate ─▶ handle_header ─▶ write_content* ─▶ handle_footer
//!                                   │
//!                             handle_error (any time after the header)
//! ```
//!
//! Nothing becomes visible until `handle_footer` returns; `handle_error`
//! rolls the whole transfer back, so a failed transfer leaves no trace.

use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::stream::{MetaMap, StreamMeta, StreamStore, StreamTarget};

/// Required header naming the destination feed
pub const META_FEED: &str = "Feed";

/// Required header naming the stream type
pub const META_TYPE: &str = "Type";

enum IngestState {
    New,
    Validated { feed: String, stream_type: String },
    Open(StreamTarget),
    Finished,
}

/// Handles one inbound transfer against a [`StreamStore`].
pub struct StreamIngester {
    store: StreamStore,
    meta_map: MetaMap,
    state: IngestState,
}

impl StreamIngester {
    pub fn new(store: StreamStore) -> Self {
        Self {
            store,
            meta_map: MetaMap::new(),
            state: IngestState::New,
        }
    }

    /// Attach the sender-supplied headers. Must precede [`validate`](Self::validate).
    pub fn set_meta_map(&mut self, meta_map: MetaMap) {
        self.meta_map = meta_map;
    }

    /// Check that the headers name a feed and a stream type.
    pub fn validate(&mut self) -> Result<()> {
        if !matches!(self.state, IngestState::New) {
            return Err(StoreError::Validation(
                "transfer already validated".to_string(),
            ));
        }

        let feed = match self.meta_map.get(META_FEED) {
            Some(feed) if !feed.is_empty() => feed.to_string(),
            _ => {
                return Err(StoreError::Validation(format!(
                    "missing required header '{}'",
                    META_FEED
                )))
            }
        };
        let stream_type = match self.meta_map.get(META_TYPE) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => {
                return Err(StoreError::Validation(format!(
                    "missing required header '{}'",
                    META_TYPE
                )))
            }
        };

        self.state = IngestState::Validated { feed, stream_type };
        Ok(())
    }

    /// Open the destination stream. Requires a successful [`validate`](Self::validate).
    pub fn handle_header(&mut self) -> Result<()> {
        let (feed, stream_type) = match &self.state {
            IngestState::Validated { feed, stream_type } => {
                (feed.clone(), stream_type.clone())
            }
            IngestState::New => {
                return Err(StoreError::Validation(
                    "header before validation".to_string(),
                ))
            }
            _ => {
                return Err(StoreError::Validation(
                    "transfer already has an open stream".to_string(),
                ))
            }
        };

        let target = self
            .store
            .create_stream(&feed, &stream_type, self.meta_map.clone())?;
        debug!(stream = target.id(), feed = %feed, "ingest opened stream");
        self.state = IngestState::Open(target);
        Ok(())
    }

    /// Append content bytes to the open stream.
    pub fn write_content(&mut self, buf: &[u8]) -> Result<()> {
        match &mut self.state {
            IngestState::Open(target) => target.write(buf),
            _ => Err(StoreError::Validation("no open stream".to_string())),
        }
    }

    /// Attach a footer map, persisted with the stream at completion.
    pub fn set_footer(&mut self, footer: MetaMap) -> Result<()> {
        match &mut self.state {
            IngestState::Open(target) => {
                target.set_footer(footer);
                Ok(())
            }
            _ => Err(StoreError::Validation("no open stream".to_string())),
        }
    }

    /// Complete the transfer: close the stream and make it visible.
    pub fn handle_footer(&mut self) -> Result<StreamMeta> {
        match std::mem::replace(&mut self.state, IngestState::Finished) {
            IngestState::Open(target) => target.close(),
            other => {
                self.state = other;
                Err(StoreError::Validation("no open stream".to_string()))
            }
        }
    }

    /// Abort the transfer, discarding anything written so far.
    pub fn handle_error(&mut self) {
        if let IngestState::Open(target) = std::mem::replace(&mut self.state, IngestState::Finished)
        {
            warn!(stream = target.id(), "ingest aborted, discarding stream");
            target.abort();
        }
    }
}
