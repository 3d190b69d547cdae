//! Composite lookup keys
//!
//! Reference entries are stored under one composite key:
//!
//! ```text
//! ┌────────────┬──────────────┬───────────┬─────────────────────┐
//! │ MapId (4)  │ KeyLen (4)   │ Key bytes │ EffectiveFrom (8)   │
//! └────────────┴──────────────┴───────────┴─────────────────────┘
//! ```
//!
//! All integers are big-endian so byte order equals numeric order. The
//! key-length field groups every version of one (map, key) pair into a
//! contiguous run with effective-from ascending, which is what makes the
//! descending-scan lookup work without a full scan.
//!
//! Values are `effective_to (8, BE)` followed by the raw payload.

use bytes::Bytes;

use crate::error::{Result, StoreError};

/// MapId + KeyLen
const PREFIX_LEN: usize = 8;

/// Encode the composite key for (map, key, effective_from)
pub(crate) fn encode(map_id: u32, key: &[u8], effective_from: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(PREFIX_LEN + key.len() + 8);
    out.extend_from_slice(&map_id.to_be_bytes());
    out.extend_from_slice(&(key.len() as u32).to_be_bytes());
    out.extend_from_slice(key);
    out.extend_from_slice(&effective_from.to_be_bytes());
    out
}

/// The map-id prefix shared by every entry of one map (used for purge)
pub(crate) fn map_prefix(map_id: u32) -> Vec<u8> {
    map_id.to_be_bytes().to_vec()
}

/// A decoded composite key, borrowing the key bytes
pub(crate) struct DecodedKey<'a> {
    pub map_id: u32,
    pub key: &'a [u8],
    pub effective_from: u64,
}

/// Decode a composite key produced by [`encode`]
pub(crate) fn decode(raw: &[u8]) -> Result<DecodedKey<'_>> {
    if raw.len() < PREFIX_LEN + 8 {
        return Err(StoreError::Encoding(format!(
            "composite key too short: {} bytes",
            raw.len()
        )));
    }

    let map_id = u32::from_be_bytes(raw[0..4].try_into().unwrap());
    let key_len = u32::from_be_bytes(raw[4..8].try_into().unwrap()) as usize;

    if raw.len() != PREFIX_LEN + key_len + 8 {
        return Err(StoreError::Encoding(format!(
            "composite key length mismatch: {} bytes for key_len {}",
            raw.len(),
            key_len
        )));
    }

    let key = &raw[PREFIX_LEN..PREFIX_LEN + key_len];
    let effective_from =
        u64::from_be_bytes(raw[PREFIX_LEN + key_len..].try_into().unwrap());

    Ok(DecodedKey {
        map_id,
        key,
        effective_from,
    })
}

/// Encode a stored value: effective_to followed by the payload
pub(crate) fn encode_value(effective_to: u64, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(&effective_to.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Split a stored value into (effective_to, payload)
pub(crate) fn decode_value(raw: &Bytes) -> Result<(u64, Bytes)> {
    if raw.len() < 8 {
        return Err(StoreError::Encoding(format!(
            "reference value too short: {} bytes",
            raw.len()
        )));
    }
    let effective_to = u64::from_be_bytes(raw[0..8].try_into().unwrap());
    Ok((effective_to, raw.slice(8..)))
}
