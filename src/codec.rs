//! Binary codec layer
//!
//! Pluggable serializers that convert typed values to and from canonical
//! byte encodings. Buffers are borrowed from the caller and reused across
//! calls, so both directions leave the buffer in a readable state:
//!
//! - `serialize` clears the buffer, writes the encoding, and returns with
//!   the buffer holding exactly the written bytes
//! - `deserialize` consumes a readable slice and never keeps a borrow
//!
//! Encodings are deterministic: the same value always produces identical
//! bytes. The ordered key/value engine relies on this for key comparison.

use bytes::{BufMut, BytesMut};

use crate::error::{Result, StoreError};

/// Converts values of type `T` to and from their canonical byte encoding.
pub trait Serde<T> {
    /// Write `value`'s canonical encoding into `buf`, replacing any
    /// previous contents.
    fn serialize(&self, buf: &mut BytesMut, value: &T) -> Result<()>;

    /// Decode a value from the readable bytes in `buf`.
    ///
    /// Fails with [`StoreError::Encoding`] when the bytes are not valid
    /// for the declared type.
    fn deserialize(&self, buf: &[u8]) -> Result<T>;
}

// =============================================================================
// Raw bytes
// =============================================================================

/// Identity codec: bytes in, bytes out.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawSerde;

impl Serde<Vec<u8>> for RawSerde {
    fn serialize(&self, buf: &mut BytesMut, value: &Vec<u8>) -> Result<()> {
        buf.clear();
        buf.extend_from_slice(value);
        Ok(())
    }

    fn deserialize(&self, buf: &[u8]) -> Result<Vec<u8>> {
        Ok(buf.to_vec())
    }
}

// =============================================================================
// UTF-8 strings
// =============================================================================

/// UTF-8 string codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSerde;

impl Serde<String> for StringSerde {
    fn serialize(&self, buf: &mut BytesMut, value: &String) -> Result<()> {
        buf.clear();
        buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    fn deserialize(&self, buf: &[u8]) -> Result<String> {
        std::str::from_utf8(buf)
            .map(str::to_owned)
            .map_err(|e| StoreError::Encoding(format!("invalid UTF-8: {}", e)))
    }
}

// =============================================================================
// Unsigned 64-bit integers
// =============================================================================

/// Big-endian u64 codec. Big-endian so that the byte encoding sorts in
/// the same order as the numeric value.
#[derive(Debug, Clone, Copy, Default)]
pub struct U64Serde;

impl Serde<u64> for U64Serde {
    fn serialize(&self, buf: &mut BytesMut, value: &u64) -> Result<()> {
        buf.clear();
        buf.put_u64(*value);
        Ok(())
    }

    fn deserialize(&self, buf: &[u8]) -> Result<u64> {
        let bytes: [u8; 8] = buf
            .try_into()
            .map_err(|_| StoreError::Encoding(format!("expected 8 bytes, got {}", buf.len())))?;
        Ok(u64::from_be_bytes(bytes))
    }
}
