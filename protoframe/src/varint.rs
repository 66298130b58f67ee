//! Base-128 varint length prefixes.
//!
//! Writing goes through `prost::encoding`. Reading is done here: a prefix
//! split across chunks isn't an error, the reader reports that more bytes
//! are needed and is retried once they arrive.

use bytes::BufMut;
use prost::encoding::{encode_varint, encoded_len_varint};

use crate::{
    constants::{MAX_LENGTH_PREFIX_LEN, VARINT_PAYLOAD_BITS},
    error::FramingError,
};

const CONTINUATION_BIT: u8 = 0x80;
const PAYLOAD_MASK: u8 = 0x7F;

/// A successfully read length prefix.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LengthPrefix {
    /// Byte count of the payload that follows the prefix.
    pub length: u64,
    /// Bytes taken up by the prefix itself.
    pub prefix_len: usize,
}

impl LengthPrefix {
    /// Total size of the frame, prefix included. `None` if it can't be
    /// addressed on this platform.
    pub fn frame_len(&self) -> Option<usize> {
        usize::try_from(self.length)
            .ok()?
            .checked_add(self.prefix_len)
    }
}

/// Attempt to read a varint length prefix starting at offset 0 of `buf`.
///
/// Returns `Ok(None)` when `buf` ends before the terminating byte, including
/// when it is empty.
pub fn read_length_prefix(buf: &[u8]) -> Result<Option<LengthPrefix>, FramingError> {
    let mut length = 0u64;
    for (index, &byte) in buf.iter().enumerate() {
        let bits = u64::from(byte & PAYLOAD_MASK);
        let last = byte & CONTINUATION_BIT == 0;
        if index == MAX_LENGTH_PREFIX_LEN - 1 {
            if !last {
                return Err(FramingError::PrefixTooLong {
                    max: MAX_LENGTH_PREFIX_LEN,
                });
            }
            // only room left for the top bit of a u64
            if bits > 1 {
                return Err(FramingError::LengthOverflow);
            }
        }
        length |= bits << (VARINT_PAYLOAD_BITS * index as u32);
        if last {
            return Ok(Some(LengthPrefix {
                length,
                prefix_len: index + 1,
            }));
        }
    }
    Ok(None)
}

/// Write `length` as a varint prefix.
pub fn put_length_prefix<B: BufMut>(length: u64, buf: &mut B) {
    encode_varint(length, buf);
}

/// Number of bytes [put_length_prefix] writes for `length`.
pub fn length_prefix_len(length: u64) -> usize {
    encoded_len_varint(length)
}
