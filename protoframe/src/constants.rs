use std::mem::size_of;

/// Bits of payload carried by each byte of a varint.
pub const VARINT_PAYLOAD_BITS: u32 = 7;

/// The longest varint needed to hold a `u64` length.
pub const MAX_LENGTH_PREFIX_LEN: usize =
    (size_of::<u64>() * 8 + VARINT_PAYLOAD_BITS as usize - 1) / VARINT_PAYLOAD_BITS as usize;

/// Frames announcing a larger payload are rejected unless configured
/// otherwise. Bounds how much a stalled partial frame can hold on to.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Initial capacity of an accumulation buffer.
pub const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
