//! Varint length-delimited framing.
//!
//! Every frame on the wire is a base-128 varint holding the payload length
//! (n), followed by n payload bytes. Nothing else is added: no compression
//! flag, no checksum.
//!
//! [FrameAssembler] is the push-based decoder, fed chunks as they arrive.
//! [FrameDecoder] and [FrameEncoder] plug the same framing in to
//! `tokio_util`'s `FramedRead`/`FramedWrite`.

mod assembler;
mod decoder;
mod encoder;

pub use assembler::{FrameAssembler, Frames};
pub use decoder::FrameDecoder;
pub use encoder::FrameEncoder;
