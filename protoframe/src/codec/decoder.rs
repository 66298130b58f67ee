use bytes::{Bytes, BytesMut};
use tokio_util::codec;

use crate::{
    codec::FrameAssembler,
    constants::DEFAULT_MAX_FRAME_SIZE,
    error::{FramingError, TransformError},
};

/// [codec::Decoder] yielding the raw payload of each varint length-delimited
/// frame. The accumulation buffer belongs to the `FramedRead` driving it.
#[derive(Debug, Copy, Clone)]
pub struct FrameDecoder {
    max_frame_size: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl codec::Decoder for FrameDecoder {
    type Error = TransformError;
    type Item = Bytes;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(FrameAssembler::next_frame(src, self.max_frame_size)?)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(FramingError::Truncated {
                remaining: src.len(),
            }
            .into()),
        }
    }
}
