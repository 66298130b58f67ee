use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec;

use crate::{
    constants::DEFAULT_MAX_FRAME_SIZE,
    error::{FramingError, TransformError},
    varint::{length_prefix_len, put_length_prefix},
};

/// [codec::Encoder] prepending a varint length to each payload.
#[derive(Debug, Copy, Clone)]
pub struct FrameEncoder {
    max_frame_size: usize,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Write `payload` to `dst` as one frame.
    pub fn encode_frame(&self, payload: &[u8], dst: &mut BytesMut) -> Result<(), FramingError> {
        let len = payload.len();
        if len > self.max_frame_size {
            return Err(FramingError::FrameTooLarge {
                length: len as u64,
                max: self.max_frame_size,
            });
        }
        dst.reserve(length_prefix_len(len as u64) + len);
        put_length_prefix(len as u64, dst);
        dst.put_slice(payload);
        Ok(())
    }
}

impl codec::Encoder<Bytes> for FrameEncoder {
    type Error = TransformError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        Ok(self.encode_frame(&item, dst)?)
    }
}

#[cfg(test)]
mod tests {
    use futures::SinkExt;
    use tokio_util::codec::{Encoder, FramedWrite};

    use super::*;

    #[test]
    fn prefixes_length() {
        let mut encoder = FrameEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode(Bytes::from_static(b"abc"), &mut dst).unwrap();
        encoder.encode(Bytes::from(vec![9u8; 200]), &mut dst).unwrap();
        assert_eq!(&dst[..4], &[3, b'a', b'b', b'c']);
        // 200 = 0b1_1001000
        assert_eq!(&dst[4..6], &[0xC8, 0x01]);
        assert_eq!(dst.len(), 4 + 2 + 200);
    }

    #[test]
    fn rejects_large_payload() {
        let encoder = FrameEncoder::with_max_frame_size(2);
        let mut dst = BytesMut::new();
        assert_eq!(
            encoder.encode_frame(b"abc", &mut dst),
            Err(FramingError::FrameTooLarge { length: 3, max: 2 })
        );
        assert!(dst.is_empty());
    }

    #[tokio::test]
    async fn framed_write() {
        let mut writer = FramedWrite::new(Vec::new(), FrameEncoder::new());
        writer.send(Bytes::from_static(b"hello")).await.unwrap();
        writer.send(Bytes::new()).await.unwrap();
        assert_eq!(writer.get_ref().as_slice(), &[5, b'h', b'e', b'l', b'l', b'o', 0]);
    }
}
