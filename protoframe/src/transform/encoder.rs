use async_stream::stream;
use bytes::{BufMut, Bytes, BytesMut};
use futures::{pin_mut, Stream, StreamExt};
use tokio_util::codec;
use tracing::{debug, warn};

use crate::{
    codec::FrameEncoder,
    config::CodecOptions,
    constants::{DEFAULT_MAX_FRAME_SIZE, INITIAL_BUFFER_CAPACITY},
    error::{TransformError, TransformResult},
    record_codec::RecordCodec,
};

/// The encode half of a transform: records in, bytes out.
///
/// Every record produces exactly one buffer, or an error and no bytes at
/// all. A failed record leaves the encoder usable for the next one.
#[derive(Debug)]
pub struct RecordEncoder<C> {
    codec: C,
    verify: bool,
    framed: bool,
    frame_encoder: FrameEncoder,
    /// Holds a serialized record until it's known to be good.
    scratch: BytesMut,
}

impl<C: RecordCodec> RecordEncoder<C> {
    /// A framed encoder which verifies records.
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            verify: true,
            framed: true,
            frame_encoder: FrameEncoder::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE),
            scratch: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    pub fn from_options(codec: C, options: &CodecOptions) -> Self {
        Self::new(codec)
            .verify(options.verify())
            .framed(options.framed())
            .max_frame_size(options.max_frame_size())
    }

    /// Run [RecordCodec::verify] before serializing.
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Prefix each record with its varint length.
    pub fn framed(mut self, framed: bool) -> Self {
        self.framed = framed;
        self
    }

    /// Only applies to framed output.
    pub fn max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.frame_encoder = FrameEncoder::with_max_frame_size(max_frame_size);
        self
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Encode one record in to its own buffer.
    pub fn encode(&mut self, record: &C::Record) -> TransformResult<Bytes> {
        let mut dst = BytesMut::new();
        self.encode_into(record, &mut dst)?;
        Ok(dst.freeze())
    }

    /// Append the encoding of `record` to `dst`. Nothing is appended on
    /// error.
    pub fn encode_into(
        &mut self,
        record: &C::Record,
        dst: &mut BytesMut,
    ) -> TransformResult<()> {
        if self.verify {
            self.codec.verify(record)?;
        }
        self.scratch.clear();
        self.codec.serialize(record, &mut self.scratch)?;
        if self.framed {
            self.frame_encoder.encode_frame(&self.scratch, dst)?;
        } else {
            dst.put_slice(&self.scratch);
        }
        debug!(
            "Encoded record of {} bytes (framed: {})",
            self.scratch.len(),
            self.framed
        );
        Ok(())
    }

    /// Encode every record of `records`.
    ///
    /// Errors are per record, so the stream carries on after yielding one.
    pub fn encode_stream<S>(
        mut self,
        records: S,
    ) -> impl Stream<Item = TransformResult<Bytes>>
    where
        S: Stream<Item = C::Record>,
    {
        stream! {
            pin_mut!(records);
            while let Some(record) = records.next().await {
                let result = self.encode(&record);
                if let Err(err) = &result {
                    warn!("Failed to encode record: {}", err);
                }
                yield result;
            }
        }
    }
}

impl<C: RecordCodec> codec::Encoder<C::Record> for RecordEncoder<C> {
    type Error = TransformError;

    fn encode(&mut self, item: C::Record, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encode_into(&item, dst)
    }
}
