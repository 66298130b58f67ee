use async_stream::stream;
use bytes::BytesMut;
use futures::{pin_mut, Stream, StreamExt};
use tokio_util::codec;
use tracing::{debug, warn};

use crate::{
    codec::{FrameAssembler, Frames},
    config::{CodecOptions, DecodeShape},
    constants::DEFAULT_MAX_FRAME_SIZE,
    error::{FramingError, TransformError, TransformResult},
    record_codec::RecordCodec,
};

/// The decode half of a transform: bytes in, records out.
///
/// Framed, the decoder owns a [FrameAssembler] for the lifetime of one
/// stream. Unframed, every chunk is exactly one message, an empty chunk
/// included.
#[derive(Debug)]
pub struct RecordDecoder<C> {
    codec: C,
    shape: DecodeShape,
    framed: bool,
    assembler: FrameAssembler,
}

impl<C: RecordCodec> RecordDecoder<C> {
    /// A framed decoder producing the default [DecodeShape].
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            shape: DecodeShape::default(),
            framed: true,
            assembler: FrameAssembler::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE),
        }
    }

    pub fn from_options(codec: C, options: &CodecOptions) -> Self {
        Self::new(codec)
            .shape(*options.decode_shape())
            .framed(options.framed())
            .max_frame_size(options.max_frame_size())
    }

    pub fn shape(mut self, shape: DecodeShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn framed(mut self, framed: bool) -> Self {
        self.framed = framed;
        self
    }

    /// Replaces the assembler, dropping anything buffered.
    pub fn max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.assembler = FrameAssembler::with_max_frame_size(max_frame_size);
        self
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn decode_shape(&self) -> &DecodeShape {
        &self.shape
    }

    /// Bytes of a partial frame waiting for more input.
    pub fn buffered_len(&self) -> usize {
        self.assembler.buffered_len()
    }

    /// Push one chunk and iterate over the records it completes, in input
    /// order.
    ///
    /// A record which fails to deserialize is yielded as an error and the
    /// following records are still decoded. A [FramingError] is yielded once
    /// and stops the decoder.
    pub fn decode<'a>(&'a mut self, chunk: &'a [u8]) -> Records<'a, C> {
        debug!("Decoding chunk of {} bytes", chunk.len());
        let source = if self.framed {
            Source::Frames(self.assembler.feed(chunk))
        } else {
            Source::Whole(Some(chunk))
        };
        Records {
            codec: &self.codec,
            shape: &self.shape,
            source,
        }
    }

    /// End the stream, failing if a partial frame is left over.
    pub fn finish(self) -> TransformResult<()> {
        if self.framed {
            self.assembler.finish()?;
        }
        Ok(())
    }

    /// Decode a stream of chunks.
    ///
    /// Records which fail to deserialize are yielded as errors and the stream
    /// carries on. A framing error, including a truncated final frame, is
    /// the last item.
    pub fn decode_stream<S, B>(
        mut self,
        chunks: S,
    ) -> impl Stream<Item = TransformResult<C::Record>>
    where
        S: Stream<Item = B>,
        B: AsRef<[u8]>,
    {
        stream! {
            pin_mut!(chunks);
            while let Some(chunk) = chunks.next().await {
                let results: Vec<_> = self.decode(chunk.as_ref()).collect();
                for result in results {
                    match result {
                        Err(err) if err.is_fatal() => {
                            warn!("Ending decode stream: {}", err);
                            yield Err(err);
                            return;
                        }
                        Err(err) => {
                            warn!("Failed to decode record: {}", err);
                            yield Err(err);
                        }
                        Ok(record) => yield Ok(record),
                    }
                }
            }
            if let Err(err) = self.finish() {
                warn!("Ending decode stream: {}", err);
                yield Err(err);
            }
        }
    }
}

/// `tokio_util` adapter. The `FramedRead` owns the buffer, so the
/// decoder's own assembler is unused.
///
/// Unframed, nothing is decoded until end of input, which is then one
/// message.
impl<C: RecordCodec> codec::Decoder for RecordDecoder<C> {
    type Error = TransformError;
    type Item = C::Record;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !self.framed {
            return Ok(None);
        }
        match FrameAssembler::next_frame(src, self.assembler.max_frame_size())? {
            Some(payload) => Ok(Some(self.codec.deserialize(&payload, &self.shape)?)),
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !self.framed {
            if src.is_empty() {
                return Ok(None);
            }
            let payload = src.split();
            return Ok(Some(self.codec.deserialize(&payload, &self.shape)?));
        }
        match codec::Decoder::decode(self, src)? {
            Some(record) => Ok(Some(record)),
            None if src.is_empty() => Ok(None),
            None => Err(FramingError::Truncated {
                remaining: src.len(),
            }
            .into()),
        }
    }
}

enum Source<'a> {
    Frames(Frames<'a>),
    Whole(Option<&'a [u8]>),
}

/// Records completed by one [RecordDecoder::decode].
pub struct Records<'a, C> {
    codec: &'a C,
    shape: &'a DecodeShape,
    source: Source<'a>,
}

impl<'a, C: RecordCodec> Iterator for Records<'a, C> {
    type Item = TransformResult<C::Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = match &mut self.source {
            Source::Frames(frames) => match frames.next()? {
                Ok(payload) => self.codec.deserialize(&payload, self.shape),
                Err(err) => return Some(Err(err.into())),
            },
            Source::Whole(chunk) => self.codec.deserialize(chunk.take()?, self.shape),
        };
        Some(result.map_err(TransformError::from))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures::stream;
    use rand::{thread_rng, Rng};
    use serde_json::{json, Value};
    use tokio_util::codec::FramedRead;

    use super::*;
    use crate::{
        error::CodecError,
        proto::binlog::{MESSAGE_TYPE, SCHEMA_JSON},
        DynamicCodec, RecordEncoder, Schema,
    };

    fn binlog_codec() -> DynamicCodec {
        DynamicCodec::new(Schema::from_json(SCHEMA_JSON).unwrap().into(), MESSAGE_TYPE).unwrap()
    }

    fn record(key: &str) -> Value {
        json!({
            "type": "TYPE",
            "key": key,
            "timestamp": 1_700_000_000_000i64,
            "data": (0..24).collect::<Vec<u8>>()
        })
    }

    fn encode(records: &[Value]) -> Vec<u8> {
        let mut encoder = RecordEncoder::new(binlog_codec());
        records
            .iter()
            .flat_map(|record| encoder.encode(record).unwrap())
            .collect()
    }

    fn decoder() -> RecordDecoder<DynamicCodec> {
        RecordDecoder::new(binlog_codec())
    }

    fn collect(decoder: &mut RecordDecoder<DynamicCodec>, chunk: &[u8]) -> Vec<Value> {
        decoder.decode(chunk).map(|record| record.unwrap()).collect()
    }

    #[test]
    fn partial_then_complete() {
        let records = [record("a"), record("b")];
        let bytes = encode(&records);
        let mut decoder = decoder();
        assert!(collect(&mut decoder, &bytes[..10]).is_empty());
        assert_eq!(decoder.buffered_len(), 10);
        assert_eq!(collect(&mut decoder, &bytes[10..]), records);
        decoder.finish().unwrap();
    }

    #[test]
    fn random_chunking() {
        let records: Vec<_> = (0..20).map(|i| record(&i.to_string())).collect();
        let bytes = encode(&records);
        let mut rng = thread_rng();
        for _ in 0..20 {
            let mut decoder = decoder();
            let mut out = Vec::new();
            let mut rest = bytes.as_slice();
            while !rest.is_empty() {
                let (chunk, tail) = rest.split_at(rng.gen_range(1..=rest.len().min(64)));
                out.extend(collect(&mut decoder, chunk));
                rest = tail;
            }
            assert_eq!(out, records);
        }
    }

    #[test]
    fn bad_payload_does_not_stop_later_records() {
        let mut bytes = encode(&[record("a")]);
        // a frame holding field 1 as a varint, which is a string field
        bytes.extend_from_slice(&[2, 0x08, 0x01]);
        bytes.extend(encode(&[record("b")]));
        let results: Vec<_> = decoder().decode(&bytes).collect::<Vec<_>>();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap(), &record("a"));
        assert!(matches!(
            results[1],
            Err(TransformError::Codec(CodecError::Deserialization(_)))
        ));
        assert_eq!(results[2].as_ref().unwrap(), &record("b"));
    }

    #[test]
    fn unframed_chunks_are_whole_messages() {
        let mut encoder = RecordEncoder::new(binlog_codec()).framed(false);
        let payload = encoder.encode(&record("a")).unwrap();
        let mut decoder = decoder().framed(false);
        assert_eq!(collect(&mut decoder, &payload), vec![record("a")]);
        // an empty message is missing the required fields
        assert!(matches!(
            decoder.decode(&[]).collect::<Vec<_>>().as_slice(),
            [Err(TransformError::Codec(CodecError::Deserialization(_)))]
        ));
        // half a message is just a bad message
        assert!(decoder.decode(&payload[..5]).next().unwrap().is_err());
        decoder.finish().unwrap();
    }

    #[test]
    fn unframed_empty_chunk_is_an_empty_message() {
        let schema =
            Schema::from_proto("package ping; message Ping { optional int32 n = 1; }").unwrap();
        let codec = DynamicCodec::new(schema.into(), "ping.Ping").unwrap();
        let mut decoder = RecordDecoder::new(codec).framed(false);
        let records: Vec<_> = decoder.decode(&[]).map(|record| record.unwrap()).collect();
        assert_eq!(records, vec![json!({"n": 0})]);
    }

    #[test]
    fn shape_applies() {
        let bytes = encode(&[record("a")]);
        let shape = DecodeShape {
            bytes: crate::BytesShape::Base64,
            longs: crate::LongShape::String,
            ..DecodeShape::default()
        };
        let mut decoder = decoder().shape(shape);
        let decoded = collect(&mut decoder, &bytes);
        assert_eq!(decoded[0]["timestamp"], json!("1700000000000"));
        assert!(decoded[0]["data"].is_string());
    }

    #[test]
    fn framing_error_stops_decoder() {
        let mut decoder = decoder().max_frame_size(16);
        let bytes = encode(&[record("a")]);
        let results: Vec<_> = decoder.decode(&bytes).collect();
        assert!(matches!(
            results.as_slice(),
            [Err(TransformError::Framing(FramingError::FrameTooLarge { max: 16, .. }))]
        ));
        assert!(matches!(
            decoder.decode(&bytes).next(),
            Some(Err(TransformError::Framing(FramingError::Poisoned)))
        ));
    }

    #[tokio::test]
    async fn decode_stream_reports_truncation() {
        let bytes = encode(&[record("a"), record("b")]);
        let chunks = vec![
            Bytes::copy_from_slice(&bytes[..7]),
            Bytes::copy_from_slice(&bytes[7..bytes.len() - 1]),
        ];
        let results: Vec<_> = decoder().decode_stream(stream::iter(chunks)).collect().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), &record("a"));
        assert!(matches!(
            results[1],
            Err(TransformError::Framing(FramingError::Truncated { .. }))
        ));
    }

    #[tokio::test]
    async fn decode_stream_continues_after_bad_record() {
        let chunks = vec![
            Bytes::from(encode(&[record("a")])),
            // field 1 as a varint, but it's a string field
            Bytes::from_static(&[2, 0x08, 0x01]),
            Bytes::from(encode(&[record("b")])),
        ];
        let results: Vec<_> = decoder().decode_stream(stream::iter(chunks)).collect().await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap(), &record("a"));
        assert!(matches!(
            results[1],
            Err(TransformError::Codec(CodecError::Deserialization(_)))
        ));
        assert_eq!(results[2].as_ref().unwrap(), &record("b"));
    }

    #[tokio::test]
    async fn framed_read() -> anyhow::Result<()> {
        let records: Vec<_> = (0..5).map(|i| record(&i.to_string())).collect();
        let bytes = encode(&records);
        let reader = FramedRead::new(bytes.as_slice(), decoder());
        let decoded: Vec<Value> = reader.map(|record| record.unwrap()).collect().await;
        assert_eq!(decoded, records);
        Ok(())
    }

    #[tokio::test]
    async fn framed_read_unframed() -> anyhow::Result<()> {
        let mut encoder = RecordEncoder::new(binlog_codec()).framed(false);
        let payload = encoder.encode(&record("a"))?;
        let mut reader = FramedRead::new(&payload[..], decoder().framed(false));
        assert_eq!(reader.next().await.transpose()?, Some(record("a")));
        assert!(reader.next().await.is_none());
        Ok(())
    }
}
