use std::{fmt, marker::PhantomData};

use bytes::BytesMut;
use prost::Message;

use crate::{
    config::DecodeShape,
    error::{from_decode_error, CodecError},
};

/// Converts between a record and the bytes of a single message payload.
///
/// The framing layer never looks inside a payload; everything it knows about
/// records goes through this trait.
pub trait RecordCodec {
    type Record;

    /// Check that `record` is structurally valid before it is serialized.
    fn verify(&self, record: &Self::Record) -> Result<(), CodecError>;

    /// Append the encoding of `record` to `buf`.
    fn serialize(&self, record: &Self::Record, buf: &mut BytesMut) -> Result<(), CodecError>;

    /// Read a record from exactly one payload.
    fn deserialize(&self, payload: &[u8], shape: &DecodeShape)
        -> Result<Self::Record, CodecError>;
}

/// [RecordCodec] for a compile-time prost message.
///
/// Typed messages are always structurally valid, so [verify] never fails,
/// and a [DecodeShape] has nothing to shape.
///
/// [verify]: RecordCodec::verify
pub struct MessageCodec<M> {
    phantom: PhantomData<fn() -> M>,
}

impl<M> MessageCodec<M> {
    pub fn new() -> Self {
        Self {
            phantom: PhantomData,
        }
    }
}

impl<M> Default for MessageCodec<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for MessageCodec<M> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for MessageCodec<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageCodec")
            .field("message", &std::any::type_name::<M>())
            .finish()
    }
}

impl<M: Message + Default> RecordCodec for MessageCodec<M> {
    type Record = M;

    fn verify(&self, _record: &M) -> Result<(), CodecError> {
        Ok(())
    }

    fn serialize(&self, record: &M, buf: &mut BytesMut) -> Result<(), CodecError> {
        record
            .encode(buf)
            .map_err(|err| CodecError::Serialization(err.to_string()))
    }

    fn deserialize(&self, payload: &[u8], _shape: &DecodeShape) -> Result<M, CodecError> {
        M::decode(payload).map_err(from_decode_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::binlog::BinLog;

    #[test]
    fn typed_round_trip() {
        let codec = MessageCodec::<BinLog>::new();
        let record = BinLog {
            r#type: "TYPE".to_string(),
            key: "key".to_string(),
            timestamp: 1_700_000_000_000,
            data: Some(vec![1, 2, 3]),
        };
        codec.verify(&record).unwrap();
        let mut buf = BytesMut::new();
        codec.serialize(&record, &mut buf).unwrap();
        let decoded = codec.deserialize(&buf, &DecodeShape::default()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn truncated_payload() {
        let codec = MessageCodec::<BinLog>::new();
        // key (field 2) announcing 5 bytes, 1 present
        assert!(matches!(
            codec.deserialize(&[0x12, 0x05, b'k'], &DecodeShape::default()),
            Err(CodecError::Deserialization(_))
        ));
    }
}
