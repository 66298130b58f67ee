use bytes::BytesMut;
use protoframe::{
    proto::binlog::{BinLog, MESSAGE_TYPE, SCHEMA_JSON},
    CodecError, DecodeShape, Direction, DynamicCodec, MessageCodec, RecordCodec, RecordDecoder,
    RecordEncoder, SchemaRegistry, Transform, TransformConfig, TransformError,
};
use serde_json::{json, Value};

fn registry() -> SchemaRegistry {
    let registry = SchemaRegistry::new();
    registry.register_json("binlog.json", SCHEMA_JSON).unwrap();
    registry
}

fn transform(direction: Direction) -> Transform<DynamicCodec> {
    let config = TransformConfig::new(direction)
        .schema_source("binlog.json")
        .message_type(MESSAGE_TYPE);
    Transform::from_config(config, &registry()).unwrap()
}

fn encoder() -> RecordEncoder<DynamicCodec> {
    transform(Direction::Encode).into_encoder().unwrap()
}

fn decoder() -> RecordDecoder<DynamicCodec> {
    transform(Direction::Decode).into_decoder().unwrap()
}

fn binlog() -> Value {
    json!({
        "type": "TYPE",
        "key": "key",
        "timestamp": 1_700_000_000_000i64,
        "data": b"abcdefghijklmnopqrstuvwx".to_vec()
    })
}

#[test]
fn duplicated_record_split_at_ten() {
    let encoded = encoder().encode(&binlog()).unwrap();
    let mut stream = encoded.to_vec();
    stream.extend_from_slice(&encoded);

    let mut decoder = decoder();
    let mut records = Vec::new();
    for chunk in [&stream[..10], &stream[10..]] {
        for record in decoder.decode(chunk) {
            records.push(record.unwrap());
        }
    }
    assert_eq!(records, vec![binlog(), binlog()]);
    decoder.finish().unwrap();
}

#[test]
fn first_ten_bytes_alone_yield_nothing() {
    let encoded = encoder().encode(&binlog()).unwrap();
    let mut decoder = decoder();
    assert_eq!(decoder.decode(&encoded[..10]).count(), 0);
    assert!(matches!(
        decoder.finish(),
        Err(TransformError::Framing(protoframe::FramingError::Truncated { remaining: 10 }))
    ));
}

#[test]
fn missing_required_field_emits_nothing() {
    let mut encoder = encoder();
    let mut dst = BytesMut::new();
    let record = json!({"type": "TYPE", "timestamp": 1});
    assert!(matches!(
        encoder.encode_into(&record, &mut dst),
        Err(TransformError::Codec(CodecError::Verification(_)))
    ));
    assert!(dst.is_empty());
}

#[test]
fn dynamic_and_generated_codecs_agree() {
    let typed = BinLog {
        r#type: "TYPE".to_string(),
        key: "key".to_string(),
        timestamp: 1_700_000_000_000,
        data: Some(b"abcdefghijklmnopqrstuvwx".to_vec()),
    };
    let dynamic = encoder().encode(&binlog()).unwrap();
    let mut typed_decoder = RecordDecoder::new(MessageCodec::<BinLog>::new());
    let decoded: Vec<BinLog> = typed_decoder
        .decode(&dynamic)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(decoded, vec![typed.clone()]);

    let mut typed_encoder = RecordEncoder::new(MessageCodec::<BinLog>::new());
    let bytes = typed_encoder.encode(&typed).unwrap();
    assert_eq!(bytes, dynamic);
    let mut decoder = decoder();
    let records: Vec<Value> = decoder.decode(&bytes).collect::<Result<_, _>>().unwrap();
    assert_eq!(records, vec![binlog()]);
}

#[test]
fn base64_bytes_and_string_longs() {
    let codec = DynamicCodec::load(&registry(), "binlog.json", MESSAGE_TYPE).unwrap();
    let shape = DecodeShape {
        bytes: protoframe::BytesShape::Base64,
        longs: protoframe::LongShape::String,
        ..DecodeShape::default()
    };
    let mut payload = BytesMut::new();
    codec.serialize(&binlog(), &mut payload).unwrap();
    assert_eq!(
        codec.deserialize(&payload, &shape).unwrap(),
        json!({
            "type": "TYPE",
            "key": "key",
            "timestamp": "1700000000000",
            "data": "YWJjZGVmZ2hpamtsbW5vcHFyc3R1dnd4"
        })
    );
    // and the shaped record encodes back to the same bytes
    let shaped = codec.deserialize(&payload, &shape).unwrap();
    let mut again = BytesMut::new();
    codec.serialize(&shaped, &mut again).unwrap();
    assert_eq!(again, payload);
}

#[test]
fn proto_file_source() {
    let proto = concat!(env!("CARGO_MANIFEST_DIR"), "/../protoframe/proto/binlog.proto");
    let config = TransformConfig::new(Direction::Decode)
        .schema_source(proto)
        .message_type(MESSAGE_TYPE);
    let mut decoder = Transform::from_config(config, &SchemaRegistry::new())
        .unwrap()
        .into_decoder()
        .unwrap();
    let encoded = encoder().encode(&binlog()).unwrap();
    let records: Vec<_> = decoder.decode(&encoded).map(Result::unwrap).collect();
    assert_eq!(records, vec![binlog()]);
}
