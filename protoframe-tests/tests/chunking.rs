use protoframe::{
    codec::FrameAssembler,
    proto::binlog::BinLog,
    varint::{length_prefix_len, put_length_prefix, read_length_prefix},
    FramingError, MessageCodec, RecordDecoder, RecordEncoder,
};
use rand::{seq::SliceRandom, thread_rng, Rng};

fn entries(count: usize) -> Vec<BinLog> {
    let mut rng = thread_rng();
    (0..count)
        .map(|i| BinLog {
            r#type: (if i % 2 == 0 { "PUT" } else { "DEL" }).to_string(),
            key: format!("key-{}", i),
            timestamp: rng.gen(),
            // sizes either side of the one and two byte prefix boundaries
            data: Some(vec![i as u8; *[0, 1, 126, 127, 128, 300, 16_500].choose(&mut rng).unwrap()]),
        })
        .collect()
}

fn encode(entries: &[BinLog]) -> Vec<u8> {
    let mut encoder = RecordEncoder::new(MessageCodec::<BinLog>::new());
    entries
        .iter()
        .flat_map(|entry| encoder.encode(entry).unwrap())
        .collect()
}

fn decode_in(chunks: &[&[u8]]) -> Vec<BinLog> {
    let mut decoder = RecordDecoder::new(MessageCodec::<BinLog>::new());
    let mut out = Vec::new();
    for chunk in chunks {
        out.extend(decoder.decode(chunk).map(|entry| entry.unwrap()));
    }
    decoder.finish().unwrap();
    out
}

#[test]
fn varint_inverse() {
    for (length, bytes) in [
        (0u64, 1usize),
        (1, 1),
        (127, 1),
        (128, 2),
        (16_384, 3),
        (2_097_151, 3),
    ] {
        let mut buf = Vec::new();
        put_length_prefix(length, &mut buf);
        assert_eq!(buf.len(), bytes);
        assert_eq!(length_prefix_len(length), bytes);
        let prefix = read_length_prefix(&buf).unwrap().unwrap();
        assert_eq!((prefix.length, prefix.prefix_len), (length, bytes));
    }
}

#[test]
fn whole_stream_at_once() {
    let entries = entries(50);
    let bytes = encode(&entries);
    assert_eq!(decode_in(&[bytes.as_slice()]), entries);
}

#[test]
fn one_byte_at_a_time() {
    let entries = entries(10);
    let bytes = encode(&entries);
    let chunks: Vec<&[u8]> = bytes.chunks(1).collect();
    assert_eq!(decode_in(&chunks), entries);
}

#[test]
fn random_splits() {
    let entries = entries(40);
    let bytes = encode(&entries);
    let mut rng = thread_rng();
    for _ in 0..50 {
        let mut cuts: Vec<usize> = (0..rng.gen_range(0..30))
            .map(|_| rng.gen_range(0..=bytes.len()))
            .collect();
        cuts.sort_unstable();
        let mut chunks = Vec::new();
        let mut start = 0;
        for cut in cuts {
            chunks.push(&bytes[start..cut]);
            start = cut;
        }
        chunks.push(&bytes[start..]);
        assert_eq!(decode_in(&chunks), entries);
    }
}

#[test]
fn every_split_of_two_frames() {
    let entries = entries(2);
    let bytes = encode(&entries);
    for split in 0..=bytes.len() {
        assert_eq!(decode_in(&[&bytes[..split], &bytes[split..]]), entries);
    }
}

#[test]
fn concatenated_frames_in_order() {
    let mut stream = Vec::new();
    for payload in [&b"first"[..], &b"second"[..]] {
        put_length_prefix(payload.len() as u64, &mut stream);
        stream.extend_from_slice(payload);
    }
    let mut assembler = FrameAssembler::new();
    let frames: Vec<_> = assembler
        .feed(&stream)
        .collect::<Result<_, FramingError>>()
        .unwrap();
    assert_eq!(frames, vec![&b"first"[..], &b"second"[..]]);
    assert!(assembler.is_empty());
}
