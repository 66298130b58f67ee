use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::{Buf, BufMut};
use prost::encoding::{decode_varint, encode_key, encode_varint};
use serde_json::{Number, Value};

use crate::{
    config::{BytesShape, DecodeShape, LongShape},
    error::{from_decode_error, CodecError},
    schema::ScalarKind,
};

/// A single scalar, typed by its wire kind.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ScalarValue {
    Double(f64),
    Float(f32),
    Int32(i32),
    Int64(i64),
    Uint32(u32),
    Uint64(u64),
    Sint32(i32),
    Sint64(i64),
    Fixed32(u32),
    Fixed64(u64),
    Sfixed32(i32),
    Sfixed64(i64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
}

fn float_from_json(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(number) => number.as_f64().ok_or_else(|| "number expected".to_string()),
        Value::String(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            _ => Err("number expected".to_string()),
        },
        _ => Err("number expected".to_string()),
    }
}

fn float_to_json(value: f64) -> Value {
    match Number::from_f64(value) {
        Some(number) => Value::Number(number),
        None if value.is_nan() => Value::String("NaN".to_string()),
        None if value > 0.0 => Value::String("Infinity".to_string()),
        None => Value::String("-Infinity".to_string()),
    }
}

fn int_from_json<T: TryFrom<i64>>(value: &Value) -> Result<T, String> {
    value
        .as_i64()
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| "integer expected".to_string())
}

fn uint_from_json<T: TryFrom<u64>>(value: &Value) -> Result<T, String> {
    value
        .as_u64()
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| "unsigned integer expected".to_string())
}

fn long_from_json(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| "integer or decimal string expected".to_string())
}

fn ulong_from_json(value: &Value) -> Result<u64, String> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| "unsigned integer or decimal string expected".to_string())
}

fn bytes_from_json(value: &Value) -> Result<Vec<u8>, String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|byte| u8::try_from(byte).ok())
                    .ok_or_else(|| "array of bytes expected".to_string())
            })
            .collect(),
        Value::String(s) => STANDARD
            .decode(s)
            .map_err(|err| format!("invalid base64: {}", err)),
        _ => Err("bytes expected (array or base64 string)".to_string()),
    }
}

fn zigzag32(value: i32) -> u64 {
    ((value << 1) ^ (value >> 31)) as u32 as u64
}

fn zigzag64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

fn unzigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

fn underflow() -> CodecError {
    CodecError::Deserialization("buffer underflow".to_string())
}

fn varint(buf: &mut &[u8]) -> Result<u64, CodecError> {
    decode_varint(buf).map_err(from_decode_error)
}

fn need(buf: &[u8], n: usize) -> Result<(), CodecError> {
    if buf.len() < n {
        Err(underflow())
    } else {
        Ok(())
    }
}

/// Split a length-delimited value off the front of `buf`.
pub(crate) fn take_len_delimited<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], CodecError> {
    let len = usize::try_from(varint(buf)?).map_err(|_| underflow())?;
    let slice: &'a [u8] = *buf;
    need(slice, len)?;
    let (head, tail) = slice.split_at(len);
    *buf = tail;
    Ok(head)
}

impl ScalarValue {
    pub fn from_json(kind: ScalarKind, value: &Value) -> Result<Self, String> {
        Ok(match kind {
            ScalarKind::Double => Self::Double(float_from_json(value)?),
            ScalarKind::Float => Self::Float(float_from_json(value)? as f32),
            ScalarKind::Int32 => Self::Int32(int_from_json(value)?),
            ScalarKind::Sint32 => Self::Sint32(int_from_json(value)?),
            ScalarKind::Sfixed32 => Self::Sfixed32(int_from_json(value)?),
            ScalarKind::Uint32 => Self::Uint32(uint_from_json(value)?),
            ScalarKind::Fixed32 => Self::Fixed32(uint_from_json(value)?),
            ScalarKind::Int64 => Self::Int64(long_from_json(value)?),
            ScalarKind::Sint64 => Self::Sint64(long_from_json(value)?),
            ScalarKind::Sfixed64 => Self::Sfixed64(long_from_json(value)?),
            ScalarKind::Uint64 => Self::Uint64(ulong_from_json(value)?),
            ScalarKind::Fixed64 => Self::Fixed64(ulong_from_json(value)?),
            ScalarKind::Bool => Self::Bool(value.as_bool().ok_or("boolean expected")?),
            ScalarKind::String => Self::String(value.as_str().ok_or("string expected")?.to_string()),
            ScalarKind::Bytes => Self::Bytes(bytes_from_json(value)?),
        })
    }

    /// Parse a map key, which JSON always holds as a string.
    pub fn from_key(kind: ScalarKind, key: &str) -> Result<Self, String> {
        match kind {
            ScalarKind::String => Ok(Self::String(key.to_string())),
            ScalarKind::Bool => match key {
                "true" => Ok(Self::Bool(true)),
                "false" => Ok(Self::Bool(false)),
                _ => Err(format!("boolean key expected, found {:?}", key)),
            },
            // numeric keys parse the same way as decimal strings
            kind => Self::from_json(kind, &Value::String(key.to_string()))
                .or_else(|_| {
                    let number: Value = key
                        .parse::<i64>()
                        .map(Value::from)
                        .or_else(|_| key.parse::<u64>().map(Value::from))
                        .map_err(|_| format!("{} key expected, found {:?}", kind.name(), key))?;
                    Self::from_json(kind, &number)
                }),
        }
    }

    pub fn default_for(kind: ScalarKind) -> Self {
        match kind {
            ScalarKind::Double => Self::Double(0.0),
            ScalarKind::Float => Self::Float(0.0),
            ScalarKind::Int32 => Self::Int32(0),
            ScalarKind::Int64 => Self::Int64(0),
            ScalarKind::Uint32 => Self::Uint32(0),
            ScalarKind::Uint64 => Self::Uint64(0),
            ScalarKind::Sint32 => Self::Sint32(0),
            ScalarKind::Sint64 => Self::Sint64(0),
            ScalarKind::Fixed32 => Self::Fixed32(0),
            ScalarKind::Fixed64 => Self::Fixed64(0),
            ScalarKind::Sfixed32 => Self::Sfixed32(0),
            ScalarKind::Sfixed64 => Self::Sfixed64(0),
            ScalarKind::Bool => Self::Bool(false),
            ScalarKind::String => Self::String(String::new()),
            ScalarKind::Bytes => Self::Bytes(Vec::new()),
        }
    }

    pub fn kind(&self) -> ScalarKind {
        match self {
            Self::Double(_) => ScalarKind::Double,
            Self::Float(_) => ScalarKind::Float,
            Self::Int32(_) => ScalarKind::Int32,
            Self::Int64(_) => ScalarKind::Int64,
            Self::Uint32(_) => ScalarKind::Uint32,
            Self::Uint64(_) => ScalarKind::Uint64,
            Self::Sint32(_) => ScalarKind::Sint32,
            Self::Sint64(_) => ScalarKind::Sint64,
            Self::Fixed32(_) => ScalarKind::Fixed32,
            Self::Fixed64(_) => ScalarKind::Fixed64,
            Self::Sfixed32(_) => ScalarKind::Sfixed32,
            Self::Sfixed64(_) => ScalarKind::Sfixed64,
            Self::Bool(_) => ScalarKind::Bool,
            Self::String(_) => ScalarKind::String,
            Self::Bytes(_) => ScalarKind::Bytes,
        }
    }

    /// Write the value without a field key.
    pub fn encode_raw<B: BufMut>(&self, buf: &mut B) {
        match self {
            Self::Double(v) => buf.put_f64_le(*v),
            Self::Float(v) => buf.put_f32_le(*v),
            // negative int32s are sign extended to ten bytes
            Self::Int32(v) => encode_varint(*v as i64 as u64, buf),
            Self::Int64(v) => encode_varint(*v as u64, buf),
            Self::Uint32(v) => encode_varint(u64::from(*v), buf),
            Self::Uint64(v) => encode_varint(*v, buf),
            Self::Sint32(v) => encode_varint(zigzag32(*v), buf),
            Self::Sint64(v) => encode_varint(zigzag64(*v), buf),
            Self::Fixed32(v) => buf.put_u32_le(*v),
            Self::Fixed64(v) => buf.put_u64_le(*v),
            Self::Sfixed32(v) => buf.put_i32_le(*v),
            Self::Sfixed64(v) => buf.put_i64_le(*v),
            Self::Bool(v) => encode_varint(u64::from(*v), buf),
            Self::String(v) => {
                encode_varint(v.len() as u64, buf);
                buf.put_slice(v.as_bytes());
            }
            Self::Bytes(v) => {
                encode_varint(v.len() as u64, buf);
                buf.put_slice(v);
            }
        }
    }

    /// Write the value as field `tag`.
    pub fn encode<B: BufMut>(&self, tag: u32, buf: &mut B) {
        encode_key(tag, self.kind().wire_type(), buf);
        self.encode_raw(buf);
    }

    /// Read a value of `kind` written by [encode_raw](Self::encode_raw).
    pub fn decode_raw(kind: ScalarKind, buf: &mut &[u8]) -> Result<Self, CodecError> {
        Ok(match kind {
            ScalarKind::Int32 => Self::Int32(varint(buf)? as i32),
            ScalarKind::Int64 => Self::Int64(varint(buf)? as i64),
            ScalarKind::Uint32 => Self::Uint32(varint(buf)? as u32),
            ScalarKind::Uint64 => Self::Uint64(varint(buf)?),
            ScalarKind::Sint32 => Self::Sint32(unzigzag(varint(buf)?) as i32),
            ScalarKind::Sint64 => Self::Sint64(unzigzag(varint(buf)?)),
            ScalarKind::Bool => Self::Bool(varint(buf)? != 0),
            ScalarKind::Fixed32 => {
                need(buf, 4)?;
                Self::Fixed32(buf.get_u32_le())
            }
            ScalarKind::Sfixed32 => {
                need(buf, 4)?;
                Self::Sfixed32(buf.get_i32_le())
            }
            ScalarKind::Float => {
                need(buf, 4)?;
                Self::Float(buf.get_f32_le())
            }
            ScalarKind::Fixed64 => {
                need(buf, 8)?;
                Self::Fixed64(buf.get_u64_le())
            }
            ScalarKind::Sfixed64 => {
                need(buf, 8)?;
                Self::Sfixed64(buf.get_i64_le())
            }
            ScalarKind::Double => {
                need(buf, 8)?;
                Self::Double(buf.get_f64_le())
            }
            ScalarKind::String => {
                let raw = take_len_delimited(buf)?;
                Self::String(String::from_utf8(raw.to_vec()).map_err(|_| {
                    CodecError::Deserialization("string is not valid UTF-8".to_string())
                })?)
            }
            ScalarKind::Bytes => Self::Bytes(take_len_delimited(buf)?.to_vec()),
        })
    }

    pub fn to_json(&self, shape: &DecodeShape) -> Value {
        let value = match self {
            Self::Double(v) => float_to_json(*v),
            Self::Float(v) => float_to_json(f64::from(*v)),
            Self::Int32(v) | Self::Sint32(v) | Self::Sfixed32(v) => Value::from(*v),
            Self::Uint32(v) | Self::Fixed32(v) => Value::from(*v),
            Self::Int64(v) | Self::Sint64(v) | Self::Sfixed64(v) => Value::from(*v),
            Self::Uint64(v) | Self::Fixed64(v) => Value::from(*v),
            Self::Bool(v) => Value::Bool(*v),
            Self::String(v) => Value::String(v.clone()),
            Self::Bytes(v) => match shape.bytes {
                BytesShape::Array => Value::Array(v.iter().map(|&byte| Value::from(byte)).collect()),
                BytesShape::Base64 => Value::String(STANDARD.encode(v)),
            },
        };
        match shape.longs {
            LongShape::String if self.kind().is_long() => Value::String(value.to_string()),
            _ => value,
        }
    }

    /// The value as a JSON object key.
    pub fn to_key(&self) -> String {
        match self {
            Self::String(v) => v.clone(),
            other => match other.to_json(&DecodeShape::default()) {
                Value::String(s) => s,
                value => value.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn round_trip(kind: ScalarKind, value: Value) -> Value {
        let scalar = ScalarValue::from_json(kind, &value).unwrap();
        let mut buf = Vec::new();
        scalar.encode_raw(&mut buf);
        let mut slice = buf.as_slice();
        let decoded = ScalarValue::decode_raw(kind, &mut slice).unwrap();
        assert!(slice.is_empty());
        decoded.to_json(&DecodeShape::default())
    }

    #[test]
    fn integers() {
        assert_eq!(round_trip(ScalarKind::Int32, json!(-5)), json!(-5));
        assert_eq!(round_trip(ScalarKind::Sint32, json!(-5)), json!(-5));
        assert_eq!(round_trip(ScalarKind::Sfixed32, json!(-5)), json!(-5));
        assert_eq!(round_trip(ScalarKind::Uint32, json!(u32::MAX)), json!(u32::MAX));
        assert_eq!(round_trip(ScalarKind::Int64, json!(i64::MIN)), json!(i64::MIN));
        assert_eq!(round_trip(ScalarKind::Sint64, json!("-77")), json!(-77));
        assert_eq!(round_trip(ScalarKind::Fixed64, json!(u64::MAX)), json!(u64::MAX));
    }

    #[test]
    fn negative_int32_takes_ten_bytes() {
        let mut buf = Vec::new();
        ScalarValue::Int32(-1).encode_raw(&mut buf);
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn zigzag() {
        assert_eq!(zigzag32(0), 0);
        assert_eq!(zigzag32(-1), 1);
        assert_eq!(zigzag32(1), 2);
        assert_eq!(zigzag64(-2), 3);
        assert_eq!(unzigzag(3), -2);
        assert_eq!(unzigzag(zigzag64(i64::MIN)), i64::MIN);
    }

    #[test]
    fn range_checks() {
        assert!(ScalarValue::from_json(ScalarKind::Int32, &json!(1u64 << 40)).is_err());
        assert!(ScalarValue::from_json(ScalarKind::Uint32, &json!(-1)).is_err());
        assert!(ScalarValue::from_json(ScalarKind::Int64, &json!(1.5)).is_err());
        assert!(ScalarValue::from_json(ScalarKind::Bool, &json!(1)).is_err());
        assert!(ScalarValue::from_json(ScalarKind::Bytes, &json!([256])).is_err());
    }

    #[test]
    fn floats() {
        assert_eq!(round_trip(ScalarKind::Double, json!(1.25)), json!(1.25));
        assert_eq!(round_trip(ScalarKind::Float, json!(0.5)), json!(0.5));
        assert_eq!(round_trip(ScalarKind::Double, json!("NaN")), json!("NaN"));
        assert_eq!(
            round_trip(ScalarKind::Float, json!("-Infinity")),
            json!("-Infinity")
        );
    }

    #[test]
    fn bytes_shapes() {
        let scalar = ScalarValue::from_json(ScalarKind::Bytes, &json!("AQID")).unwrap();
        assert_eq!(scalar, ScalarValue::Bytes(vec![1, 2, 3]));
        assert_eq!(scalar.to_json(&DecodeShape::default()), json!([1, 2, 3]));
        let shape = DecodeShape {
            bytes: BytesShape::Base64,
            ..Default::default()
        };
        assert_eq!(scalar.to_json(&shape), json!("AQID"));
    }

    #[test]
    fn longs_as_strings() {
        let shape = DecodeShape {
            longs: LongShape::String,
            ..Default::default()
        };
        assert_eq!(ScalarValue::Uint64(u64::MAX).to_json(&shape), json!("18446744073709551615"));
        assert_eq!(ScalarValue::Int32(7).to_json(&shape), json!(7));
    }

    #[test]
    fn map_keys() {
        assert_eq!(
            ScalarValue::from_key(ScalarKind::Int32, "-3").unwrap(),
            ScalarValue::Int32(-3)
        );
        assert_eq!(
            ScalarValue::from_key(ScalarKind::Bool, "true").unwrap(),
            ScalarValue::Bool(true)
        );
        assert!(ScalarValue::from_key(ScalarKind::Uint32, "x").is_err());
        assert_eq!(ScalarValue::Int64(-3).to_key(), "-3");
        assert_eq!(ScalarValue::Bool(false).to_key(), "false");
    }

    #[test]
    fn truncated_input() {
        let mut slice: &[u8] = &[1, 2];
        assert!(ScalarValue::decode_raw(ScalarKind::Fixed32, &mut slice).is_err());
        let mut slice: &[u8] = &[5, b'a'];
        assert!(ScalarValue::decode_raw(ScalarKind::String, &mut slice).is_err());
    }
}
