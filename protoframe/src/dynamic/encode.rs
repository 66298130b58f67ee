use bytes::BufMut;
use prost::encoding::{encode_key, encode_varint, WireType};
use serde_json::Value;

use super::{
    at, check_depth, child_path, enum_number, lookup_enum, lookup_message, scalar::ScalarValue,
};
use crate::schema::{FieldDescriptor, FieldType, MessageDescriptor, Schema};

/// Write `value` as `message`. Every field present in `value` is written,
/// including explicit zero values.
pub(crate) fn encode_message<B: BufMut>(
    schema: &Schema,
    message: &MessageDescriptor,
    value: &Value,
    path: &str,
    depth: u32,
    buf: &mut B,
) -> Result<(), String> {
    check_depth(depth).map_err(|err| at(path, err))?;
    let object = value
        .as_object()
        .ok_or_else(|| at(path, "object expected"))?;
    for field in &message.fields {
        let field_path = child_path(path, &field.name);
        match object.get(&field.name) {
            None | Some(Value::Null) if field.is_required() => {
                return Err(at(&field_path, "missing required field"))
            }
            None | Some(Value::Null) => {}
            Some(value) => encode_field(schema, field, value, &field_path, depth, buf)?,
        }
    }
    Ok(())
}

fn encode_field<B: BufMut>(
    schema: &Schema,
    field: &FieldDescriptor,
    value: &Value,
    path: &str,
    depth: u32,
    buf: &mut B,
) -> Result<(), String> {
    match &field.field_type {
        FieldType::Map { key, value: value_type } => {
            let entries = value
                .as_object()
                .ok_or_else(|| at(path, "object expected"))?;
            for (key_text, entry) in entries {
                let entry_path = format!("{}[{}]", path, key_text);
                let key = ScalarValue::from_key(*key, key_text).map_err(|err| at(&entry_path, err))?;
                let mut entry_buf = Vec::new();
                key.encode(1, &mut entry_buf);
                encode_single(schema, value_type, 2, entry, &entry_path, depth, &mut entry_buf)?;
                put_len_delimited(field.tag, &entry_buf, buf);
            }
            Ok(())
        }
        item_type if field.is_repeated() => {
            let items = value
                .as_array()
                .ok_or_else(|| at(path, "array expected"))?;
            if field.packed && is_packable(item_type) {
                if items.is_empty() {
                    return Ok(());
                }
                let mut packed = Vec::new();
                for (index, item) in items.iter().enumerate() {
                    let item_path = format!("{}[{}]", path, index);
                    encode_packed_item(schema, item_type, item, &item_path, &mut packed)?;
                }
                put_len_delimited(field.tag, &packed, buf);
            } else {
                for (index, item) in items.iter().enumerate() {
                    let item_path = format!("{}[{}]", path, index);
                    encode_single(schema, item_type, field.tag, item, &item_path, depth, buf)?;
                }
            }
            Ok(())
        }
        field_type => encode_single(schema, field_type, field.tag, value, path, depth, buf),
    }
}

fn encode_single<B: BufMut>(
    schema: &Schema,
    field_type: &FieldType,
    tag: u32,
    value: &Value,
    path: &str,
    depth: u32,
    buf: &mut B,
) -> Result<(), String> {
    match field_type {
        FieldType::Scalar(kind) => {
            ScalarValue::from_json(*kind, value)
                .map_err(|err| at(path, err))?
                .encode(tag, buf);
        }
        FieldType::Enum(name) => {
            let descriptor = lookup_enum(schema, name)?;
            let number = enum_number(descriptor, value).map_err(|err| at(path, err))?;
            encode_key(tag, WireType::Varint, buf);
            encode_varint(number as i64 as u64, buf);
        }
        FieldType::Message(name) => {
            let descriptor = lookup_message(schema, name)?;
            let mut nested = Vec::new();
            encode_message(schema, descriptor, value, path, depth + 1, &mut nested)?;
            put_len_delimited(tag, &nested, buf);
        }
        FieldType::Map { .. } => return Err(at(path, "map values can't be maps")),
    }
    Ok(())
}

fn encode_packed_item<B: BufMut>(
    schema: &Schema,
    item_type: &FieldType,
    item: &Value,
    path: &str,
    buf: &mut B,
) -> Result<(), String> {
    match item_type {
        FieldType::Scalar(kind) => ScalarValue::from_json(*kind, item)
            .map_err(|err| at(path, err))?
            .encode_raw(buf),
        FieldType::Enum(name) => {
            let number = enum_number(lookup_enum(schema, name)?, item).map_err(|err| at(path, err))?;
            encode_varint(number as i64 as u64, buf);
        }
        _ => return Err(at(path, "not packable")),
    }
    Ok(())
}

pub(super) fn is_packable(field_type: &FieldType) -> bool {
    match field_type {
        FieldType::Scalar(kind) => kind.is_packable(),
        FieldType::Enum(_) => true,
        _ => false,
    }
}

fn put_len_delimited<B: BufMut>(tag: u32, bytes: &[u8], buf: &mut B) {
    encode_key(tag, WireType::LengthDelimited, buf);
    encode_varint(bytes.len() as u64, buf);
    buf.put_slice(bytes);
}
