use std::collections::BTreeMap;

use prost::encoding::{check_wire_type, decode_key, decode_varint, skip_field, DecodeContext, WireType};
use serde_json::{Map, Value};

use super::{
    encode::is_packable, enum_to_json, lookup_enum, lookup_message, scalar::take_len_delimited,
    scalar::ScalarValue, MAX_DEPTH,
};
use crate::{
    config::DecodeShape,
    error::{from_decode_error, CodecError},
    schema::{FieldDescriptor, FieldType, MessageDescriptor, ScalarKind, Schema},
};

fn malformed(message: impl Into<String>) -> CodecError {
    CodecError::Deserialization(message.into())
}

/// Read `buf` as `message`, shaping the result with `shape`.
///
/// Unknown fields are skipped. Packed and unpacked encodings are both
/// accepted for repeated scalars. A singular message field seen more than
/// once is merged, and setting a oneof member clears its siblings.
pub(crate) fn decode_message(
    schema: &Schema,
    message: &MessageDescriptor,
    mut buf: &[u8],
    shape: &DecodeShape,
    depth: u32,
) -> Result<Value, CodecError> {
    if depth > MAX_DEPTH {
        return Err(malformed("recursion limit reached"));
    }
    let mut object = Map::new();
    // raw bytes of singular message fields, merged by concatenation
    let mut pending: BTreeMap<u32, Vec<u8>> = BTreeMap::new();

    while !buf.is_empty() {
        let (tag, wire_type) = decode_key(&mut buf).map_err(from_decode_error)?;
        let field = match message.field_by_tag(tag) {
            Some(field) => field,
            None => {
                skip_field(wire_type, tag, &mut buf, DecodeContext::default())
                    .map_err(from_decode_error)?;
                continue;
            }
        };
        if field.oneof.is_some() {
            clear_siblings(message, field, &mut object, &mut pending);
        }
        match &field.field_type {
            FieldType::Map { key, value } => {
                expect_wire_type(WireType::LengthDelimited, wire_type)?;
                let entry = take_len_delimited(&mut buf)?;
                let (key, value) = decode_entry(schema, *key, value, entry, shape, depth)?;
                match object
                    .entry(field.name.clone())
                    .or_insert_with(|| Value::Object(Map::new()))
                {
                    Value::Object(entries) => {
                        entries.insert(key, value);
                    }
                    _ => return Err(malformed(format!("{} is not a map", field.name))),
                }
            }
            item_type if field.is_repeated() => {
                let mut items = Vec::new();
                if wire_type == WireType::LengthDelimited && is_packable(item_type) {
                    let mut packed = take_len_delimited(&mut buf)?;
                    while !packed.is_empty() {
                        items.push(decode_raw(schema, item_type, &mut packed, shape, depth)?);
                    }
                } else {
                    expect_wire_type(wire_type_of(item_type), wire_type)?;
                    items.push(decode_raw(schema, item_type, &mut buf, shape, depth)?);
                }
                match object
                    .entry(field.name.clone())
                    .or_insert_with(|| Value::Array(Vec::new()))
                {
                    Value::Array(existing) => existing.extend(items),
                    _ => return Err(malformed(format!("{} is not repeated", field.name))),
                }
            }
            FieldType::Message(_) => {
                expect_wire_type(WireType::LengthDelimited, wire_type)?;
                let bytes = take_len_delimited(&mut buf)?;
                pending.entry(tag).or_default().extend_from_slice(bytes);
            }
            field_type => {
                expect_wire_type(wire_type_of(field_type), wire_type)?;
                let value = decode_raw(schema, field_type, &mut buf, shape, depth)?;
                object.insert(field.name.clone(), value);
            }
        }
    }

    for (tag, bytes) in pending {
        let Some(field) = message.field_by_tag(tag) else {
            continue;
        };
        let value = decode_nested(schema, field, &bytes, shape, depth)?;
        object.insert(field.name.clone(), value);
    }

    if let Some(missing) = message
        .fields
        .iter()
        .find(|field| field.is_required() && !object.contains_key(&field.name))
    {
        return Err(malformed(format!(
            "missing required field {}.{}",
            message.name, missing.name
        )));
    }

    apply_shape(schema, message, &mut object, shape)?;
    Ok(Value::Object(object))
}

fn decode_nested(
    schema: &Schema,
    field: &FieldDescriptor,
    bytes: &[u8],
    shape: &DecodeShape,
    depth: u32,
) -> Result<Value, CodecError> {
    match &field.field_type {
        FieldType::Message(name) => {
            let descriptor = lookup_message(schema, name).map_err(malformed)?;
            decode_message(schema, descriptor, bytes, shape, depth + 1)
        }
        _ => Err(malformed(format!("{} is not a message", field.name))),
    }
}

fn clear_siblings(
    message: &MessageDescriptor,
    field: &FieldDescriptor,
    object: &mut Map<String, Value>,
    pending: &mut BTreeMap<u32, Vec<u8>>,
) {
    let siblings = message
        .fields
        .iter()
        .filter(|other| other.oneof == field.oneof && other.tag != field.tag);
    for sibling in siblings {
        object.remove(&sibling.name);
        pending.remove(&sibling.tag);
    }
}

fn expect_wire_type(expected: WireType, actual: WireType) -> Result<(), CodecError> {
    check_wire_type(expected, actual).map_err(from_decode_error)
}

fn wire_type_of(field_type: &FieldType) -> WireType {
    match field_type {
        FieldType::Scalar(kind) => kind.wire_type(),
        FieldType::Enum(_) => WireType::Varint,
        FieldType::Message(_) | FieldType::Map { .. } => WireType::LengthDelimited,
    }
}

/// Read one value of `field_type` without its key.
fn decode_raw(
    schema: &Schema,
    field_type: &FieldType,
    buf: &mut &[u8],
    shape: &DecodeShape,
    depth: u32,
) -> Result<Value, CodecError> {
    match field_type {
        FieldType::Scalar(kind) => Ok(ScalarValue::decode_raw(*kind, buf)?.to_json(shape)),
        FieldType::Enum(name) => {
            let descriptor = lookup_enum(schema, name).map_err(malformed)?;
            let number = decode_varint(buf).map_err(from_decode_error)? as i32;
            Ok(enum_to_json(descriptor, number, shape))
        }
        FieldType::Message(name) => {
            let descriptor = lookup_message(schema, name).map_err(malformed)?;
            let bytes = take_len_delimited(buf)?;
            decode_message(schema, descriptor, bytes, shape, depth + 1)
        }
        FieldType::Map { .. } => Err(malformed("map values can't be maps")),
    }
}

/// Read a map entry. A missing key or value takes its default.
fn decode_entry(
    schema: &Schema,
    key_kind: ScalarKind,
    value_type: &FieldType,
    mut entry: &[u8],
    shape: &DecodeShape,
    depth: u32,
) -> Result<(String, Value), CodecError> {
    let mut key = None;
    let mut value = None;
    while !entry.is_empty() {
        let (tag, wire_type) = decode_key(&mut entry).map_err(from_decode_error)?;
        match tag {
            1 => {
                expect_wire_type(key_kind.wire_type(), wire_type)?;
                key = Some(ScalarValue::decode_raw(key_kind, &mut entry)?);
            }
            2 => {
                expect_wire_type(wire_type_of(value_type), wire_type)?;
                value = Some(decode_raw(schema, value_type, &mut entry, shape, depth)?);
            }
            _ => skip_field(wire_type, tag, &mut entry, DecodeContext::default())
                .map_err(from_decode_error)?,
        }
    }
    let key = key.unwrap_or_else(|| ScalarValue::default_for(key_kind));
    let value = match value {
        Some(value) => value,
        None => match value_type {
            FieldType::Message(name) => {
                let descriptor = lookup_message(schema, name).map_err(malformed)?;
                decode_message(schema, descriptor, &[], shape, depth + 1)?
            }
            other => default_json(schema, other, shape)?,
        },
    };
    Ok((key.to_key(), value))
}

fn default_json(
    schema: &Schema,
    field_type: &FieldType,
    shape: &DecodeShape,
) -> Result<Value, CodecError> {
    Ok(match field_type {
        FieldType::Scalar(kind) => ScalarValue::default_for(*kind).to_json(shape),
        FieldType::Enum(name) => {
            let descriptor = lookup_enum(schema, name).map_err(malformed)?;
            enum_to_json(descriptor, descriptor.default_value(), shape)
        }
        FieldType::Message(_) => Value::Null,
        FieldType::Map { .. } => Value::Object(Map::new()),
    })
}

fn apply_shape(
    schema: &Schema,
    message: &MessageDescriptor,
    object: &mut Map<String, Value>,
    shape: &DecodeShape,
) -> Result<(), CodecError> {
    for field in &message.fields {
        if object.contains_key(&field.name) {
            continue;
        }
        let value = if field.is_map() {
            (shape.objects || shape.defaults).then(|| Value::Object(Map::new()))
        } else if field.is_repeated() {
            (shape.arrays || shape.defaults).then(|| Value::Array(Vec::new()))
        } else if field.oneof.is_none() && shape.defaults {
            Some(default_json(schema, &field.field_type, shape)?)
        } else {
            None
        };
        if let Some(value) = value {
            object.insert(field.name.clone(), value);
        }
    }
    if shape.oneofs {
        for oneof in &message.oneofs {
            if let Some(member) = oneof.fields.iter().find(|member| object.contains_key(*member)) {
                object.insert(oneof.name.clone(), Value::String(member.clone()));
            }
        }
    }
    Ok(())
}
