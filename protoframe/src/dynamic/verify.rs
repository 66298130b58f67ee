use serde_json::Value;

use super::{
    at, check_depth, child_path, enum_number, lookup_enum, lookup_message, scalar::ScalarValue,
};
use crate::schema::{FieldDescriptor, FieldType, MessageDescriptor, Schema};

/// Check that `value` could be encoded as `message`.
///
/// Stricter than encoding: enum numbers must be declared and at most one
/// member of each oneof may be set.
pub(crate) fn verify_message(
    schema: &Schema,
    message: &MessageDescriptor,
    value: &Value,
    path: &str,
    depth: u32,
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
            Some(value) => verify_field(schema, field, value, &field_path, depth)?,
        }
    }
    for oneof in &message.oneofs {
        let set: Vec<&str> = oneof
            .fields
            .iter()
            .filter(|member| !matches!(object.get(member.as_str()), None | Some(Value::Null)))
            .map(String::as_str)
            .collect();
        if set.len() > 1 {
            return Err(at(
                &child_path(path, &oneof.name),
                format!("multiple values: {}", set.join(", ")),
            ));
        }
    }
    Ok(())
}

fn verify_field(
    schema: &Schema,
    field: &FieldDescriptor,
    value: &Value,
    path: &str,
    depth: u32,
) -> Result<(), String> {
    match &field.field_type {
        FieldType::Map { key, value: value_type } => {
            let entries = value
                .as_object()
                .ok_or_else(|| at(path, "object expected"))?;
            for (key_text, entry) in entries {
                let entry_path = format!("{}[{}]", path, key_text);
                ScalarValue::from_key(*key, key_text).map_err(|err| at(&entry_path, err))?;
                verify_single(schema, value_type, entry, &entry_path, depth)?;
            }
            Ok(())
        }
        item_type if field.is_repeated() => {
            let items = value
                .as_array()
                .ok_or_else(|| at(path, "array expected"))?;
            items.iter().enumerate().try_for_each(|(index, item)| {
                verify_single(schema, item_type, item, &format!("{}[{}]", path, index), depth)
            })
        }
        field_type => verify_single(schema, field_type, value, path, depth),
    }
}

fn verify_single(
    schema: &Schema,
    field_type: &FieldType,
    value: &Value,
    path: &str,
    depth: u32,
) -> Result<(), String> {
    match field_type {
        FieldType::Scalar(kind) => ScalarValue::from_json(*kind, value)
            .map(drop)
            .map_err(|err| at(path, err)),
        FieldType::Enum(name) => {
            let descriptor = lookup_enum(schema, name)?;
            let number = enum_number(descriptor, value).map_err(|err| at(path, err))?;
            if descriptor.contains(number) {
                Ok(())
            } else {
                Err(at(
                    path,
                    format!("{} has no value {}", descriptor.name, number),
                ))
            }
        }
        FieldType::Message(name) => {
            verify_message(schema, lookup_message(schema, name)?, value, path, depth + 1)
        }
        FieldType::Map { .. } => Err(at(path, "map values can't be maps")),
    }
}
