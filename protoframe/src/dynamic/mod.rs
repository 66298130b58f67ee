//! A [RecordCodec] driven by a runtime-loaded [Schema].
//!
//! Records are `serde_json::Value` objects keyed by field name. Absent and
//! `null` fields are treated the same. Keys which name no field are ignored,
//! so a decoded record (which may carry oneof discriminators) can be encoded
//! again as is.

mod decode;
mod encode;
mod scalar;
mod verify;

use std::sync::Arc;

use bytes::BytesMut;
use serde_json::Value;

use crate::{
    config::{DecodeShape, EnumShape},
    error::{CodecError, ConfigError},
    record_codec::RecordCodec,
    schema::{EnumDescriptor, MessageDescriptor, Schema, SchemaRegistry},
};

/// Nesting deeper than this is rejected rather than risking the stack.
const MAX_DEPTH: u32 = 100;

/// Encodes and decodes one message type of a [Schema].
#[derive(Debug, Clone)]
pub struct DynamicCodec {
    schema: Arc<Schema>,
    message_type: String,
}

impl DynamicCodec {
    /// Fails with [ConfigError::UnknownMessageType] if `message_type` isn't
    /// a message of `schema`.
    pub fn new(schema: Arc<Schema>, message_type: &str) -> Result<Self, ConfigError> {
        let message_type = schema
            .message(message_type)
            .ok_or_else(|| ConfigError::UnknownMessageType(message_type.to_string()))?
            .name
            .clone();
        Ok(Self {
            schema,
            message_type,
        })
    }

    /// Load `source` through `registry` and bind `message_type`.
    pub fn load(
        registry: &SchemaRegistry,
        source: &str,
        message_type: &str,
    ) -> Result<Self, ConfigError> {
        Self::new(registry.load(source)?, message_type)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    fn descriptor(&self) -> Result<&MessageDescriptor, String> {
        lookup_message(&self.schema, &self.message_type)
    }
}

impl RecordCodec for DynamicCodec {
    type Record = Value;

    fn verify(&self, record: &Value) -> Result<(), CodecError> {
        let descriptor = self.descriptor().map_err(CodecError::Verification)?;
        verify::verify_message(&self.schema, descriptor, record, "", 0)
            .map_err(CodecError::Verification)
    }

    fn serialize(&self, record: &Value, buf: &mut BytesMut) -> Result<(), CodecError> {
        let descriptor = self.descriptor().map_err(CodecError::Serialization)?;
        encode::encode_message(&self.schema, descriptor, record, "", 0, buf)
            .map_err(CodecError::Serialization)
    }

    fn deserialize(&self, payload: &[u8], shape: &DecodeShape) -> Result<Value, CodecError> {
        let descriptor = self.descriptor().map_err(CodecError::Deserialization)?;
        decode::decode_message(&self.schema, descriptor, payload, shape, 0)
    }
}

fn lookup_message<'a>(schema: &'a Schema, name: &str) -> Result<&'a MessageDescriptor, String> {
    schema
        .message(name)
        .ok_or_else(|| format!("no such message {}", name))
}

fn lookup_enum<'a>(schema: &'a Schema, name: &str) -> Result<&'a EnumDescriptor, String> {
    schema
        .enumeration(name)
        .ok_or_else(|| format!("no such enum {}", name))
}

/// Accepts a declared name or any `i32`.
fn enum_number(descriptor: &EnumDescriptor, value: &Value) -> Result<i32, String> {
    match value {
        Value::String(name) => descriptor
            .value_of(name)
            .ok_or_else(|| format!("{} has no value {:?}", descriptor.name, name)),
        Value::Number(number) => number
            .as_i64()
            .and_then(|number| i32::try_from(number).ok())
            .ok_or_else(|| "enum value expected".to_string()),
        _ => Err("enum value expected".to_string()),
    }
}

fn enum_to_json(descriptor: &EnumDescriptor, number: i32, shape: &DecodeShape) -> Value {
    match shape.enums {
        EnumShape::Name => descriptor
            .name_of(number)
            .map_or_else(|| Value::from(number), |name| Value::String(name.to_string())),
        EnumShape::Number => Value::from(number),
    }
}

fn child_path(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

fn at(path: &str, message: impl AsRef<str>) -> String {
    if path.is_empty() {
        message.as_ref().to_string()
    } else {
        format!("{}: {}", path, message.as_ref())
    }
}

fn check_depth(depth: u32) -> Result<(), String> {
    if depth > MAX_DEPTH {
        Err("recursion limit reached".to_string())
    } else {
        Ok(())
    }
}
