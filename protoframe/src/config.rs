//! Stage configuration.
//!
//! [TransformConfig] is the caller-facing options struct. Every field has a
//! default, so a JSON document only needs to name what it overrides. It is
//! validated once in to an immutable [CodecOptions].

use serde::{Deserialize, Serialize};

use crate::{constants::DEFAULT_MAX_FRAME_SIZE, error::ConfigError};

/// Which way a stage converts.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Records in, bytes out.
    #[default]
    Encode,
    /// Bytes in, records out.
    Decode,
}

/// How enum fields appear in decoded records.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnumShape {
    #[default]
    Name,
    Number,
}

/// How 64 bit integers appear in decoded records.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LongShape {
    #[default]
    Number,
    /// Decimal strings, for consumers that can't hold a full `u64`.
    String,
}

/// How `bytes` fields appear in decoded records.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BytesShape {
    /// An array of numbers.
    #[default]
    Array,
    Base64,
}

/// Representational choices applied when producing a record from bytes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeShape {
    pub enums: EnumShape,
    pub longs: LongShape,
    pub bytes: BytesShape,
    /// Populate absent fields with their default values.
    pub defaults: bool,
    /// Populate absent repeated fields with `[]`, even without `defaults`.
    pub arrays: bool,
    /// Populate absent map fields with `{}`, even without `defaults`.
    pub objects: bool,
    /// Add a field per oneof naming the member which is set.
    pub oneofs: bool,
}

impl Default for DecodeShape {
    fn default() -> Self {
        Self {
            enums: EnumShape::Name,
            longs: LongShape::Number,
            bytes: BytesShape::Array,
            defaults: true,
            arrays: true,
            objects: true,
            oneofs: true,
        }
    }
}

impl DecodeShape {
    /// Only the fields present on the wire, enums and longs as numbers.
    pub fn minimal() -> Self {
        Self {
            enums: EnumShape::Number,
            longs: LongShape::Number,
            bytes: BytesShape::Array,
            defaults: false,
            arrays: false,
            objects: false,
            oneofs: false,
        }
    }
}

/// Construction options, merged over defaults.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransformConfig {
    pub direction: Direction,
    /// Verify records before encoding them.
    pub verify: bool,
    /// Where the schema is loaded from: a `.proto` file, a JSON reflection
    /// document, or a name registered with the [SchemaRegistry](crate::SchemaRegistry).
    pub schema_source: Option<String>,
    /// Fully qualified name of the message within the schema.
    pub message_type: Option<String>,
    /// Length-prefix every message. Without it, each encoded record and each
    /// decoded chunk is exactly one message.
    #[serde(alias = "forStream")]
    pub framed: bool,
    pub decode_shape: DecodeShape,
    pub max_frame_size: usize,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            direction: Direction::Encode,
            verify: true,
            schema_source: None,
            message_type: None,
            framed: true,
            decode_shape: DecodeShape::default(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl TransformConfig {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            ..Default::default()
        }
    }

    /// Parse options from JSON, e.g.
    /// `{"direction": "decode", "schemaSource": "binlog.json", "messageType": "binlog.BinLog"}`.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn schema_source(mut self, schema_source: impl Into<String>) -> Self {
        self.schema_source = Some(schema_source.into());
        self
    }

    pub fn message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }

    pub fn framed(mut self, framed: bool) -> Self {
        self.framed = framed;
        self
    }

    pub fn decode_shape(mut self, decode_shape: DecodeShape) -> Self {
        self.decode_shape = decode_shape;
        self
    }

    pub fn max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Validate in to [CodecOptions].
    pub fn build(self) -> Result<CodecOptions, ConfigError> {
        let schema_source = self
            .schema_source
            .ok_or(ConfigError::MissingSchemaSource)?;
        let message_type = self.message_type.ok_or(ConfigError::MissingMessageType)?;
        if self.max_frame_size == 0 {
            return Err(ConfigError::ZeroMaxFrameSize);
        }
        Ok(CodecOptions {
            direction: self.direction,
            verify: self.verify,
            schema_source,
            message_type,
            framed: self.framed,
            decode_shape: self.decode_shape,
            max_frame_size: self.max_frame_size,
        })
    }
}

/// Validated, immutable options of one stage.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CodecOptions {
    direction: Direction,
    verify: bool,
    schema_source: String,
    message_type: String,
    framed: bool,
    decode_shape: DecodeShape,
    max_frame_size: usize,
}

impl CodecOptions {
    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn verify(&self) -> bool {
        self.verify
    }

    pub fn schema_source(&self) -> &str {
        &self.schema_source
    }

    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    pub fn framed(&self) -> bool {
        self.framed
    }

    pub fn decode_shape(&self) -> &DecodeShape {
        &self.decode_shape
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl TryFrom<TransformConfig> for CodecOptions {
    type Error = ConfigError;

    fn try_from(config: TransformConfig) -> Result<Self, Self::Error> {
        config.build()
    }
}
