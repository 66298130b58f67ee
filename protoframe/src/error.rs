//! Error types, one per concern, plus [TransformError] which is what a
//! running stage reports for each unit of work.

use std::io;

use prost::DecodeError;
use thiserror::Error;

/// Convenience result type.
pub type TransformResult<T> = Result<T, TransformError>;

/// Raised while building a stage. A stage is never created when this occurs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no schema source defined in options (schemaSource)")]
    MissingSchemaSource,
    #[error("no message type defined in options (messageType)")]
    MissingMessageType,
    #[error("maxFrameSize must be greater than zero")]
    ZeroMaxFrameSize,
    #[error("invalid options: {0}")]
    InvalidOptions(#[from] serde_json::Error),
    #[error("failed to read schema {source_name}")]
    SchemaIo {
        source_name: String,
        #[source]
        error: io::Error,
    },
    #[error("failed to parse schema {source_name}: {error}")]
    SchemaParse {
        source_name: String,
        #[source]
        error: serde_json::Error,
    },
    #[error("failed to parse schema {source_name}: line {line}: {message}")]
    ProtoSyntax {
        source_name: String,
        line: usize,
        message: String,
    },
    #[error("invalid schema definition: {0}")]
    InvalidSchema(String),
    #[error("no such type: {0}")]
    UnknownMessageType(String),
}

/// A malformed or pathological frame on the wire.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("length prefix longer than {max} bytes")]
    PrefixTooLong { max: usize },
    #[error("length prefix overflows 64 bits")]
    LengthOverflow,
    #[error("frame of {length} bytes exceeds the maximum of {max} bytes")]
    FrameTooLarge { length: u64, max: usize },
    #[error("stream ended with {remaining} bytes of an incomplete frame")]
    Truncated { remaining: usize },
    #[error("frame assembler stopped after an earlier framing error")]
    Poisoned,
}

/// A failure of the record codec for a single record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("verification failed: {0}")]
    Verification(String),
    #[error("error serializing record: {0}")]
    Serialization(String),
    #[error("error deserializing record: {0}")]
    Deserialization(String),
}

pub(crate) fn from_decode_error(error: DecodeError) -> CodecError {
    CodecError::Deserialization(error.to_string())
}

/// Error reported by a transform stage for one record or chunk. The stage
/// stays usable unless the error is a [FramingError].
#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error("io error")]
    Io(#[from] io::Error),
}

impl TransformError {
    /// Whether the stage can no longer be trusted to produce output.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Codec(_))
    }
}
