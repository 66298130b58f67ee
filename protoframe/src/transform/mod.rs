//! The transform stage, converting between records and the wire in one
//! direction fixed at construction.

mod decoder;
mod encoder;

pub use decoder::{RecordDecoder, Records};
pub use encoder::RecordEncoder;
use tracing::debug;

use crate::{
    config::{CodecOptions, Direction, TransformConfig},
    dynamic::DynamicCodec,
    error::ConfigError,
    record_codec::RecordCodec,
    schema::SchemaRegistry,
};

/// A stage in one of its two modes.
#[derive(Debug)]
pub enum Transform<C> {
    Encode(RecordEncoder<C>),
    Decode(RecordDecoder<C>),
}

impl<C: RecordCodec> Transform<C> {
    /// Build the mode named by `options.direction()` around `codec`.
    pub fn new(codec: C, options: &CodecOptions) -> Self {
        match options.direction() {
            Direction::Encode => Self::Encode(RecordEncoder::from_options(codec, options)),
            Direction::Decode => Self::Decode(RecordDecoder::from_options(codec, options)),
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Self::Encode(_) => Direction::Encode,
            Self::Decode(_) => Direction::Decode,
        }
    }

    pub fn into_encoder(self) -> Option<RecordEncoder<C>> {
        match self {
            Self::Encode(encoder) => Some(encoder),
            Self::Decode(_) => None,
        }
    }

    pub fn into_decoder(self) -> Option<RecordDecoder<C>> {
        match self {
            Self::Encode(_) => None,
            Self::Decode(decoder) => Some(decoder),
        }
    }
}

impl Transform<DynamicCodec> {
    /// Load the schema named by `options` through `registry` and build the
    /// stage.
    pub fn from_options(
        options: &CodecOptions,
        registry: &SchemaRegistry,
    ) -> Result<Self, ConfigError> {
        let codec =
            DynamicCodec::load(registry, options.schema_source(), options.message_type())?;
        debug!(
            "Built {:?} transform for {} from {}",
            options.direction(),
            options.message_type(),
            options.schema_source()
        );
        Ok(Self::new(codec, options))
    }

    /// Validate `config`, then [from_options](Self::from_options).
    pub fn from_config(
        config: TransformConfig,
        registry: &SchemaRegistry,
    ) -> Result<Self, ConfigError> {
        Self::from_options(&config.build()?, registry)
    }
}
