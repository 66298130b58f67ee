use std::{
    collections::HashMap,
    fs,
    sync::{Arc, RwLock},
};

use tracing::debug;

use crate::{
    error::ConfigError,
    schema::loader::{load_json, load_proto},
    Schema,
};

/// Maps a schema source to its loaded [Schema].
///
/// Sources registered in memory take precedence. Any other source is read
/// from the filesystem and cached on first use: a `.proto` file when the path
/// ends in `.proto`, otherwise a JSON reflection document. Cloning a registry
/// shares its cache.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: Arc<RwLock<HashMap<String, Arc<Schema>>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `schema` available under `source`, replacing any earlier schema.
    pub fn register(&self, source: impl Into<String>, schema: Schema) {
        self.write().insert(source.into(), Arc::new(schema));
    }

    /// Parse and register a JSON reflection document under `source`.
    pub fn register_json(&self, source: impl Into<String>, json: &str) -> Result<(), ConfigError> {
        let source = source.into();
        let schema = load_json(&source, json)?;
        self.register(source, schema);
        Ok(())
    }

    /// Parse and register the text of a `.proto` file under `source`.
    pub fn register_proto(&self, source: impl Into<String>, text: &str) -> Result<(), ConfigError> {
        let source = source.into();
        let schema = load_proto(&source, text)?;
        self.register(source, schema);
        Ok(())
    }

    /// The schema for `source`, loading it from the filesystem if it isn't
    /// registered yet.
    pub fn load(&self, source: &str) -> Result<Arc<Schema>, ConfigError> {
        if let Some(schema) = self.read().get(source) {
            return Ok(Arc::clone(schema));
        }
        debug!("Loading schema from {}", source);
        let text = fs::read_to_string(source).map_err(|error| ConfigError::SchemaIo {
            source_name: source.to_string(),
            error,
        })?;
        let schema = if source.ends_with(".proto") {
            load_proto(source, &text)?
        } else {
            load_json(source, &text)?
        };
        let schema = Arc::new(schema);
        Ok(Arc::clone(
            self.write().entry(source.to_string()).or_insert(schema),
        ))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<Schema>>> {
        // a panic while holding the lock can't leave the map half-written
        self.schemas.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<Schema>>> {
        self.schemas
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
