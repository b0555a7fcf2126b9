//! Compiled serializers keyed by function path.

use super::{compile, CompiledSerializer, FunctionSchema, SchemaError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Serializers compiled at registration time, shared read-only while serving.
#[derive(Debug, Default, Clone)]
pub struct SerializerRegistry {
    serializers: HashMap<String, Arc<CompiledSerializer>>,
}

impl SerializerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `schema.response` and store it under `name`, replacing any previous entry.
    pub fn compile_and_insert(
        &mut self,
        name: impl Into<String>,
        schema: &FunctionSchema,
    ) -> Result<Arc<CompiledSerializer>, SchemaError> {
        let name = name.into();
        let serializer = Arc::new(compile(&schema.response)?);
        debug!(function = %name, "compiled response serializer");
        self.serializers.insert(name, Arc::clone(&serializer));
        Ok(serializer)
    }

    /// Drop the serializer for `name`, if any.
    pub fn remove(&mut self, name: &str) -> Option<Arc<CompiledSerializer>> {
        self.serializers.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<CompiledSerializer>> {
        self.serializers.get(name)
    }

    pub fn len(&self) -> usize {
        self.serializers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.serializers.is_empty()
    }
}
