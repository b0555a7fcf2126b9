//! Schema-driven response serializers.
//!
//! A function registered with a response schema gets a [`CompiledSerializer`]
//! built once at registration time. Compilation validates the schema with
//! `jsonschema` so that a broken schema fails during wiring, never mid-traffic.

mod plan;
mod registry;

pub use registry::SerializerRegistry;

use crate::envelope::{create_success_schema, Envelope};
use plan::Node;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Schemas attached to a function at registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSchema {
    /// JSON Schema of the `data` field of a success envelope.
    pub response: Value,
}

impl FunctionSchema {
    pub fn new(response: Value) -> Self {
        Self { response }
    }
}

/// A response schema could not be compiled.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The schema is not valid JSON Schema.
    #[error("invalid JSON schema: {0}")]
    Invalid(String),
    /// A keyword has a shape the compiler cannot use.
    #[error("malformed schema at `{path}`: {reason}")]
    Malformed { path: String, reason: String },
    /// `type` names something other than a JSON Schema primitive type.
    #[error("unsupported type `{name}` at `{path}`")]
    UnknownType { path: String, name: String },
    /// The top-level schema describes something other than an object.
    #[error("response data schema must describe an object, found type `{0}`")]
    NotAnObject(String),
}

/// A compiled serializer was handed a value it cannot encode.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("compiled serializer only accepts success envelopes")]
    NotSuccess,
    #[error("expected {expected} at `{path}`")]
    TypeMismatch { path: String, expected: &'static str },
    #[error("missing required property `{path}`")]
    MissingRequired { path: String },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl SerializeError {
    /// Prefix the error location with `segment`.
    pub(crate) fn nested(self, segment: &str) -> Self {
        let join = |path: String| {
            if path.is_empty() {
                segment.to_string()
            } else if path.starts_with('[') {
                format!("{}{}", segment, path)
            } else {
                format!("{}.{}", segment, path)
            }
        };

        match self {
            SerializeError::TypeMismatch { path, expected } => SerializeError::TypeMismatch {
                path: join(path),
                expected,
            },
            SerializeError::MissingRequired { path } => {
                SerializeError::MissingRequired { path: join(path) }
            }
            other => other,
        }
    }
}

const SUCCESS_PREFIX: &[u8] = br#"{"success":true,"data":"#;

/// Serializer for the success envelope of one function, derived from its schema.
#[derive(Debug, Clone)]
pub struct CompiledSerializer {
    data: Node,
    schema: Value,
}

impl CompiledSerializer {
    /// Full success-envelope schema this serializer was compiled from.
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Encode a success envelope. Failure envelopes are rejected.
    pub fn serialize(&self, envelope: &Envelope) -> Result<String, SerializeError> {
        let Envelope::Success { data } = envelope else {
            return Err(SerializeError::NotSuccess);
        };

        let mut out = Vec::with_capacity(128);
        out.extend_from_slice(SUCCESS_PREFIX);
        self.data
            .write(data, &mut out)
            .map_err(|e| e.nested("data"))?;
        out.push(b'}');

        Ok(String::from_utf8(out)?)
    }
}

/// Compile the `data` schema of a function into a [`CompiledSerializer`].
///
/// Deterministic and free of side effects: the same schema always yields an
/// equivalent serializer.
pub fn compile(data_schema: &Value) -> Result<CompiledSerializer, SchemaError> {
    if !data_schema.is_object() {
        return Err(SchemaError::Malformed {
            path: "data".to_string(),
            reason: "schema must be a JSON object".to_string(),
        });
    }

    let schema = create_success_schema(data_schema);
    jsonschema::validator_for(&schema).map_err(|e| SchemaError::Invalid(e.to_string()))?;

    let data = Node::compile(data_schema, "data")?;
    match &data {
        Node::Object(_) | Node::Any => {}
        Node::Nullable(inner) if matches!(**inner, Node::Object(_)) => {}
        Node::Nullable(inner) => {
            return Err(SchemaError::NotAnObject(format!("{}|null", inner.type_name())))
        }
        other => return Err(SchemaError::NotAnObject(other.type_name().to_string())),
    }

    Ok(CompiledSerializer { data, schema })
}
