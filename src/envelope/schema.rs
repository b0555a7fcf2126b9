//! Schema templates for the envelope.

use serde_json::{json, Value};

/// Wrap a `data` schema into the schema of a full success envelope.
pub fn create_success_schema(data_schema: &Value) -> Value {
    json!({
        "title": "Success response schema",
        "type": "object",
        "properties": {
            "success": { "type": "boolean" },
            "data": data_schema,
        },
        "required": ["success", "data"],
    })
}
