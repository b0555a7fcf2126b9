//! JSON-safe projection of thrown values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;

/// What survives of an error or panic when it is embedded in `additionalInfo`.
///
/// Only strings are kept, so the projection always encodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorProjection {
    /// Error kind.
    pub name: String,
    /// Top-level message.
    pub message: String,
    /// Messages of the `source()` chain, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl ErrorProjection {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            causes: Vec::new(),
        }
    }

    /// Project a native error together with its source chain.
    pub fn from_error(name: impl Into<String>, error: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        Self {
            name: name.into(),
            message: error.to_string(),
            causes,
        }
    }

    /// Project a panic payload as caught by the runtime.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked".to_string()
        };

        Self::new("panic", message)
    }

    pub fn into_value(self) -> Value {
        let mut map = Map::new();
        map.insert("name".to_string(), Value::String(self.name));
        map.insert("message".to_string(), Value::String(self.message));
        if !self.causes.is_empty() {
            map.insert(
                "causes".to_string(),
                Value::Array(self.causes.into_iter().map(Value::String).collect()),
            );
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fmt;

    #[derive(Debug)]
    struct Outer(std::io::Error);

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "query failed")
        }
    }

    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_source_chain_collected() {
        let err = Outer(std::io::Error::new(std::io::ErrorKind::TimedOut, "socket timed out"));
        let projection = ErrorProjection::from_error("DbError", &err);
        assert_eq!(projection.message, "query failed");
        assert_eq!(projection.causes, vec!["socket timed out".to_string()]);
        assert_eq!(
            projection.into_value(),
            json!({"name": "DbError", "message": "query failed", "causes": ["socket timed out"]})
        );
    }

    #[test]
    fn test_panic_payloads() {
        let static_payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(ErrorProjection::from_panic(static_payload.as_ref()).message, "boom");

        let owned_payload: Box<dyn Any + Send> = Box::new(format!("index {}", 7));
        assert_eq!(ErrorProjection::from_panic(owned_payload.as_ref()).message, "index 7");

        let opaque: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(ErrorProjection::from_panic(opaque.as_ref()).message, "handler panicked");
    }

    #[test]
    fn test_empty_causes_omitted() {
        let value = ErrorProjection::new("Error", "plain").into_value();
        assert!(value.get("causes").is_none());
    }
}
