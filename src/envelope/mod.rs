//! Success/error response envelope returned by every function handler.
//!
//! On the wire an envelope is always one of:
//!
//! ```text
//! {"success": true,  "data": <handler-defined>}
//! {"success": false, "error": {"code": "...", "message": "...", "additionalInfo": {...}}}
//! ```

mod projection;
mod schema;

pub use projection::ErrorProjection;
pub use schema::create_success_schema;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Body written when even generic encoding fails.
const FALLBACK_BODY: &str = r#"{"success":false,"error":{"code":"internal_error","message":"response serialization failed","additionalInfo":{}}}"#;

/// Error codes generated by the server itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Request used a method other than `POST`.
    MethodNotAllowed,
    /// Request carried no usable path or body.
    InvalidRequest,
    /// No function is registered for the path.
    FunctionNotFound,
    /// The handler failed unexpectedly.
    InternalError,
}

impl ErrorCode {
    /// Wire representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MethodNotAllowed => "method_not_allowed",
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::FunctionNotFound => "function_not_found",
            ErrorCode::InternalError => "internal_error",
        }
    }

    /// Message sent alongside the code when nothing more specific is known.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::MethodNotAllowed => "method not allowed",
            ErrorCode::InvalidRequest => "invalid request",
            ErrorCode::FunctionNotFound => "function not found",
            ErrorCode::InternalError => "unexpected error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error payload of a failure envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionError {
    /// Machine-readable error code, either one of [`ErrorCode`] or application-defined.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Free-form JSON object with extra details.
    #[serde(default)]
    pub additional_info: Map<String, Value>,
}

impl FunctionError {
    /// Create an error with an empty `additionalInfo`.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            additional_info: Map::new(),
        }
    }

    /// Create a server-generated error with its default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code.as_str(), code.default_message())
    }

    /// Add an entry to `additionalInfo`.
    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.additional_info.insert(key.into(), value.into());
        self
    }

    /// Add a JSON-safe projection of `error` to `additionalInfo`.
    pub fn with_error(
        self,
        key: impl Into<String>,
        error: &(dyn std::error::Error + 'static),
    ) -> Self {
        let projection = ErrorProjection::from_error("Error", error);
        self.with_info(key, projection.into_value())
    }
}

impl fmt::Display for FunctionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Response envelope. Exactly one of `data` or `error` is ever present.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "WireEnvelope")]
pub enum Envelope {
    /// The function succeeded.
    Success { data: Value },
    /// The function reported a failure.
    Failure { error: FunctionError },
}

impl Envelope {
    /// Wrap `data` as a success envelope.
    pub fn success(data: impl Into<Value>) -> Self {
        Envelope::Success { data: data.into() }
    }

    /// Serialize `data` into a success envelope.
    pub fn success_json<T: Serialize>(data: &T) -> Result<Self, serde_json::Error> {
        Ok(Envelope::Success {
            data: serde_json::to_value(data)?,
        })
    }

    /// Wrap `error` as a failure envelope.
    pub fn fail(error: FunctionError) -> Self {
        Envelope::Failure { error }
    }

    /// Value of the `success` flag.
    pub fn is_success(&self) -> bool {
        matches!(self, Envelope::Success { .. })
    }

    /// Payload of a success envelope.
    pub fn data(&self) -> Option<&Value> {
        match self {
            Envelope::Success { data } => Some(data),
            Envelope::Failure { .. } => None,
        }
    }

    /// Payload of a failure envelope.
    pub fn error(&self) -> Option<&FunctionError> {
        match self {
            Envelope::Success { .. } => None,
            Envelope::Failure { error } => Some(error),
        }
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Envelope", 2)?;
        match self {
            Envelope::Success { data } => {
                state.serialize_field("success", &true)?;
                state.serialize_field("data", data)?;
            }
            Envelope::Failure { error } => {
                state.serialize_field("success", &false)?;
                state.serialize_field("error", error)?;
            }
        }
        state.end()
    }
}

#[derive(Deserialize)]
struct WireEnvelope {
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<FunctionError>,
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = String;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        match (wire.success, wire.data, wire.error) {
            (true, Some(data), None) => Ok(Envelope::Success { data }),
            (false, None, Some(error)) => Ok(Envelope::Failure { error }),
            (true, _, _) => Err("success envelope must carry `data` and no `error`".to_string()),
            (false, _, _) => Err("failure envelope must carry `error` and no `data`".to_string()),
        }
    }
}

/// Wrap `data` as a success envelope.
pub fn success(data: impl Into<Value>) -> Envelope {
    Envelope::success(data)
}

/// Wrap `error` as a failure envelope.
pub fn fail(error: FunctionError) -> Envelope {
    Envelope::fail(error)
}

/// Generic (non-schema) JSON encoding of any envelope. Never fails.
pub fn serialize_generic(envelope: &Envelope) -> String {
    serde_json::to_string(envelope).unwrap_or_else(|_| FALLBACK_BODY.to_string())
}

/// Serialize a failure envelope. Errors never go through a compiled serializer.
pub fn serialize_error(envelope: &Envelope) -> String {
    serialize_generic(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_wire_shape() {
        let body = serialize_generic(&success(json!({"message": "hi"})));
        assert_eq!(body, r#"{"success":true,"data":{"message":"hi"}}"#);
    }

    #[test]
    fn test_success_from_typed_data() {
        #[derive(Serialize)]
        struct Order {
            id: u32,
            items: Vec<&'static str>,
        }

        let envelope = Envelope::success_json(&Order { id: 7, items: vec!["tea"] }).unwrap();
        assert!(envelope.is_success());
        assert_eq!(envelope.data(), Some(&json!({"id": 7, "items": ["tea"]})));
    }

    #[test]
    fn test_failure_wire_shape() {
        let envelope = fail(FunctionError::new("out_of_stock", "no more items").with_info("sku", "A-1"));
        let parsed: Value = serde_json::from_str(&serialize_error(&envelope)).unwrap();
        assert_eq!(
            parsed,
            json!({
                "success": false,
                "error": {
                    "code": "out_of_stock",
                    "message": "no more items",
                    "additionalInfo": {"sku": "A-1"}
                }
            })
        );
    }

    #[test]
    fn test_core_error_codes() {
        let error = FunctionError::from_code(ErrorCode::FunctionNotFound);
        assert_eq!(error.code, "function_not_found");
        assert_eq!(error.message, "function not found");
        assert!(error.additional_info.is_empty());
        assert_eq!(ErrorCode::MethodNotAllowed.to_string(), "method_not_allowed");
    }

    #[test]
    fn test_parse_back() {
        let envelope = success(json!({"count": 3, "tags": ["a", "b"]}));
        let parsed: Envelope = serde_json::from_str(&serialize_generic(&envelope)).unwrap();
        assert_eq!(parsed, envelope);

        let envelope = fail(FunctionError::new("nope", "denied"));
        let parsed: Envelope = serde_json::from_str(&serialize_error(&envelope)).unwrap();
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn test_inconsistent_wire_rejected() {
        let both = r#"{"success":true,"data":{},"error":{"code":"x","message":"y"}}"#;
        assert!(serde_json::from_str::<Envelope>(both).is_err());

        let flag_mismatch = r#"{"success":false,"data":{}}"#;
        assert!(serde_json::from_str::<Envelope>(flag_mismatch).is_err());
    }

    #[test]
    fn test_with_error_projects_native_error() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let error = FunctionError::new("storage", "write failed").with_error("cause", &io);
        assert_eq!(error.additional_info["cause"]["message"], json!("disk on fire"));
        assert!(serialize_error(&fail(error)).contains("disk on fire"));
    }

    #[test]
    fn test_accessors() {
        let ok = success(json!({"a": 1}));
        assert!(ok.is_success());
        assert_eq!(ok.data(), Some(&json!({"a": 1})));
        assert!(ok.error().is_none());

        let err = fail(FunctionError::new("c", "m"));
        assert!(!err.is_success());
        assert_eq!(err.error().map(|e| e.code.as_str()), Some("c"));
    }
}
