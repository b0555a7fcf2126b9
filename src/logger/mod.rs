//! Request-scoped logging on top of `tracing`.
//!
//! The server owns a base [`ScopedLogger`]; every request gets its own child
//! carrying `url`, `method` and `requestId`. Loggers are immutable values, so
//! metadata attached for one request can never show up on another.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::Span;
use tracing_subscriber::EnvFilter;

/// Output format of the process-wide subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" | "console" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Install the global `tracing` subscriber. Filtering follows `RUST_LOG`,
/// defaulting to `info`.
pub fn init_tracing(format: LogFormat) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
}

struct Fields<'a>(&'a Map<String, Value>);

impl fmt::Display for Fields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = serde_json::to_string(self.0).map_err(|_| fmt::Error)?;
        f.write_str(&encoded)
    }
}

macro_rules! emit {
    ($logger:expr, $level:ident, $message:expr, $data:expr) => {
        if $logger.enabled {
            let _entered = $logger.span.enter();
            tracing::$level!(
                logger = %$logger.name,
                context = %Fields(&$logger.fields),
                data = %$data,
                "{}",
                $message
            );
        }
    };
}

/// A named logging handle with attached metadata.
#[derive(Debug, Clone)]
pub struct ScopedLogger {
    name: Arc<str>,
    fields: Arc<Map<String, Value>>,
    span: Span,
    enabled: bool,
}

impl ScopedLogger {
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            fields: Arc::new(Map::new()),
            span: tracing::info_span!("fireball", logger = %name),
            enabled: true,
        }
    }

    /// A logger that drops every event.
    pub fn disabled() -> Self {
        Self {
            name: Arc::from("disabled"),
            fields: Arc::new(Map::new()),
            span: Span::none(),
            enabled: false,
        }
    }

    /// Derive a logger with a new name that inherits the current metadata.
    pub fn child(&self, name: &str) -> Self {
        let span = if self.enabled {
            tracing::info_span!(parent: &self.span, "scope", logger = %name)
        } else {
            Span::none()
        };

        Self {
            name: Arc::from(name),
            fields: Arc::clone(&self.fields),
            span,
            enabled: self.enabled,
        }
    }

    /// Derive the logger for one request.
    pub fn for_request(&self, url: &str, method: &str, request_id: &str) -> Self {
        let span = if self.enabled {
            tracing::info_span!(parent: &self.span, "request", request_id = %request_id)
        } else {
            Span::none()
        };

        let mut fields = (*self.fields).clone();
        fields.insert("url".to_string(), Value::from(url));
        fields.insert("method".to_string(), Value::from(method));
        fields.insert("requestId".to_string(), Value::from(request_id));

        Self {
            name: Arc::from("request"),
            fields: Arc::new(fields),
            span,
            enabled: self.enabled,
        }
    }

    /// Attach one metadata entry, returning the extended logger.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        Arc::make_mut(&mut self.fields).insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// The `requestId` of a request logger.
    pub fn request_id(&self) -> Option<&str> {
        self.fields.get("requestId").and_then(Value::as_str)
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn trace(&self, message: &str) {
        emit!(self, trace, message, serde_json::Value::Null);
    }

    pub fn debug(&self, message: &str) {
        emit!(self, debug, message, serde_json::Value::Null);
    }

    pub fn info(&self, message: &str) {
        emit!(self, info, message, serde_json::Value::Null);
    }

    pub fn warn(&self, message: &str) {
        emit!(self, warn, message, serde_json::Value::Null);
    }

    pub fn error(&self, message: &str) {
        emit!(self, error, message, serde_json::Value::Null);
    }

    pub fn info_with(&self, message: &str, data: &Value) {
        emit!(self, info, message, data);
    }

    pub fn warn_with(&self, message: &str, data: &Value) {
        emit!(self, warn, message, data);
    }

    pub fn error_with(&self, message: &str, data: &Value) {
        emit!(self, error, message, data);
    }
}
