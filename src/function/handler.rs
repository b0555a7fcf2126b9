//! Function handler trait and per-request context.

use crate::envelope::{Envelope, ErrorProjection};
use crate::http::RawRequest;
use crate::logger::ScopedLogger;
use crate::runtime::ServerHandle;
use async_trait::async_trait;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;

/// Everything a handler gets besides the request itself. Built fresh for every request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Logger tagged with this request's `url`, `method` and `requestId`.
    pub logger: ScopedLogger,
    /// The server dispatching the request.
    pub server: ServerHandle,
}

impl RequestContext {
    /// Identifier generated for this request.
    pub fn request_id(&self) -> &str {
        self.logger.request_id().unwrap_or_default()
    }
}

/// A named function callable via `POST /name`.
///
/// Business failures are returned as [`Envelope::Failure`]. An `Err` means the
/// handler failed unexpectedly and is answered with `internal_error`.
#[async_trait]
pub trait FunctionHandler: Send + Sync + 'static {
    async fn call(&self, request: RawRequest, ctx: RequestContext) -> Result<Envelope, HandlerError>;
}

#[async_trait]
impl<F, Fut> FunctionHandler for F
where
    F: Fn(RawRequest, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Envelope, HandlerError>> + Send + 'static,
{
    async fn call(&self, request: RawRequest, ctx: RequestContext) -> Result<Envelope, HandlerError> {
        (self)(request, ctx).await
    }
}

/// Unexpected handler failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    name: Cow<'static, str>,
    message: String,
    causes: Vec<String>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::named("Error", message)
    }

    /// Create an error with an explicit kind.
    pub fn named(name: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            causes: Vec::new(),
        }
    }

    /// Capture a native error and its source chain.
    pub fn from_error(
        name: impl Into<Cow<'static, str>>,
        error: &(dyn std::error::Error + 'static),
    ) -> Self {
        let name: Cow<'static, str> = name.into();
        let projection = ErrorProjection::from_error(name.into_owned(), error);
        Self {
            name: Cow::Owned(projection.name),
            message: projection.message,
            causes: projection.causes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn causes(&self) -> &[String] {
        &self.causes
    }

    /// JSON-safe view embedded in `internal_error` responses.
    pub fn projection(&self) -> ErrorProjection {
        ErrorProjection {
            name: self.name.to_string(),
            message: self.message.clone(),
            causes: self.causes.clone(),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for HandlerError {}

impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        HandlerError::from_error("IoError", &err)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::from_error("JsonError", &err)
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        HandlerError::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        HandlerError::new(message)
    }
}
