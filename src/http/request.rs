//! Request value handed to function handlers.

use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::{HeaderMap, Method, Request};
use thiserror::Error;

/// The request body could not be read.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("failed to read request body: {0}")]
    Read(String),
}

/// An inbound request with its body fully read. The body format is up to the handler.
#[derive(Debug, Clone)]
pub struct RawRequest {
    /// HTTP method (always `POST` once a handler sees it).
    pub method: Method,
    /// Request path, which is also the function name.
    pub path: String,
    /// Query string without the leading `?`.
    pub query: Option<String>,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body; empty when none was sent.
    pub body: Bytes,
}

impl RawRequest {
    /// Create a request for `path` with no headers and an empty body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Read a hyper request, refusing bodies larger than `limit` bytes.
    pub async fn from_request<B>(req: Request<B>, limit: usize) -> Result<Self, BodyError>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();
        let body = Limited::new(body, limit)
            .collect()
            .await
            .map_err(|err| {
                if err.downcast_ref::<LengthLimitError>().is_some() {
                    BodyError::TooLarge { limit }
                } else {
                    BodyError::Read(err.to_string())
                }
            })?
            .to_bytes();

        Ok(Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers,
            body,
        })
    }

    /// Set the request body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Get a header value as text.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|v| v.to_str().ok())
    }

    /// Get the body as text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Parse the body as JSON if one was sent.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        if self.body.is_empty() {
            None
        } else {
            Some(serde_json::from_slice(&self.body))
        }
    }
}
