//! # Fireball - Minimal RPC-over-HTTP Function Server
//!
//! Fireball exposes named functions as `POST /<name>` endpoints. Every
//! response, success or failure, is a JSON envelope:
//!
//! ```text
//! { "success": true,  "data": <value> }
//! { "success": false, "error": { "code": "...", "message": "...", "additionalInfo": {...} } }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        HTTP/1.1 client                       │
//! └──────────────────────────────────────────────────────────────┘
//!                                │ POST /name
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Dispatcher                          │
//! │   method check ─ route lookup ─ request logger ─ body read   │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                   Function Registry                    │  │
//! │  │   /hello ──► handler         /hi ──► handler + schema  │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │        envelope ─► compiled serializer or generic JSON       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fireball::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let mut server = Server::new(ServerConfig::from_env());
//!
//!     server.register("hello", |_req: RawRequest, _ctx: RequestContext| async {
//!         Ok::<_, HandlerError>(success(json!({ "message": "hello world" })))
//!     });
//!
//!     let handle = server.listen().await?;
//!     handle.close_on_signal().await??;
//!     handle.wait_drained().await?;
//!     Ok(())
//! }
//! ```
//!
//! Business failures are returned with [`fail`] and keep status 200. A handler
//! that returns `Err` or panics is answered with 500 `internal_error` and the
//! server keeps serving.

pub mod envelope;
pub mod function;
pub mod http;
pub mod logger;
pub mod runtime;
pub mod schema;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::envelope::{fail, success, Envelope, ErrorCode, FunctionError};
    pub use crate::function::{FunctionHandler, HandlerError, RequestContext};
    pub use crate::http::{RawRequest, StatusCode};
    pub use crate::logger::ScopedLogger;
    pub use crate::runtime::{Server, ServerConfig, ServerHandle};
    pub use crate::schema::FunctionSchema;
    pub use async_trait::async_trait;
    pub use fireball_macro::fireball_function;
}

// Re-export for convenience
pub use envelope::{fail, success, Envelope, FunctionError};
pub use function::{FunctionHandler, HandlerError, RequestContext};
pub use http::RawRequest;
pub use runtime::{Server, ServerConfig, ServerError, ServerHandle};
pub use schema::FunctionSchema;
