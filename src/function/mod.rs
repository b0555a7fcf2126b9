//! Function handlers and the registry mapping paths to them.

pub mod handler;
pub mod registry;

pub use handler::{FunctionHandler, HandlerError, RequestContext};
pub use registry::{route_key, FunctionRegistry, Route};
