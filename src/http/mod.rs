//! HTTP types shared by the dispatcher and handlers.

mod request;
mod response;

pub use request::{BodyError, RawRequest};
pub use response::{Reply, POWERED_BY};

pub use hyper::{HeaderMap, Method, StatusCode};
