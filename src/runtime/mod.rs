//! Server runtime: configuration, request dispatch and lifecycle.

mod config;
mod dispatcher;
mod server;
mod signal;

pub use config::ServerConfig;
pub use dispatcher::Dispatcher;
pub use server::{Server, ServerError, ServerHandle, ServerState};
pub use signal::shutdown_signal;
