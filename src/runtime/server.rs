//! Fireball HTTP server and its lifecycle.
//!
//! A [`Server`] is the created state: functions are registered on it while
//! nothing is listening. [`Server::listen`] binds the socket and returns a
//! [`ServerHandle`] for the listening server. Closing is final; a closed
//! server cannot listen again, build a new [`Server`] instead.

use crate::function::{FunctionHandler, FunctionRegistry};
use crate::logger::ScopedLogger;
use crate::runtime::{shutdown_signal, Dispatcher, ServerConfig};
use crate::schema::{FunctionSchema, SchemaError};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::{Map, Value};
use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error};

/// Server lifecycle failures.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Lifecycle state of a server that has started listening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Listening,
    Closed,
}

/// A server that is configured but not yet listening.
pub struct Server {
    config: ServerConfig,
    logger: ScopedLogger,
    registry: FunctionRegistry,
}

impl Server {
    /// Create a new server.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            logger: ScopedLogger::new("server"),
            registry: FunctionRegistry::new(),
        }
    }

    /// Create a new server with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Replace the base logger request loggers are derived from.
    pub fn with_logger(mut self, logger: ScopedLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Serve `handler` on `POST /name`. Success responses use generic JSON encoding.
    pub fn register(&mut self, name: &str, handler: impl FunctionHandler) -> &mut Self {
        self.registry.register(name, handler);
        self
    }

    /// Serve `handler` on `POST /name`, encoding success responses with a
    /// serializer compiled from `schema.response`.
    pub fn register_with_schema(
        &mut self,
        name: &str,
        schema: FunctionSchema,
        handler: impl FunctionHandler,
    ) -> Result<&mut Self, SchemaError> {
        self.registry.register_with_schema(name, &schema, handler)?;
        Ok(self)
    }

    /// Bind the listening socket and start accepting connections.
    pub async fn listen(self) -> Result<ServerHandle, ServerError> {
        let mut data = Map::new();
        data.insert("port".to_string(), Value::from(self.config.port));
        data.insert("host".to_string(), Value::from(self.config.host.clone()));
        self.logger.info_with("server is starting", &Value::Object(data));

        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(self.registry),
            self.logger.clone(),
            &self.config,
        ));
        let keep_alive = self.config.keep_alive;
        let (released_tx, released) = watch::channel(false);
        let handle = ServerHandle::new(self.config, self.logger, Some(local_addr), released);

        let (listener_handle, shutdown) = (handle.clone(), handle.shared.shutdown.subscribe());
        let task = tokio::spawn(accept_loop(
            listener,
            dispatcher,
            listener_handle,
            shutdown,
            released_tx,
            keep_alive,
        ));
        *handle.shared.accept_task.lock().await = Some(task);

        debug!("server listening on {}", local_addr);
        Ok(handle)
    }
}

struct Shared {
    config: ServerConfig,
    logger: ScopedLogger,
    local_addr: Option<SocketAddr>,
    shutdown: watch::Sender<bool>,
    /// Flips to `true` once the listening socket is dropped.
    released: watch::Receiver<bool>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a listening server. Cheap to clone; handlers receive one in their context.
///
/// Dropping every handle does not stop the server; call [`close`](Self::close)
/// or [`close_async`](Self::close_async).
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

impl fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHandle")
            .field("local_addr", &self.shared.local_addr)
            .field("state", &self.state())
            .finish()
    }
}

impl ServerHandle {
    fn new(
        config: ServerConfig,
        logger: ScopedLogger,
        local_addr: Option<SocketAddr>,
        released: watch::Receiver<bool>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                config,
                logger,
                local_addr,
                shutdown,
                released,
                accept_task: Mutex::new(None),
            }),
        }
    }

    /// A handle with no socket behind it, for driving a [`Dispatcher`] directly.
    #[cfg(test)]
    pub(crate) fn detached(config: ServerConfig) -> Self {
        let (_, released) = watch::channel(true);
        Self::new(config, ScopedLogger::disabled(), None, released)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// Address the server is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.local_addr
    }

    pub fn state(&self) -> ServerState {
        if *self.shared.shutdown.borrow() {
            ServerState::Closed
        } else {
            ServerState::Listening
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ServerState::Closed
    }

    /// Stop accepting connections and resolve once the listener is released.
    ///
    /// Open connections are told to finish their in-flight requests and close;
    /// use [`wait_drained`](Self::wait_drained) to wait for them. A handler may
    /// await this on its own server. Closing an already closed server resolves
    /// `Ok(())`.
    pub async fn close_async(&self) -> Result<(), ServerError> {
        self.shared.logger.info("closing server");

        if self.shared.shutdown.send_replace(true) {
            debug!("server already closed");
        }

        let mut released = self.shared.released.clone();
        if released.wait_for(|released| *released).await.is_err() {
            // The accept loop ended without releasing the listener.
            return self.wait_drained().await;
        }
        Ok(())
    }

    /// Resolve once the server is closed and every open connection has finished.
    ///
    /// Never await this from a handler of the same server: its own connection
    /// only finishes after the handler returns.
    pub async fn wait_drained(&self) -> Result<(), ServerError> {
        self.closed().await;

        let mut task = self.shared.accept_task.lock().await;
        if let Some(running) = task.as_mut() {
            let joined = running.await;
            *task = None;
            joined?;
        }
        Ok(())
    }

    /// Close in the background. Must be called from within a tokio runtime.
    pub fn close(&self) -> JoinHandle<Result<(), ServerError>> {
        let handle = self.clone();
        tokio::spawn(async move { handle.close_async().await })
    }

    /// Close in the background and report the outcome to `callback`.
    pub fn close_with<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<(), ServerError>) + Send + 'static,
    {
        let handle = self.clone();
        tokio::spawn(async move { callback(handle.close_async().await) })
    }

    /// Resolve once the server has been asked to close.
    pub async fn closed(&self) {
        let mut rx = self.shared.shutdown.subscribe();
        // The sender lives as long as `self`, so this only returns once closed.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Close the server when the process receives Ctrl-C or SIGTERM.
    ///
    /// The returned task finishes when the server closes, whatever the cause.
    pub fn close_on_signal(&self) -> JoinHandle<Result<(), ServerError>> {
        let handle = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_signal() => handle.close_async().await,
                _ = handle.closed() => Ok(()),
            }
        })
    }
}

async fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    handle: ServerHandle,
    mut shutdown: watch::Receiver<bool>,
    released: watch::Sender<bool>,
    keep_alive: bool,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, remote_addr)) => {
                    let io = TokioIo::new(stream);
                    let dispatcher = Arc::clone(&dispatcher);
                    let handle = handle.clone();
                    let mut shutdown = shutdown.clone();

                    connections.spawn(async move {
                        let service = service_fn(move |req| {
                            let dispatcher = Arc::clone(&dispatcher);
                            let handle = handle.clone();
                            async move { Ok::<_, Infallible>(dispatcher.dispatch(req, &handle).await) }
                        });

                        let conn = http1::Builder::new()
                            .keep_alive(keep_alive)
                            .serve_connection(io, service);
                        tokio::pin!(conn);

                        let result = tokio::select! {
                            result = conn.as_mut() => result,
                            _ = shutdown.changed() => {
                                conn.as_mut().graceful_shutdown();
                                conn.await
                            }
                        };

                        if let Err(err) = result {
                            debug!("error serving connection from {}: {:?}", remote_addr, err);
                        }
                    });
                }
                Err(err) => error!("failed to accept connection: {}", err),
            },
            _ = shutdown.changed() => break,
        }

        while connections.try_join_next().is_some() {}
    }

    drop(listener);
    released.send_replace(true);
    while let Some(joined) = connections.join_next().await {
        if let Err(err) = joined {
            error!("connection task failed: {}", err);
        }
    }
    debug!("server closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{success, Envelope};
    use crate::function::{HandlerError, RequestContext};
    use crate::http::RawRequest;
    use serde_json::json;
    use tokio_test::assert_ok;

    fn test_server() -> Server {
        let mut server = Server::new(ServerConfig::new().port(0)).with_logger(ScopedLogger::disabled());
        server.register("hello", |_req: RawRequest, _ctx: RequestContext| async {
            Ok::<_, HandlerError>(success(json!({"message": "hello world"})))
        });
        server
    }

    #[tokio::test]
    async fn test_listen_then_close() {
        let handle = test_server().listen().await.unwrap();
        assert_eq!(handle.state(), ServerState::Listening);
        assert!(handle.local_addr().is_some_and(|addr| addr.port() != 0));

        assert_ok!(handle.close_async().await);
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_double_close_is_ok() {
        let handle = test_server().listen().await.unwrap();
        assert_ok!(handle.close_async().await);
        assert_ok!(handle.close_async().await);
    }

    #[tokio::test]
    async fn test_wait_drained_after_close() {
        let handle = test_server().listen().await.unwrap();
        let drained = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.wait_drained().await })
        };

        assert_ok!(handle.close_async().await);
        assert_ok!(drained.await.unwrap());
        assert_ok!(handle.wait_drained().await);
    }

    #[tokio::test]
    async fn test_detached_close_resolves() {
        let handle = ServerHandle::detached(ServerConfig::default());
        assert_ok!(handle.close_async().await);
        assert_ok!(handle.wait_drained().await);
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_close_with_callback() {
        let handle = test_server().listen().await.unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        handle
            .close_with(move |result| {
                let _ = tx.send(result.is_ok());
            })
            .await
            .unwrap();
        assert!(rx.await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_resolves_after_close() {
        let handle = test_server().listen().await.unwrap();
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.closed().await })
        };
        handle.close().await.unwrap().unwrap();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_error() {
        let first = test_server().listen().await.unwrap();
        let port = first.local_addr().unwrap().port();

        let taken = Server::new(ServerConfig::new().port(port)).with_logger(ScopedLogger::disabled());
        let err = taken.listen().await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));

        first.close_async().await.unwrap();
    }

    #[tokio::test]
    async fn test_register_with_bad_schema() {
        let mut server = Server::with_defaults();
        let result = server.register_with_schema(
            "bad",
            FunctionSchema::new(json!({"type": "nope"})),
            |_req: RawRequest, _ctx: RequestContext| async {
                Ok::<Envelope, HandlerError>(success(json!({})))
            },
        );
        assert!(result.is_err());
        assert!(server.registry().is_empty());
    }
}
