//! Opt-in termination signal handling.
//!
//! Nothing here is installed automatically; the host application decides
//! whether a signal should close the server (see
//! [`ServerHandle::close_on_signal`](crate::runtime::ServerHandle::close_on_signal)).

use tracing::{error, info};

/// Resolve once the process receives Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for interrupt signal: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!("failed to listen for terminate signal: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("received interrupt signal"),
        _ = terminate => info!("received terminate signal"),
    }
}
