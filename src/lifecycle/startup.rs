//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind every configured listener before serving any of them
//! - Start one accept loop per listener
//! - Wait for a termination signal, then drain with a deadline
//!
//! # Design Decisions
//! - Fail fast: a bind error aborts startup and is returned to the caller
//! - A listener that dies with a permanent error is reported; the others keep serving
//! - A second signal during the drain forces an immediate stop

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::task::JoinSet;

use crate::config::{ConfigError, ListenerConfig, ServerConfig};
use crate::handler::ConnectionHandler;
use crate::lifecycle::signals;
use crate::net::TcpAcceptor;
use crate::observability::metrics;
use crate::server::{ServeError, Server};

/// Errors that end the process.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid bind address {0:?}")]
    InvalidAddress(String),

    #[error(transparent)]
    Serve(#[from] ServeError),

    #[error("failed to install metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

/// Bind every listener, failing on the first error.
pub async fn bind_listeners(configs: &[ListenerConfig]) -> Result<Vec<TcpAcceptor>, StartupError> {
    let mut acceptors = Vec::with_capacity(configs.len());
    for config in configs {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|_| StartupError::InvalidAddress(config.bind_address.clone()))?;
        let acceptor = TcpAcceptor::bind(addr)
            .await
            .map_err(|source| ServeError::Bind { addr, source })?
            .with_keepalive(config.keepalive());
        acceptors.push(acceptor);
    }
    Ok(acceptors)
}

/// Run a server for `config` until a termination signal arrives or every
/// listener has ended.
///
/// Returns the first permanent accept error, if any listener hit one.
pub async fn run<H>(config: ServerConfig, handler: H) -> Result<(), StartupError>
where
    H: ConnectionHandler<TcpStream>,
{
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::InvalidAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr)?;
    }

    let acceptors = bind_listeners(&config.listeners).await?;
    let server = Server::new(handler, config.options.to_server_options());

    let mut tasks = JoinSet::new();
    for acceptor in acceptors {
        let server = server.clone();
        tasks.spawn(async move { server.serve(acceptor).await });
    }

    let mut first_error: Option<ServeError> = None;
    let signal = signals::wait_for_signal();
    tokio::pin!(signal);

    loop {
        tokio::select! {
            sig = &mut signal => {
                match sig {
                    Ok(name) => tracing::info!(signal = name, "Shutdown signal received"),
                    Err(e) => tracing::error!(error = %e, "Failed to listen for signals; shutting down"),
                }
                break;
            }
            joined = tasks.join_next() => match joined {
                Some(res) => record(res, &mut first_error),
                None => {
                    tracing::warn!("All listeners have stopped");
                    break;
                }
            },
        }
    }

    let grace = config.shutdown.grace_period();
    tokio::select! {
        drained = server.graceful_stop_timeout(grace) => {
            if drained {
                tracing::info!("All connections drained");
            }
        }
        _ = signals::wait_for_signal() => {
            tracing::warn!("Second signal received; forcing stop");
            server.stop();
        }
    }

    while let Some(res) = tasks.join_next().await {
        record(res, &mut first_error);
    }

    tracing::info!("Shutdown complete");
    match first_error {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn record(
    res: Result<Result<(), ServeError>, tokio::task::JoinError>,
    first_error: &mut Option<ServeError>,
) {
    match res {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::error!(error = %err, "Listener stopped with error");
            first_error.get_or_insert(err);
        }
        Err(e) => tracing::error!(error = %e, "Serve task failed"),
    }
}
