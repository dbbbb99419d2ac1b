//! Error types surfaced by the server.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors returned from [`Server::serve`](crate::server::Server::serve) and friends.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The operation is illegal because the server has been stopped.
    #[error("demon-ring: the server has been stopped")]
    ServerStopped,

    /// Failed to bind a listening socket.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The listener reported a permanent accept failure.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),
}

impl ServeError {
    pub fn is_server_stopped(&self) -> bool {
        matches!(self, ServeError::ServerStopped)
    }
}
