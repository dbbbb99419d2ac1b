//! Connection identity and the per-connection record handed to handlers.
//!
//! # Responsibilities
//! - Generate unique connection and listener IDs for tracing
//! - Carry the accepted stream together with its server context
//!
//! Registry bookkeeping for live connections lives in `server::registry`;
//! this module only defines what a connection *is*.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::lifecycle::ShutdownListener;
use crate::server::ServerOptions;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

static LISTENER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn next() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Unique identifier for a served listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn next() -> Self {
        Self(LISTENER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lis-{}", self.0)
    }
}

/// An accepted connection as seen by a [`ConnectionHandler`](crate::handler::ConnectionHandler).
///
/// The handler owns the stream. The registry entry for this connection is
/// released when the handler invocation finishes, not when this value is
/// dropped, so a handler may hand the stream off freely.
#[derive(Debug)]
pub struct Connection<C> {
    id: ConnectionId,
    listener: ListenerId,
    peer_addr: SocketAddr,
    stream: C,
    options: Arc<ServerOptions>,
    shutdown: ShutdownListener,
}

impl<C> Connection<C> {
    pub(crate) fn new(
        id: ConnectionId,
        listener: ListenerId,
        peer_addr: SocketAddr,
        stream: C,
        options: Arc<ServerOptions>,
        shutdown: ShutdownListener,
    ) -> Self {
        Self {
            id,
            listener,
            peer_addr,
            stream,
            options,
            shutdown,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The listener this connection was accepted on.
    pub fn listener(&self) -> ListenerId {
        self.listener
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Server options in effect when the connection was accepted.
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Signal that fires when the server starts shutting down.
    ///
    /// Handlers that want to cooperate with a graceful drain can select on
    /// [`ShutdownListener::cancelled`].
    pub fn shutdown(&self) -> ShutdownListener {
        self.shutdown.clone()
    }

    pub fn stream(&self) -> &C {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut C {
        &mut self.stream
    }

    /// Take the raw stream, discarding the server context.
    pub fn into_stream(self) -> C {
        self.stream
    }

    /// Split into the raw stream and the remaining connection context.
    pub fn into_parts(self) -> (C, ConnectionContext) {
        (
            self.stream,
            ConnectionContext {
                id: self.id,
                listener: self.listener,
                peer_addr: self.peer_addr,
                options: self.options,
                shutdown: self.shutdown,
            },
        )
    }
}

/// Everything in a [`Connection`] except the stream.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub id: ConnectionId,
    pub listener: ListenerId,
    pub peer_addr: SocketAddr,
    pub options: Arc<ServerOptions>,
    pub shutdown: ShutdownListener,
}
