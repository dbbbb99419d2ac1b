//! Server lifecycle coordinator.
//!
//! # Data Flow
//! ```text
//! Server::new(handler, options)
//!     → serve(listener): register → accept loop → unregister + close
//!         → accept.rs: accept / classify / backoff
//!         → dispatch.rs: record connection, spawn handler task
//!     → stop():          fire signal, close listeners, abort handlers
//!     → graceful_stop(): fire signal, wait until registries are empty
//! ```
//!
//! # State Transitions
//! ```text
//! Created → Serving: first serve()
//! Serving → Draining: graceful_stop()
//! Draining → Stopped: listener and connection registries both empty
//! Serving → Stopped: stop()
//! ```
//! `Stopped` is terminal; `serve` on a stopped server fails with
//! [`ServeError::ServerStopped`].

mod accept;
mod dispatch;
pub mod error;
pub mod options;
mod registry;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::Semaphore;

use crate::handler::ConnectionHandler;
use crate::lifecycle::Shutdown;
use crate::net::listener::ListenerHandle;
use crate::net::{Listener, ListenerId, TcpAcceptor};

pub use error::ServeError;
pub use options::{ServerOption, ServerOptions};
pub use registry::ServerState;

use registry::SharedRegistry;

/// State shared by the server handle, its accept loops and handler tasks.
pub(crate) struct Shared<H> {
    pub(crate) options: Arc<ServerOptions>,
    pub(crate) handler: Arc<H>,
    pub(crate) registry: Arc<SharedRegistry>,
    pub(crate) shutdown: Shutdown,
    /// Present when `max_concurrent_streams` is non-zero.
    pub(crate) admission: Option<Arc<Semaphore>>,
}

/// A connection-accepting server.
///
/// Cloning yields another handle to the same server.
pub struct Server<H> {
    shared: Arc<Shared<H>>,
}

impl<H> Clone for Server<H> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<H> std::fmt::Debug for Server<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.shared.registry.lock();
        f.debug_struct("Server")
            .field("state", &registry.state())
            .field("listeners", &registry.listener_count())
            .field("connections", &registry.connection_count())
            .finish()
    }
}

impl<H> Server<H> {
    /// Create a server; `options` are applied in order over the defaults.
    pub fn new<I>(handler: H, options: I) -> Self
    where
        I: IntoIterator<Item = ServerOption>,
    {
        let options = ServerOptions::from_options(options);
        let admission = match options.max_concurrent_streams {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n as usize))),
        };

        Self {
            shared: Arc::new(Shared {
                options: Arc::new(options),
                handler: Arc::new(handler),
                registry: Arc::new(SharedRegistry::new()),
                shutdown: Shutdown::new(),
                admission,
            }),
        }
    }

    pub fn options(&self) -> &ServerOptions {
        &self.shared.options
    }

    pub fn state(&self) -> ServerState {
        self.shared.registry.lock().state()
    }

    pub fn listener_count(&self) -> usize {
        self.shared.registry.lock().listener_count()
    }

    pub fn connection_count(&self) -> usize {
        self.shared.registry.lock().connection_count()
    }

    /// Peer addresses of live connections accepted on `listener`.
    pub fn peers(&self, listener: ListenerId) -> Vec<SocketAddr> {
        self.shared.registry.lock().peers(listener)
    }

    /// Accept connections on `listener` until it fails permanently or the
    /// server shuts down.
    ///
    /// Returns `Ok(())` when ended by `stop`/`graceful_stop`, the permanent
    /// accept error otherwise. On a stopped server the listener is closed
    /// and [`ServeError::ServerStopped`] is returned without accepting.
    pub async fn serve<L>(&self, listener: L) -> Result<(), ServeError>
    where
        L: Listener,
        H: ConnectionHandler<L::Conn>,
    {
        let listener = Arc::new(listener);
        let id = ListenerId::next();
        let handle: Arc<dyn ListenerHandle> = listener.clone();

        if let Err(err) = self
            .shared
            .registry
            .mutate(|r| r.register_listener(id, handle))
        {
            if let Err(e) = listener.close() {
                tracing::debug!(listener = %id, error = %e, "Closing listener of stopped server failed");
            }
            return Err(err);
        }

        let _registration = Registration {
            registry: &self.shared.registry,
            id,
        };

        tracing::info!(
            listener = %id,
            address = ?listener.local_addr().ok(),
            "Serving listener"
        );

        let result = self.shared.accept_loop(&*listener, id).await;
        match &result {
            Ok(()) => tracing::info!(listener = %id, "Done serving; shutdown requested"),
            Err(e) => tracing::error!(listener = %id, error = %e, "Done serving; accept failed"),
        }
        result
    }

    /// Bind `addr` and serve it with the default keep-alive settings.
    pub async fn serve_tcp(&self, addr: SocketAddr) -> Result<(), ServeError>
    where
        H: ConnectionHandler<TcpStream>,
    {
        let acceptor = TcpAcceptor::bind(addr)
            .await
            .map_err(|source| ServeError::Bind { addr, source })?;
        self.serve(acceptor).await
    }

    /// Stop immediately.
    ///
    /// Fires the shutdown signal, closes every served listener and aborts all
    /// running handler tasks, without waiting for any of them. Calling it
    /// again is a no-op.
    pub fn stop(&self) {
        self.shared.shutdown.trigger();
        let torn = self.shared.registry.mutate(|r| r.tear_down());

        if torn.listeners.is_empty() && torn.handlers.is_empty() {
            return;
        }

        tracing::info!(
            listeners = torn.listeners.len(),
            connections = torn.handlers.len(),
            "Stopping server"
        );

        for (id, listener) in torn.listeners {
            tracing::debug!(
                listener = %id,
                address = ?listener.listener_addr().ok(),
                "Closing listener"
            );
            if let Err(e) = listener.close_listener() {
                tracing::debug!(listener = %id, error = %e, "Failed to close listener");
            }
        }
        for handler in torn.handlers {
            handler.abort();
        }
    }

    /// Stop accepting and wait until every listener and connection is gone.
    ///
    /// Listeners served while the drain is in progress are registered but
    /// exit without accepting.
    pub async fn graceful_stop(&self) {
        let mut changed = self.shared.registry.subscribe();

        let already_stopped = self.shared.registry.mutate(|r| {
            if r.state() == ServerState::Stopped {
                return true;
            }
            r.begin_drain();
            false
        });
        if already_stopped {
            return;
        }

        self.shared.shutdown.trigger();
        tracing::info!("Graceful stop: draining connections");

        loop {
            match self.shared.registry.finish_if_drained() {
                Ok(()) => break,
                Err((listeners, connections)) => {
                    tracing::debug!(listeners, connections, "Waiting for drain");
                }
            }
            if changed.changed().await.is_err() {
                break;
            }
        }

        tracing::info!("Graceful stop complete");
    }

    /// Graceful stop bounded by `grace`; falls back to [`stop`](Self::stop).
    ///
    /// Returns `true` if the drain finished in time.
    pub async fn graceful_stop_timeout(&self, grace: Duration) -> bool {
        match tokio::time::timeout(grace, self.graceful_stop()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    grace_secs = grace.as_secs_f64(),
                    connections = self.connection_count(),
                    "Drain deadline exceeded; forcing stop"
                );
                self.stop();
                false
            }
        }
    }
}

/// Removes a listener from the registry when `serve` returns or is dropped.
struct Registration<'a> {
    registry: &'a SharedRegistry,
    id: ListenerId,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        // Whoever removes the entry closes it, so each listener closes once.
        if let Some(listener) = self.registry.mutate(|r| r.unregister_listener(self.id)) {
            if let Err(e) = listener.close_listener() {
                tracing::debug!(listener = %self.id, error = %e, "Failed to close listener");
            }
        }
    }
}
