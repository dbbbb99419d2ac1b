//! Fire-and-forget connection dispatch.
//!
//! Each accepted connection is recorded in the registry, then handed to the
//! handler on its own task. The task owns a [`ConnectionGuard`] that removes
//! the record when the handler returns, panics, or is aborted, so a handler
//! fault never reaches the accept loop.

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::OwnedSemaphorePermit;

use crate::handler::ConnectionHandler;
use crate::net::{Connection, ConnectionId, ListenerId};
use crate::observability::metrics;
use crate::server::registry::SharedRegistry;
use crate::server::Shared;

impl<H> Shared<H> {
    pub(crate) fn dispatch<C>(
        &self,
        listener: ListenerId,
        stream: C,
        peer_addr: SocketAddr,
        permit: Option<OwnedSemaphorePermit>,
    ) where
        C: Send + 'static,
        H: ConnectionHandler<C>,
    {
        let id = ConnectionId::next();
        if !self
            .registry
            .mutate(|r| r.insert_connection(listener, id, peer_addr))
        {
            tracing::debug!(listener = %listener, peer_addr = %peer_addr, "Server stopped; dropping accepted connection");
            return;
        }

        tracing::debug!(listener = %listener, connection_id = %id, peer_addr = %peer_addr, "Connection accepted");

        let guard = ConnectionGuard {
            registry: Arc::clone(&self.registry),
            listener,
            id,
        };
        let conn = Connection::new(
            id,
            listener,
            peer_addr,
            stream,
            Arc::clone(&self.options),
            self.shutdown.subscribe(),
        );
        let handler = Arc::clone(&self.handler);

        let task = tokio::spawn(async move {
            let _guard = guard;
            let _permit = permit;
            let outcome = AssertUnwindSafe(handler.handle_connect(conn))
                .catch_unwind()
                .await;
            if outcome.is_err() {
                metrics::record_handler_panic();
                tracing::error!(connection_id = %id, peer_addr = %peer_addr, "Connection handler panicked");
            }
        });

        // The task may already be done; then there is nothing to attach.
        self.registry
            .mutate(|r| r.attach_handler(listener, id, task.abort_handle()));
    }
}

/// Removes a connection from the registry when dropped.
struct ConnectionGuard {
    registry: Arc<SharedRegistry>,
    listener: ListenerId,
    id: ConnectionId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry
            .mutate(|r| r.remove_connection(self.listener, self.id));
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}
