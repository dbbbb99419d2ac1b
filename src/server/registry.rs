//! Listener and connection registries.
//!
//! # State
//! ```text
//! listeners:   Option<ListenerId → close handle>   (None once Stopped)
//! connections: ListenerId → (ConnectionId → entry) (inner maps never empty)
//! state:       Created → Serving → Draining → Stopped
//! ```
//!
//! Everything sits behind one mutex. Every mutation goes through
//! [`SharedRegistry::mutate`], which publishes a change notification so a
//! task waiting for the drain predicate re-checks it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::net::listener::ListenerHandle;
use crate::net::{ConnectionId, ListenerId};
use crate::observability::metrics;
use crate::server::ServeError;

/// Lifecycle state of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Constructed, nothing served yet.
    Created,
    /// At least one listener has been served.
    Serving,
    /// Graceful stop in progress; no new connections are accepted.
    Draining,
    /// Terminal.
    Stopped,
}

#[derive(Debug)]
struct ConnectionEntry {
    peer_addr: SocketAddr,
    abort: Option<AbortHandle>,
}

/// Registry contents. Only reachable through [`SharedRegistry`].
pub(crate) struct Registry {
    state: ServerState,
    listeners: Option<HashMap<ListenerId, Arc<dyn ListenerHandle>>>,
    connections: HashMap<ListenerId, HashMap<ConnectionId, ConnectionEntry>>,
}

/// What [`Registry::tear_down`] hands back for closing outside the lock.
pub(crate) struct TornDown {
    pub listeners: Vec<(ListenerId, Arc<dyn ListenerHandle>)>,
    pub handlers: Vec<AbortHandle>,
}

impl Registry {
    fn new() -> Self {
        Self {
            state: ServerState::Created,
            listeners: Some(HashMap::new()),
            connections: HashMap::new(),
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn register_listener(
        &mut self,
        id: ListenerId,
        handle: Arc<dyn ListenerHandle>,
    ) -> Result<(), ServeError> {
        let listeners = self.listeners.as_mut().ok_or(ServeError::ServerStopped)?;
        listeners.insert(id, handle);
        if self.state == ServerState::Created {
            self.state = ServerState::Serving;
        }
        Ok(())
    }

    /// Remove a listener. Whoever gets the handle back is responsible for closing it.
    pub fn unregister_listener(&mut self, id: ListenerId) -> Option<Arc<dyn ListenerHandle>> {
        self.listeners.as_mut()?.remove(&id)
    }

    /// Record an accepted connection. Fails once the server is stopped.
    pub fn insert_connection(
        &mut self,
        listener: ListenerId,
        id: ConnectionId,
        peer_addr: SocketAddr,
    ) -> bool {
        if self.listeners.is_none() {
            return false;
        }
        self.connections.entry(listener).or_default().insert(
            id,
            ConnectionEntry {
                peer_addr,
                abort: None,
            },
        );
        true
    }

    /// Attach the handler task so a forced stop can abort it.
    ///
    /// Returns `false` if the connection is already gone.
    pub fn attach_handler(
        &mut self,
        listener: ListenerId,
        id: ConnectionId,
        abort: AbortHandle,
    ) -> bool {
        match self
            .connections
            .get_mut(&listener)
            .and_then(|conns| conns.get_mut(&id))
        {
            Some(entry) => {
                entry.abort = Some(abort);
                true
            }
            None => false,
        }
    }

    pub fn remove_connection(&mut self, listener: ListenerId, id: ConnectionId) -> bool {
        let Some(conns) = self.connections.get_mut(&listener) else {
            return false;
        };
        let removed = conns.remove(&id).is_some();
        if conns.is_empty() {
            self.connections.remove(&listener);
        }
        removed
    }

    pub fn begin_drain(&mut self) {
        if self.state != ServerState::Stopped {
            self.state = ServerState::Draining;
        }
    }

    /// Both registries empty.
    pub fn is_drained(&self) -> bool {
        self.listeners.as_ref().map_or(true, HashMap::is_empty) && self.connections.is_empty()
    }

    /// Enter the terminal state after a drain.
    pub fn finish(&mut self) {
        self.listeners = None;
        self.state = ServerState::Stopped;
    }

    /// Enter the terminal state immediately, handing back everything that
    /// must be closed or aborted.
    pub fn tear_down(&mut self) -> TornDown {
        self.state = ServerState::Stopped;
        let listeners = self
            .listeners
            .take()
            .map(|l| l.into_iter().collect())
            .unwrap_or_default();
        let handlers = self
            .connections
            .drain()
            .flat_map(|(_, conns)| conns.into_values())
            .filter_map(|entry| entry.abort)
            .collect();
        TornDown {
            listeners,
            handlers,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.as_ref().map_or(0, HashMap::len)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.values().map(HashMap::len).sum()
    }

    /// Peer addresses of live connections on one listener.
    pub fn peers(&self, listener: ListenerId) -> Vec<SocketAddr> {
        self.connections
            .get(&listener)
            .map(|conns| conns.values().map(|e| e.peer_addr).collect())
            .unwrap_or_default()
    }
}

/// The registry together with its change notification.
pub(crate) struct SharedRegistry {
    inner: Mutex<Registry>,
    changed: watch::Sender<()>,
}

impl SharedRegistry {
    pub fn new() -> Self {
        let (changed, _) = watch::channel(());
        Self {
            inner: Mutex::new(Registry::new()),
            changed,
        }
    }

    /// Read-only access.
    pub fn lock(&self) -> MutexGuard<'_, Registry> {
        // Registry operations never panic midway, so a poisoned lock still
        // holds consistent data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate under the lock and wake every waiter.
    ///
    /// The active gauges are process-wide, so each server only adds its own
    /// change to them.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut Registry) -> R) -> R {
        let (result, listeners, connections) = {
            let mut registry = self.lock();
            let listeners = registry.listener_count();
            let connections = registry.connection_count();
            let result = f(&mut registry);
            (
                result,
                delta(listeners, registry.listener_count()),
                delta(connections, registry.connection_count()),
            )
        };
        metrics::adjust_active_listeners(listeners);
        metrics::adjust_active_connections(connections);
        self.changed.send_replace(());
        result
    }

    /// Move to `Stopped` if both registries are empty.
    ///
    /// The check and the transition share one critical section, so a listener
    /// registered concurrently either keeps the drain open or is rejected.
    /// Otherwise returns the outstanding listener and connection counts.
    pub fn finish_if_drained(&self) -> Result<(), (usize, usize)> {
        let outcome = {
            let mut registry = self.lock();
            if registry.is_drained() {
                registry.finish();
                Ok(())
            } else {
                Err((registry.listener_count(), registry.connection_count()))
            }
        };
        if outcome.is_ok() {
            self.changed.send_replace(());
        }
        outcome
    }

    /// Subscribe to change notifications.
    ///
    /// Subscribe *before* checking a predicate, so a mutation that lands
    /// between the check and the wait is not missed.
    pub fn subscribe(&self) -> watch::Receiver<()> {
        self.changed.subscribe()
    }
}

fn delta(before: usize, after: usize) -> i64 {
    after as i64 - before as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingHandle {
        closes: AtomicUsize,
    }

    impl ListenerHandle for CountingHandle {
        fn close_listener(&self) -> io::Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn listener_addr(&self) -> io::Result<SocketAddr> {
            Ok("127.0.0.1:0".parse().unwrap())
        }
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:5555".parse().unwrap()
    }

    #[test]
    fn first_listener_moves_to_serving() {
        let mut reg = Registry::new();
        assert_eq!(reg.state(), ServerState::Created);
        assert!(reg.is_drained());

        let id = ListenerId::next();
        reg.register_listener(id, Arc::new(CountingHandle::default()))
            .unwrap();
        assert_eq!(reg.state(), ServerState::Serving);
        assert_eq!(reg.listener_count(), 1);
        assert!(!reg.is_drained());

        assert!(reg.unregister_listener(id).is_some());
        assert!(reg.unregister_listener(id).is_none());
        assert!(reg.is_drained());
    }

    #[test]
    fn connections_keep_drain_open() {
        let mut reg = Registry::new();
        let lis = ListenerId::next();
        let conn = ConnectionId::next();

        assert!(reg.insert_connection(lis, conn, peer()));
        assert_eq!(reg.connection_count(), 1);
        assert_eq!(reg.peers(lis), vec![peer()]);
        assert!(!reg.is_drained());

        assert!(reg.remove_connection(lis, conn));
        assert!(!reg.remove_connection(lis, conn));
        assert!(reg.is_drained());
        assert!(reg.peers(lis).is_empty());
    }

    #[test]
    fn stopped_registry_rejects_everything() {
        let mut reg = Registry::new();
        let handle = Arc::new(CountingHandle::default());
        let lis = ListenerId::next();
        reg.register_listener(lis, handle.clone()).unwrap();
        reg.insert_connection(lis, ConnectionId::next(), peer());

        let torn = reg.tear_down();
        assert_eq!(torn.listeners.len(), 1);
        assert_eq!(reg.state(), ServerState::Stopped);
        assert!(reg.is_drained());

        let err = reg
            .register_listener(ListenerId::next(), handle)
            .unwrap_err();
        assert!(err.is_server_stopped());
        assert!(!reg.insert_connection(lis, ConnectionId::next(), peer()));

        // A second tear down has nothing left to hand out.
        let again = reg.tear_down();
        assert!(again.listeners.is_empty());
        assert!(again.handlers.is_empty());
    }

    #[test]
    fn drain_then_finish() {
        let mut reg = Registry::new();
        reg.begin_drain();
        assert_eq!(reg.state(), ServerState::Draining);
        reg.finish();
        assert_eq!(reg.state(), ServerState::Stopped);
        reg.begin_drain();
        assert_eq!(reg.state(), ServerState::Stopped);
    }

    #[test]
    fn finish_waits_for_late_listener() {
        let shared = SharedRegistry::new();
        let handle = Arc::new(CountingHandle::default());
        shared.mutate(|r| r.begin_drain());

        let late = ListenerId::next();
        shared
            .mutate(|r| r.register_listener(late, handle.clone()))
            .unwrap();
        assert_eq!(shared.finish_if_drained(), Err((1, 0)));
        assert_eq!(shared.lock().state(), ServerState::Draining);

        // The late listener is still there for its owner to close.
        let removed = shared.mutate(|r| r.unregister_listener(late)).unwrap();
        removed.close_listener().unwrap();
        assert_eq!(handle.closes.load(Ordering::SeqCst), 1);

        assert_eq!(shared.finish_if_drained(), Ok(()));
        assert_eq!(shared.lock().state(), ServerState::Stopped);
        let err = shared
            .mutate(|r| r.register_listener(ListenerId::next(), handle.clone()))
            .unwrap_err();
        assert!(err.is_server_stopped());
    }

    #[test]
    fn delta_is_signed() {
        assert_eq!(delta(3, 1), -2);
        assert_eq!(delta(0, 2), 2);
        assert_eq!(delta(4, 4), 0);
    }

    #[tokio::test]
    async fn mutation_notifies_subscribers() {
        let shared = SharedRegistry::new();
        let mut rx = shared.subscribe();
        shared.mutate(|r| r.insert_connection(ListenerId::next(), ConnectionId::next(), peer()));
        rx.changed().await.unwrap();
        assert_eq!(shared.lock().connection_count(), 1);
    }
}
