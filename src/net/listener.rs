//! Listener abstraction and the TCP implementation.
//!
//! # Responsibilities
//! - Define what the accept loop needs from a listening socket
//! - Bind TCP listeners and accept streams
//! - Make an in-flight accept abortable by `close()`
//! - Apply TCP keep-alive to accepted streams

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

/// Keep-alive probe period applied to accepted TCP streams by default.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(30);

/// Anything the accept loop can pull connections from.
pub trait Listener: Send + Sync + 'static {
    /// The raw connection type produced by `accept`.
    type Conn: Send + 'static;

    /// Wait for the next connection.
    fn accept(&self) -> impl Future<Output = io::Result<(Self::Conn, SocketAddr)>> + Send;

    /// Stop listening. Any pending `accept` must return an error promptly.
    fn close(&self) -> io::Result<()>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Type-erased view of a [`Listener`] kept in the server's registry.
pub trait ListenerHandle: Send + Sync {
    fn close_listener(&self) -> io::Result<()>;

    fn listener_addr(&self) -> io::Result<SocketAddr>;
}

impl<L: Listener> ListenerHandle for L {
    fn close_listener(&self) -> io::Result<()> {
        Listener::close(self)
    }

    fn listener_addr(&self) -> io::Result<SocketAddr> {
        Listener::local_addr(self)
    }
}

/// The error returned by `accept` after `close`.
pub fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "use of closed listener")
}

/// A TCP listener whose accept can be aborted by [`close`](Listener::close).
///
/// The socket itself is released when the acceptor is dropped.
#[derive(Debug)]
pub struct TcpAcceptor {
    inner: TcpListener,
    closed: watch::Sender<bool>,
    keepalive: Option<Duration>,
}

impl TcpAcceptor {
    /// Bind to `addr` with the default keep-alive period.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let acceptor = Self::from_listener(listener);

        tracing::info!(
            address = %acceptor.inner.local_addr()?,
            "Listener bound"
        );

        Ok(acceptor)
    }

    /// Wrap an already bound listener.
    pub fn from_listener(inner: TcpListener) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            inner,
            closed,
            keepalive: Some(DEFAULT_KEEPALIVE),
        }
    }

    /// Override the keep-alive period; `None` leaves accepted sockets untouched.
    pub fn with_keepalive(mut self, period: Option<Duration>) -> Self {
        self.keepalive = period;
        self
    }

    pub fn keepalive(&self) -> Option<Duration> {
        self.keepalive
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn configure(&self, stream: &TcpStream, peer: SocketAddr) {
        let Some(period) = self.keepalive else {
            return;
        };
        if let Err(e) = SockRef::from(stream).set_tcp_keepalive(&keepalive_params(period)) {
            tracing::debug!(peer_addr = %peer, error = %e, "Failed to enable keep-alive");
        }
    }
}

impl Listener for TcpAcceptor {
    type Conn = TcpStream;

    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        let mut closed = self.closed.subscribe();

        tokio::select! {
            biased;
            _ = wait_closed(&mut closed) => Err(closed_error()),
            res = self.inner.accept() => {
                let (stream, peer) = res?;
                self.configure(&stream, peer);
                Ok((stream, peer))
            }
        }
    }

    fn close(&self) -> io::Result<()> {
        if self.closed.send_replace(true) {
            return Err(closed_error());
        }
        tracing::debug!(address = ?self.inner.local_addr().ok(), "Listener closed");
        Ok(())
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

/// Idle time and probe interval both set to `period`.
fn keepalive_params(period: Duration) -> TcpKeepalive {
    let params = TcpKeepalive::new().with_time(period);
    #[cfg(any(
        target_os = "android",
        target_os = "freebsd",
        target_os = "ios",
        target_os = "linux",
        target_os = "macos",
        target_os = "netbsd",
        windows,
    ))]
    let params = params.with_interval(period);
    params
}

async fn wait_closed(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
