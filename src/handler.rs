//! Connection handler capability.
//!
//! The server never looks at a connection's bytes. It hands every accepted
//! connection to a [`ConnectionHandler`] on its own task and forgets about
//! it; the handler owns the stream from then on.

use std::future::Future;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::net::{Connection, ConnectionContext};

const DEFAULT_ECHO_BUFFER: usize = 8 * 1024;
const MAX_ECHO_BUFFER: usize = 1024 * 1024;

/// Per-connection application logic.
///
/// Invoked once per accepted connection. Its outcome is ignored and a panic
/// inside it is contained to the connection's task.
pub trait ConnectionHandler<C>: Send + Sync + 'static {
    fn handle_connect(&self, conn: Connection<C>) -> impl Future<Output = ()> + Send;
}

/// Handler built from a closure, see [`handler_fn`].
#[derive(Debug, Clone)]
pub struct HandlerFn<F>(F);

/// Build a [`ConnectionHandler`] from an async closure.
pub fn handler_fn<F>(f: F) -> HandlerFn<F> {
    HandlerFn(f)
}

impl<C, F, Fut> ConnectionHandler<C> for HandlerFn<F>
where
    C: Send + 'static,
    F: Fn(Connection<C>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn handle_connect(&self, conn: Connection<C>) -> impl Future<Output = ()> + Send {
        (self.0)(conn)
    }
}

/// Writes back whatever it reads until EOF or server shutdown.
///
/// Reads with a buffer of `read_buffer_size` bytes (8 KiB when unset or not
/// positive, capped at 1 MiB).
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

impl EchoHandler {
    pub fn new() -> Self {
        Self
    }
}

impl<C> ConnectionHandler<C> for EchoHandler
where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn handle_connect(&self, conn: Connection<C>) {
        let (mut stream, ctx) = conn.into_parts();
        match echo(&mut stream, &ctx).await {
            Ok(bytes) => {
                tracing::debug!(connection_id = %ctx.id, peer_addr = %ctx.peer_addr, bytes, "Echo finished");
            }
            Err(e) => {
                tracing::debug!(connection_id = %ctx.id, peer_addr = %ctx.peer_addr, error = %e, "Echo failed");
            }
        }
    }
}

async fn echo<C>(stream: &mut C, ctx: &ConnectionContext) -> io::Result<u64>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_len(ctx.options.read_buffer_size)];
    let mut shutdown = ctx.shutdown.clone();
    let mut total = 0u64;

    loop {
        let n = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            res = stream.read(&mut buf) => res?,
        };
        if n == 0 {
            break;
        }
        stream.write_all(&buf[..n]).await?;
        total += n as u64;
    }

    stream.shutdown().await?;
    Ok(total)
}

fn buffer_len(configured: i64) -> usize {
    match usize::try_from(configured) {
        Ok(0) | Err(_) => DEFAULT_ECHO_BUFFER,
        Ok(n) => n.min(MAX_ECHO_BUFFER),
    }
}
