//! Server option set.
//!
//! Options are built with the functional-options pattern: every constructor
//! returns a [`ServerOption`] that overwrites exactly one field, and
//! [`Server::new`](crate::server::Server::new) applies them in order over the
//! defaults, so the last write wins.
//!
//! No validation happens here. Out-of-range values (a negative buffer size,
//! say) are stored as given and left to whatever consumes them.

use std::fmt;

/// Default cap on a received message: 4 MiB.
pub const DEFAULT_MAX_RECEIVE_MESSAGE_SIZE: i64 = 4 * 1024 * 1024;

/// Default cap on a sent message.
pub const DEFAULT_MAX_SEND_MESSAGE_SIZE: i64 = i32::MAX as i64;

/// Immutable configuration carried by a server and forwarded to handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Maximum concurrently running handler invocations; `0` means unbounded.
    pub max_concurrent_streams: u32,
    pub max_receive_message_size: i64,
    pub max_send_message_size: i64,
    pub initial_window_size: i32,
    pub initial_conn_window_size: i32,
    pub write_buffer_size: i64,
    pub read_buffer_size: i64,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            max_concurrent_streams: 0,
            max_receive_message_size: DEFAULT_MAX_RECEIVE_MESSAGE_SIZE,
            max_send_message_size: DEFAULT_MAX_SEND_MESSAGE_SIZE,
            initial_window_size: 0,
            initial_conn_window_size: 0,
            write_buffer_size: 0,
            read_buffer_size: 0,
        }
    }
}

impl ServerOptions {
    /// Apply options over the defaults, in order.
    pub fn from_options<I>(options: I) -> Self
    where
        I: IntoIterator<Item = ServerOption>,
    {
        let mut opts = Self::default();
        for option in options {
            option.apply(&mut opts);
        }
        opts
    }
}

/// A single configuration override.
pub struct ServerOption(Box<dyn Fn(&mut ServerOptions) + Send + Sync>);

impl ServerOption {
    fn new<F>(f: F) -> Self
    where
        F: Fn(&mut ServerOptions) + Send + Sync + 'static,
    {
        Self(Box::new(f))
    }

    pub fn apply(&self, opts: &mut ServerOptions) {
        (self.0)(opts)
    }
}

impl fmt::Debug for ServerOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ServerOption")
    }
}

/// Size of the per-connection write buffer.
pub fn write_buffer_size(s: i64) -> ServerOption {
    ServerOption::new(move |o| o.write_buffer_size = s)
}

/// Size of the per-connection read buffer.
pub fn read_buffer_size(s: i64) -> ServerOption {
    ServerOption::new(move |o| o.read_buffer_size = s)
}

/// Initial flow-control window for a stream.
pub fn initial_window_size(s: i32) -> ServerOption {
    ServerOption::new(move |o| o.initial_window_size = s)
}

/// Initial flow-control window for a whole connection.
pub fn initial_conn_window_size(s: i32) -> ServerOption {
    ServerOption::new(move |o| o.initial_conn_window_size = s)
}

/// Alias for [`max_recv_msg_size`].
pub fn max_msg_size(m: i64) -> ServerOption {
    max_recv_msg_size(m)
}

pub fn max_recv_msg_size(m: i64) -> ServerOption {
    ServerOption::new(move |o| o.max_receive_message_size = m)
}

pub fn max_send_msg_size(m: i64) -> ServerOption {
    ServerOption::new(move |o| o.max_send_message_size = m)
}

/// Limit on concurrently running handler invocations; `0` disables the limit.
pub fn max_concurrent_streams(n: u32) -> ServerOption {
    ServerOption::new(move |o| o.max_concurrent_streams = n)
}
