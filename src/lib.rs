//! demon-ring: a connection-accepting server lifecycle manager.
//!
//! Owns listening sockets, turns accepted connections into handler tasks,
//! rides out transient accept failures with capped backoff, and shuts down
//! either immediately ([`Server::stop`]) or by draining
//! ([`Server::graceful_stop`]).
//!
//! ```no_run
//! use demon_ring::{handler::EchoHandler, server::options, Server};
//!
//! # async fn demo() -> Result<(), demon_ring::ServeError> {
//! let server = Server::new(EchoHandler, [options::read_buffer_size(16 * 1024)]);
//! server.serve_tcp("127.0.0.1:7000".parse().unwrap()).await
//! # }
//! ```

pub mod config;
pub mod handler;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod server;

pub use config::ServerConfig;
pub use handler::{handler_fn, ConnectionHandler, EchoHandler};
pub use lifecycle::Shutdown;
pub use net::{Connection, Listener, TcpAcceptor};
pub use server::{ServeError, Server, ServerOption, ServerOptions, ServerState};
