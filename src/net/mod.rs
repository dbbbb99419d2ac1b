//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, keep-alive, abortable by close)
//!     → classify.rs (on failure: temporary or permanent)
//!     → connection.rs (identity + record handed to the handler)
//! ```
//!
//! # Design Decisions
//! - The accept loop only sees the `Listener` trait, so tests can script it
//! - Closing a listener is the one way to unblock an accept from outside

pub mod classify;
pub mod connection;
pub mod listener;

pub use classify::is_temporary;
pub use connection::{Connection, ConnectionContext, ConnectionId, ListenerId};
pub use listener::{Listener, TcpAcceptor};
