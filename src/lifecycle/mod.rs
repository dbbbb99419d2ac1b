//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Bind listeners → Serve each listener
//!
//! Shutdown (shutdown.rs):
//!     Signal fired → Accept loops stop accepting → Drain connections → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → graceful stop; a second one → immediate stop
//! ```
//!
//! # Design Decisions
//! - Fail fast: any bind error is fatal and reported, never swallowed
//! - Listeners start last (traffic only when ready)
//! - Graceful shutdown has a deadline, then falls back to an immediate stop

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownListener};
