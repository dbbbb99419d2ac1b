//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Accept failure:
//!     → net::classify (temporary or permanent?)
//!     → temporary: backoff.rs computes the next delay, loop sleeps and retries
//!     → permanent: accept loop terminates
//! ```
//!
//! # Design Decisions
//! - Delays are deterministic (no jitter) so the retry schedule is predictable
//! - Delay is capped; sustained resource exhaustion never turns into a spin
//! - A successful accept resets the schedule

pub mod backoff;

pub use backoff::{calculate_backoff, AcceptBackoff, ACCEPT_BACKOFF_BASE, ACCEPT_BACKOFF_MAX};
