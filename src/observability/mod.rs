//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Accept loops, registry, handler tasks produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout via tracing-subscriber
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Events carry `listener` / `connection_id` fields for correlation
//! - Metric updates are cheap; recording without an installed exporter is a no-op

pub mod logging;
pub mod metrics;
