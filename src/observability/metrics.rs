//! Metrics collection and exposition.
//!
//! # Metrics
//! - `demon_ring_connections_accepted_total` (counter)
//! - `demon_ring_accept_errors_total` (counter, `kind` = temporary|permanent)
//! - `demon_ring_handler_panics_total` (counter)
//! - `demon_ring_active_connections` (gauge)
//! - `demon_ring_active_listeners` (gauge)

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const CONNECTIONS_ACCEPTED: &str = "demon_ring_connections_accepted_total";
pub const ACCEPT_ERRORS: &str = "demon_ring_accept_errors_total";
pub const HANDLER_PANICS: &str = "demon_ring_handler_panics_total";
pub const ACTIVE_CONNECTIONS: &str = "demon_ring_active_connections";
pub const ACTIVE_LISTENERS: &str = "demon_ring_active_listeners";

/// Install the Prometheus exporter with an HTTP scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_accept() {
    counter!(CONNECTIONS_ACCEPTED).increment(1);
}

pub fn record_accept_error(kind: &'static str) {
    counter!(ACCEPT_ERRORS, "kind" => kind).increment(1);
}

pub fn record_handler_panic() {
    counter!(HANDLER_PANICS).increment(1);
}

/// Add `delta` (possibly negative) to the live connection gauge.
pub fn adjust_active_connections(delta: i64) {
    adjust(ACTIVE_CONNECTIONS, delta);
}

/// Add `delta` (possibly negative) to the served listener gauge.
pub fn adjust_active_listeners(delta: i64) {
    adjust(ACTIVE_LISTENERS, delta);
}

fn adjust(name: &'static str, delta: i64) {
    match delta {
        0 => {}
        d if d > 0 => gauge!(name).increment(d as f64),
        d => gauge!(name).decrement(d.unsigned_abs() as f64),
    }
}
