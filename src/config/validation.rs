//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Bind addresses parse and are unique
//! - Grace period is non-zero
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Server option values are not checked here; they are carried as given

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no listeners configured")]
    NoListeners,

    #[error("invalid bind address {0:?}")]
    InvalidBindAddress(String),

    #[error("duplicate bind address {0}")]
    DuplicateBindAddress(SocketAddr),

    #[error("shutdown grace period must be greater than zero")]
    ZeroGracePeriod,

    #[error("invalid metrics address {0:?}")]
    InvalidMetricsAddress(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listeners.is_empty() {
        errors.push(ValidationError::NoListeners);
    }

    let mut seen = HashSet::new();
    for listener in &config.listeners {
        match listener.bind_address.parse::<SocketAddr>() {
            Ok(addr) => {
                // Port 0 picks a fresh port each time, so repeats are fine.
                if addr.port() != 0 && !seen.insert(addr) {
                    errors.push(ValidationError::DuplicateBindAddress(addr));
                }
            }
            Err(_) => errors.push(ValidationError::InvalidBindAddress(
                listener.bind_address.clone(),
            )),
        }
    }

    if config.shutdown.grace_period_secs == 0 {
        errors.push(ValidationError::ZeroGracePeriod);
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
