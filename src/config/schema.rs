//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::server::options::{self, ServerOption};

/// Root configuration for the server binary.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Addresses to listen on.
    pub listeners: Vec<ListenerConfig>,

    /// Server option overrides.
    pub options: OptionsConfig,

    /// Shutdown behavior.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:7000").
    pub bind_address: String,

    /// Keep-alive probe period for accepted sockets; 0 disables keep-alive.
    pub keepalive_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:7000".to_string(),
            keepalive_secs: 30,
        }
    }
}

impl ListenerConfig {
    pub fn keepalive(&self) -> Option<Duration> {
        match self.keepalive_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Server option overrides. Unset fields keep the server defaults.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct OptionsConfig {
    pub max_concurrent_streams: Option<u32>,
    pub max_receive_message_size: Option<i64>,
    pub max_send_message_size: Option<i64>,
    pub initial_window_size: Option<i32>,
    pub initial_conn_window_size: Option<i32>,
    pub write_buffer_size: Option<i64>,
    pub read_buffer_size: Option<i64>,
}

impl OptionsConfig {
    /// One [`ServerOption`] per field that is set.
    pub fn to_server_options(&self) -> Vec<ServerOption> {
        let mut opts = Vec::new();
        if let Some(n) = self.max_concurrent_streams {
            opts.push(options::max_concurrent_streams(n));
        }
        if let Some(m) = self.max_receive_message_size {
            opts.push(options::max_recv_msg_size(m));
        }
        if let Some(m) = self.max_send_message_size {
            opts.push(options::max_send_msg_size(m));
        }
        if let Some(s) = self.initial_window_size {
            opts.push(options::initial_window_size(s));
        }
        if let Some(s) = self.initial_conn_window_size {
            opts.push(options::initial_conn_window_size(s));
        }
        if let Some(s) = self.write_buffer_size {
            opts.push(options::write_buffer_size(s));
        }
        if let Some(s) = self.read_buffer_size {
            opts.push(options::read_buffer_size(s));
        }
        opts
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long a graceful stop may drain before connections are aborted.
    pub grace_period_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 30,
        }
    }
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
