//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → options → Vec<ServerOption> → Server::new
//!     → listeners → lifecycle::startup binds them
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Server option values are passed through unvalidated; only the
//!   bootstrap-level settings (addresses, grace period) are checked

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{ListenerConfig, ObservabilityConfig, OptionsConfig, ServerConfig, ShutdownConfig};
