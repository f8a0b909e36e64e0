//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (read & deserialize)
//!     → HostConfig (immutable)
//!     → routes[].conf handed untyped to proxy::ProxyDispatcher::initialize
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All host fields have defaults to allow minimal configs
//! - Route tables stay untyped until the proxy validates them

pub mod loader;
pub mod schema;

pub use loader::{load_config, LoadError};
pub use schema::{HostConfig, ListenerConfig, ObservabilityConfig, RouteConfig, DEFAULT_DOMAIN};
