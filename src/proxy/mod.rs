//! Proxy plugin: one dispatcher per configured route.
//!
//! # Data Flow
//! ```text
//! route table (untyped toml::Table)
//!     → config.rs (validate into ProxyConfig)
//!     → dispatcher.rs (ProxyDispatcher, shared via Arc)
//!
//! Per request:
//!     dispatcher.rs
//!         → transport.rs Transport (plain HTTP)
//!         → transport.rs Connector + net::relay (WebSocket upgrade)
//! ```

pub mod config;
pub mod dispatcher;
pub mod transport;

pub use config::{ConfigError, ProxyConfig, RawConfig};
pub use dispatcher::{is_websocket, DispatchError, ProxyDispatcher};
pub use transport::{Connector, HyperTransport, TcpConnector, Transport};
