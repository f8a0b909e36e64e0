//! Host HTTP protocol handling.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, upgrades enabled)
//!     → routing::RouteTable (Host → ProxyDispatcher)
//!     → proxy::ProxyDispatcher (HTTP forward or WebSocket relay)
//!     → Send to client
//! ```

pub mod server;

pub use server::HttpServer;
