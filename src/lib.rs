//! HTTP and WebSocket reverse proxy.
//!
//! Each configured route owns a [`proxy::ProxyDispatcher`]. Plain requests
//! are rewritten and forwarded; WebSocket upgrades are taken over and
//! relayed byte for byte to the upstream. The [`ws`] module carries a
//! standalone WebSocket client and server used by the `ws-echo` tool.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;
pub mod routing;
pub mod ws;

pub use config::HostConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use proxy::ProxyDispatcher;
