//! Destination address resolution.

use thiserror::Error;
use url::Url;

/// The URL has no explicit port and its scheme has no default one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid scheme {0}")]
pub struct InvalidScheme(pub String);

/// Resolve `host:port` for a WebSocket URL.
///
/// An explicit port always wins; otherwise `ws` maps to 80 and `wss` to 443.
pub fn host_port(url: &Url) -> Result<String, InvalidScheme> {
    let host = url.host_str().unwrap_or_default();
    let port = match url.port() {
        Some(port) => port,
        None => match url.scheme() {
            "ws" => 80,
            "wss" => 443,
            other => return Err(InvalidScheme(other.to_string())),
        },
    };
    Ok(format!("{}:{}", host, port))
}

/// The `host[:port]` authority as it appears in the URL.
pub fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}
