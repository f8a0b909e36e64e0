//! Host matching logic.
//!
//! # Design Decisions
//! - Host matching is case-insensitive (RFC 9110)
//! - The port is ignored: `the.site.net:8080` matches `the.site.net`
//! - No regex, exact comparison after normalization

use axum::http::{header, Request};

/// Lowercase a host and drop any `:port` suffix. IPv6 literals keep their brackets.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let bare = if host.starts_with('[') {
        match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        }
    } else {
        match host.rsplit_once(':') {
            Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
            _ => host,
        }
    };
    bare.to_ascii_lowercase()
}

/// Normalized host of a request: the `Host` header, else the URI authority.
pub fn request_host<B>(req: &Request<B>) -> Option<String> {
    req.headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_owned)
        .or_else(|| req.uri().host().map(str::to_owned))
        .map(|h| normalize_host(&h))
        .filter(|h| !h.is_empty())
}
