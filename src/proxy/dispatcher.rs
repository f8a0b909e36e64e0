//! Per-request dispatch: HTTP reverse proxy or WebSocket relay.
//!
//! # Data Flow
//! ```text
//! request
//!     → outbound Host (inbound Host if preserve_host, else destination's)
//!     → Connection: upgrade + Upgrade: websocket ?
//!         yes → take OnUpgrade (none → 500)
//!               → ws(s) URL, host:port → dial (fail → 500)
//!               → write request head → read upstream head (not 101 → 502)
//!               → answer client with upstream's 101
//!               → on client upgrade: ConnectionRelay(client, upstream)
//!         no  → rewrite URI + Host, strip hop-by-hop → Transport (fail → 502)
//! ```

use std::io;
use std::sync::Arc;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::upgrade::OnUpgrade;
use hyper::{Request, StatusCode, Uri, Version};
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufReader};
use url::Url;

use crate::net::addr::{authority, host_port, InvalidScheme};
use crate::net::relay::ConnectionRelay;
use crate::proxy::config::{ConfigError, ProxyConfig, RawConfig};
use crate::proxy::transport::{BoxError, Connector, HyperTransport, TcpConnector, Transport};
use crate::ws::head::{canonical_header_name, read_response_head, ResponseHead};
use crate::ws::WsError;

/// Headers scoped to a single connection, never forwarded on the HTTP path.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Per-request failures; all are answered before any relay starts.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request carries no upgrade handle, so the connection can't be taken over.
    #[error("Response sink does not support hijacking")]
    HijackUnsupported,

    #[error(transparent)]
    InvalidScheme(#[from] InvalidScheme),

    #[error("Error dialing {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Upstream handshake failed: {0}")]
    UpstreamHandshake(#[source] WsError),

    #[error("Upstream refused upgrade with status {0}")]
    UpstreamRefused(u16),

    #[error("Upstream request failed: {0}")]
    Upstream(#[source] BoxError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::HijackUnsupported
            | DispatchError::InvalidScheme(_)
            | DispatchError::Dial { .. }
            | DispatchError::InvalidRequest(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DispatchError::UpstreamHandshake(_)
            | DispatchError::UpstreamRefused(_)
            | DispatchError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, status.canonical_reason().unwrap_or("Error")).into_response()
    }
}

/// One route's proxy. Read-only after construction and shared across requests.
pub struct ProxyDispatcher<C = TcpConnector, T = HyperTransport> {
    config: Arc<ProxyConfig>,
    connector: C,
    transport: T,
}

impl ProxyDispatcher {
    /// Validate a route's raw table and build its dispatcher.
    pub fn initialize(domain: &str, raw: Option<&RawConfig>) -> Result<Self, ConfigError> {
        let config = ProxyConfig::from_raw(raw).inspect_err(|e| {
            tracing::error!(domain = %domain, error = %e, "Route configuration rejected");
        })?;
        tracing::info!(
            domain = %domain,
            destination = %config.destination,
            preserve_host = config.preserve_host,
            "Route initialized"
        );
        Ok(Self::new(config))
    }

    pub fn new(config: ProxyConfig) -> Self {
        Self::with_parts(config, TcpConnector, HyperTransport::new())
    }
}

impl<C, T> ProxyDispatcher<C, T>
where
    C: Connector,
    T: Transport,
{
    pub fn with_parts(config: ProxyConfig, connector: C, transport: T) -> Self {
        Self {
            config: Arc::new(config),
            connector,
            transport,
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// The `Host` the upstream will see. A request without any host falls
    /// back to the destination's authority even when preserving.
    pub fn outbound_host<B>(&self, request: &Request<B>) -> String {
        let inbound = if self.config.preserve_host {
            request
                .headers()
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .filter(|h| !h.is_empty())
                .map(str::to_owned)
                .or_else(|| request.uri().authority().map(|a| a.to_string()))
        } else {
            None
        };
        inbound.unwrap_or_else(|| authority(&self.config.destination))
    }

    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let host = self.outbound_host(&request);
        let upgrade = is_websocket(request.headers());

        tracing::debug!(
            method = %method,
            path = %path,
            outbound_host = %host,
            websocket = upgrade,
            "Dispatching request"
        );

        let result = if upgrade {
            self.relay(request, host).await
        } else {
            self.forward(request, host).await
        };

        result.unwrap_or_else(|e| {
            tracing::error!(method = %method, path = %path, error = %e, "Proxy request failed");
            e.into_response()
        })
    }

    async fn forward(&self, request: Request<Body>, host: String) -> Result<Response, DispatchError> {
        let (mut parts, body) = request.into_parts();
        let target = target_url(&self.config.destination, self.config.destination.scheme(), &parts.uri);
        parts.uri = target
            .parse::<Uri>()
            .map_err(|e| DispatchError::InvalidRequest(e.to_string()))?;
        parts.version = Version::HTTP_11;

        strip_hop_by_hop(&mut parts.headers);
        let host_value =
            HeaderValue::from_str(&host).map_err(|e| DispatchError::InvalidRequest(e.to_string()))?;
        parts.headers.insert(header::HOST, host_value);

        let response = self
            .transport
            .forward(Request::from_parts(parts, body))
            .await
            .map_err(DispatchError::Upstream)?;

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, body))
    }

    async fn relay(&self, mut request: Request<Body>, host: String) -> Result<Response, DispatchError> {
        let on_upgrade = request
            .extensions_mut()
            .remove::<OnUpgrade>()
            .ok_or(DispatchError::HijackUnsupported)?;

        let destination = &self.config.destination;
        let target = target_url(destination, ws_scheme(destination.scheme()), request.uri());
        let url = Url::parse(&target).map_err(|e| DispatchError::InvalidRequest(e.to_string()))?;
        let addr = host_port(&url)?;

        let upstream = self
            .connector
            .connect(&addr)
            .await
            .map_err(|source| DispatchError::Dial {
                addr: addr.clone(),
                source,
            })?;
        let mut upstream = BufReader::new(upstream);

        let head = request_head(&request, &url, &host);
        let written = async {
            upstream.write_all(&head).await?;
            upstream.flush().await
        };
        written
            .await
            .map_err(|e| DispatchError::UpstreamHandshake(WsError::Io(e)))?;

        let answer = read_response_head(&mut upstream)
            .await
            .map_err(DispatchError::UpstreamHandshake)?;
        if answer.status != StatusCode::SWITCHING_PROTOCOLS.as_u16() {
            return Err(DispatchError::UpstreamRefused(answer.status));
        }

        tracing::info!(upstream = %addr, url = %url, "Upgrading to WebSocket relay");
        tokio::spawn(async move {
            match on_upgrade.await {
                Ok(upgraded) => {
                    let relay = ConnectionRelay::new(TokioIo::new(upgraded), upstream);
                    let relay_id = relay.id();
                    let end = relay.run().await;
                    tracing::debug!(relay_id = %relay_id, reason = %end, "Relay finished");
                }
                Err(e) => tracing::warn!(error = %e, "Client connection upgrade failed"),
            }
        });

        Ok(switching_response(&answer))
    }
}

/// `Connection` lists the `upgrade` token and `Upgrade` is `websocket`.
pub fn is_websocket(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    let upgrade_websocket = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"));
    connection_upgrade && upgrade_websocket
}

/// `http` → `ws`, `https` → `wss`; anything else is kept.
fn ws_scheme(scheme: &str) -> &str {
    match scheme {
        "http" => "ws",
        "https" => "wss",
        other => other,
    }
}

/// Destination authority with the destination path joined to the request
/// path and both queries merged.
fn target_url(destination: &Url, scheme: &str, uri: &Uri) -> String {
    let path = join_path(destination.path(), uri.path());
    let query = match (
        destination.query().filter(|q| !q.is_empty()),
        uri.query().filter(|q| !q.is_empty()),
    ) {
        (Some(a), Some(b)) => Some(format!("{}&{}", a, b)),
        (Some(a), None) => Some(a.to_string()),
        (None, Some(b)) => Some(b.to_string()),
        (None, None) => None,
    };

    let mut target = format!("{}://{}{}", scheme, authority(destination), path);
    if let Some(query) = query {
        target.push('?');
        target.push_str(&query);
    }
    target
}

fn join_path(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

/// Request line and headers as sent to the upstream, `Host` rewritten.
fn request_head<B>(request: &Request<B>, url: &Url, host: &str) -> Vec<u8> {
    let mut target = url.path().to_string();
    if target.is_empty() {
        target.push('/');
    }
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }
    let host = if host.is_empty() {
        authority(url)
    } else {
        host.to_string()
    };

    let mut head = format!("{} {} HTTP/1.1\r\nHost: {}\r\n", request.method(), target, host).into_bytes();
    for (name, value) in request.headers() {
        if name == header::HOST {
            continue;
        }
        head.extend_from_slice(canonical_header_name(name.as_str()).as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"\r\n");
    head
}

/// The upstream's 101 answer, replayed to the client.
fn switching_response(answer: &ResponseHead) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    for (name, value) in &answer.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_bytes(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => tracing::debug!(header = %name, "Dropping invalid upstream header"),
        }
    }
    response
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}
