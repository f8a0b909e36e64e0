//! Shared backends and proxy setup for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;

use axum::{
    body::Body,
    http::{header, Request},
    response::IntoResponse,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use relay_proxy::config::{HostConfig, RouteConfig};
use relay_proxy::ws::WsServer;
use relay_proxy::{HttpServer, Shutdown};

/// Running proxy; dropping it stops the server.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), std::io::Error>>,
}

pub fn route(domain: &str, destination: &str, preserve_host: bool) -> RouteConfig {
    let mut conf = toml::Table::new();
    conf.insert("host".into(), toml::Value::String(destination.into()));
    conf.insert("preserveHost".into(), toml::Value::Boolean(preserve_host));
    RouteConfig {
        domain: domain.to_string(),
        conf: Some(conf),
    }
}

pub async fn start_proxy(routes: Vec<RouteConfig>) -> TestProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let config = HostConfig {
        routes,
        ..Default::default()
    };
    let server = HttpServer::new(config).unwrap();
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));

    TestProxy {
        addr,
        shutdown,
        handle,
    }
}

/// HTTP backend answering `"<method> <path?query> host=<Host> body=<body>"`
/// with an `A-CUSTOM: THING` header.
pub async fn start_http_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().fallback(http_echo);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

async fn http_echo(request: Request<Body>) -> impl IntoResponse {
    let method = request.method().clone();
    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.to_string())
        .unwrap_or_default();
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = axum::body::to_bytes(request.into_body(), 1024 * 1024)
        .await
        .unwrap_or_default();

    (
        [("a-custom", "THING")],
        format!(
            "{} {} host={} body={}",
            method,
            target,
            host,
            String::from_utf8_lossy(&body)
        ),
    )
}

/// Echo backend built on this crate's WebSocket server.
pub async fn start_ws_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut server = WsServer::new(stream);
                if server.accept().await.is_ok() {
                    let _ = server.echo().await;
                }
            });
        }
    });
    addr
}

/// Echo backend built on tokio-tungstenite.
pub async fn start_tungstenite_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_text() || msg.is_binary() {
                        if ws.send(msg).await.is_err() {
                            break;
                        }
                    } else if msg.is_close() {
                        break;
                    }
                }
            });
        }
    });
    addr
}

/// An address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
