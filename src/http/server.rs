//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all proxy handler
//! - Wire up middleware (tracing)
//! - Bind server to listener, keeping connection upgrades available
//! - Dispatch requests to the route's ProxyDispatcher
//! - Stop accepting on the shutdown broadcast

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::HostConfig;
use crate::routing::{RouteError, RouteTable};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteTable>,
}

/// Host HTTP server in front of the proxy routes.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server, initializing every configured route.
    pub fn new(config: HostConfig) -> Result<Self, RouteError> {
        let routes = RouteTable::from_config(&config.routes)?;
        tracing::info!(routes = routes.len(), "Route table built");
        if routes.is_empty() {
            tracing::warn!("No routes configured; every request will get 404");
        }

        let state = AppState {
            routes: Arc::new(routes),
        };
        let router = Self::build_router(state);
        Ok(Self { router })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until the shutdown broadcast fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Looks up the route for the request's Host and hands the request to it.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let dispatcher = match state.routes.match_request(&request) {
        Some(d) => d.clone(),
        None => {
            tracing::warn!(
                client = %client,
                path = %request.uri().path(),
                "No route matched"
            );
            return (StatusCode::NOT_FOUND, "No matching route found").into_response();
        }
    };

    tracing::debug!(client = %client, destination = %dispatcher.config().destination, "Route matched");
    dispatcher.dispatch(request).await
}
