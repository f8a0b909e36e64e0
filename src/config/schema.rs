//! Configuration schema definitions.
//!
//! This module defines the host configuration file. Every section has
//! defaults so a file with only `[[routes]]` entries is valid.

use serde::{Deserialize, Serialize};

/// Route domain used when no other route matches the request's Host.
pub const DEFAULT_DOMAIN: &str = "default";

/// Root configuration for the host server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HostConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Per-domain proxy routes.
    pub routes: Vec<RouteConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter used when `RUST_LOG` is unset (e.g. "info", "relay_proxy=debug").
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "relay_proxy=info,tower_http=info".to_string(),
        }
    }
}

/// One route: a domain and the raw plugin table handed to the proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Host to match, or `"default"` for the fallback route.
    pub domain: String,

    /// Untyped plugin config, validated by the proxy at startup.
    #[serde(default)]
    pub conf: Option<toml::Table>,
}
