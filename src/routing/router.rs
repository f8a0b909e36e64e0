//! Route lookup.
//!
//! # Responsibilities
//! - Initialize one dispatcher per configured route at startup
//! - Look up the dispatcher for a request's Host
//! - Fall back to the `default` route when no host matches
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(1) host lookup via HashMap
//! - Any route with a bad plugin config fails the whole table

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::Request;
use thiserror::Error;

use crate::config::{RouteConfig, DEFAULT_DOMAIN};
use crate::proxy::{ConfigError, ProxyDispatcher};
use crate::routing::matcher::{normalize_host, request_host};

/// A route whose plugin config was rejected.
#[derive(Debug, Error)]
#[error("route {domain}: {source}")]
pub struct RouteError {
    pub domain: String,
    #[source]
    pub source: ConfigError,
}

/// Compiled, immutable host → dispatcher table.
#[derive(Default)]
pub struct RouteTable {
    hosts: HashMap<String, Arc<ProxyDispatcher>>,
    fallback: Option<Arc<ProxyDispatcher>>,
}

impl RouteTable {
    /// Initialize every route's dispatcher. The first route for a domain wins.
    pub fn from_config(routes: &[RouteConfig]) -> Result<Self, RouteError> {
        let mut table = Self::default();
        for route in routes {
            let dispatcher = ProxyDispatcher::initialize(&route.domain, route.conf.as_ref()).map_err(
                |source| RouteError {
                    domain: route.domain.clone(),
                    source,
                },
            )?;
            table.insert(&route.domain, dispatcher);
        }
        Ok(table)
    }

    pub fn insert(&mut self, domain: &str, dispatcher: ProxyDispatcher) {
        let dispatcher = Arc::new(dispatcher);
        if domain.eq_ignore_ascii_case(DEFAULT_DOMAIN) {
            if self.fallback.is_some() {
                tracing::warn!(domain = %domain, "Duplicate default route ignored");
                return;
            }
            self.fallback = Some(dispatcher);
            return;
        }

        let host = normalize_host(domain);
        if self.hosts.contains_key(&host) {
            tracing::warn!(domain = %domain, "Duplicate route ignored");
            return;
        }
        self.hosts.insert(host, dispatcher);
    }

    pub fn match_request<B>(&self, req: &Request<B>) -> Option<&Arc<ProxyDispatcher>> {
        request_host(req)
            .and_then(|host| self.hosts.get(&host))
            .or(self.fallback.as_ref())
    }

    pub fn len(&self) -> usize {
        self.hosts.len() + usize::from(self.fallback.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
