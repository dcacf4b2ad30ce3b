// SPDX-License-Identifier: MIT
//! Origin allowlist shared by all three services.
//!
//! The HTTP services apply the policy through a tower-http `CorsLayer`; the
//! terminal service checks the `Origin` header directly during the websocket
//! handshake, with the loosened development rules the demo relies on.

use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::config::CorsConfig;

/// Origin substrings accepted by the terminal handshake only. Covers local
/// development (any port) and private-LAN testing.
const TERMINAL_DEV_SUBSTRINGS: &[&str] = &["localhost", "127.0.0.1", "192.168.", "10.0."];

#[derive(Debug, Clone)]
pub struct OriginPolicy {
    exact: Vec<String>,
    suffixes: Vec<String>,
}

impl OriginPolicy {
    pub fn from_config(cors: &CorsConfig) -> Self {
        Self {
            exact: cors.allowed_origins.clone(),
            suffixes: cors.allowed_suffixes.clone(),
        }
    }

    /// Strict check used by the HTTP CORS layers: exact allowlist entry or a
    /// configured host suffix on an http(s) origin.
    pub fn allows(&self, origin: &str) -> bool {
        if self.exact.iter().any(|o| o == origin) {
            return true;
        }
        let is_http = origin.starts_with("http://") || origin.starts_with("https://");
        is_http && self.suffixes.iter().any(|s| origin.ends_with(s.as_str()))
    }

    /// Loosened check for the websocket handshake. Empty origins (non-browser
    /// clients) are accepted, as are local and private-LAN origins on any port.
    pub fn allows_terminal(&self, origin: &str) -> bool {
        if origin.is_empty() {
            return true;
        }
        if self.allows(origin) {
            return true;
        }
        if TERMINAL_DEV_SUBSTRINGS.iter().any(|s| origin.contains(s)) {
            return true;
        }
        warn!(origin, "websocket origin rejected");
        false
    }

    /// CORS layer for the axum routers: origin predicate over this policy,
    /// GET/POST/OPTIONS, the headers the UI sends, 24h preflight cache.
    pub fn cors_layer(&self) -> CorsLayer {
        let policy = self.clone();
        CorsLayer::new()
            .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
                origin.to_str().map(|o| policy.allows(o)).unwrap_or(false)
            }))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([
                header::ORIGIN,
                header::CONTENT_TYPE,
                header::ACCEPT,
                header::AUTHORIZATION,
                HeaderName::from_static("x-requested-with"),
            ])
            .max_age(Duration::from_secs(86_400))
    }
}
