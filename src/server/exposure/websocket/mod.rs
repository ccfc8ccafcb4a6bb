//! WebSocket exposure
//!
//! Upgrades `GET {base_url}_s/` to a WebSocket and runs one connection engine
//! per socket.
//!
//! # Architecture
//!
//! ```text
//! Browser ──ws──▶ {base}_s/ ──▶ ws_handler() ──▶ Client::run
//!                                                  │      ▲
//!                                     watch/query/patch   │ ClientHandle::send
//!                                                  ▼      │
//!                                                  Broker / Apps
//! ```
//!
//! # Protocol
//!
//! Client → Server, one message per frame: `<kind> <addr>[ <data>]` where
//! kind is `*` (patch), `@` (query) or `+` (watch).
//!
//! Server → Client, JSON objects joined by `\n` when coalesced:
//! - `{"m": {"username": "...", "editor": false}}`
//! - `{"p": {...}}`
//! - `{"e": "not_found"}`
//! - `{"u": "<base>_auth/logout"}`

mod handler;

use crate::server::host::SyncHost;
use anyhow::Result;
use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// WebSocket exposure implementation
///
/// # Example
///
/// ```rust,ignore
/// use wavesync::prelude::*;
///
/// let broker = Arc::new(InMemoryBroker::new());
/// let host = Arc::new(SyncHost::new(SyncConfig::default(), broker));
/// let app = WebSocketExposure::build_router(host)?;
/// ```
pub struct WebSocketExposure;

impl WebSocketExposure {
    /// Path the upgrade endpoint is mounted on
    pub fn endpoint(host: &SyncHost) -> String {
        format!("{}_s/", host.config.base_url)
    }

    /// Build the WebSocket router from a host
    pub fn build_router(host: Arc<SyncHost>) -> Result<Router> {
        host.config.validate()?;

        let endpoint = Self::endpoint(&host);
        tracing::debug!(endpoint = %endpoint, "mounting sync endpoint");

        let router = Router::new()
            .route(&endpoint, get(handler::ws_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(host);

        Ok(router)
    }
}
