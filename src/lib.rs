//! # wavesync
//!
//! Real-time synchronization engine keeping browser clients in sync with
//! server-side application state over WebSockets.
//!
//! ## Features
//!
//! - **Connection Engine**: one read loop and one write loop per socket, with
//!   pings, read deadlines and exactly-once teardown
//! - **Non-blocking fan-out**: bounded outbound queues; slow clients lose
//!   messages instead of stalling publishers
//! - **Coalescing**: queued messages leave in a single frame joined by `\n`
//! - **Broker contract**: apps, pages and subscriptions behind one trait, with
//!   an in-memory reference implementation
//! - **Sessions**: optional OAuth2 token refresh and inactivity logout
//! - **Configuration-Based**: timings and limits loaded from YAML
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wavesync::prelude::*;
//!
//! struct Greeter;
//!
//! #[async_trait]
//! impl App for Greeter {
//!     fn mode(&self) -> AppMode {
//!         AppMode::Unicast
//!     }
//!
//!     async fn forward(&self, client_id: &str, _session: &Session, body: Vec<u8>) -> SyncResult<()> {
//!         tracing::info!(client_id, body = %String::from_utf8_lossy(&body), "hello");
//!         Ok(())
//!     }
//! }
//!
//! let broker = Arc::new(InMemoryBroker::new());
//! broker.register_app("/greeter", Arc::new(Greeter)).await;
//!
//! ServerBuilder::new()
//!     .with_broker(broker)
//!     .serve("127.0.0.1:3000")
//!     .await?;
//! ```

pub mod broker;
pub mod client;
pub mod config;
pub mod core;
pub mod server;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        auth::{AuthProvider, NoAuthProvider},
        error::{ProtocolError, Result as SyncResult, SyncError},
        headers::merge_headers,
        protocol::{Message, MessageKind},
        session::{OAuthToken, Session},
    };

    // === Broker ===
    pub use crate::broker::{App, AppMode, Broker, InMemoryBroker, Page, PublishReport};

    // === Client ===
    pub use crate::client::{Client, ClientBuilder, ClientHandle, ConnState, Frame};

    // === Config ===
    pub use crate::config::{AuthConfig, SyncConfig, Timings};

    // === Server ===
    pub use crate::server::{AnonymousSessions, ServerBuilder, SessionProvider, SyncHost};
    #[cfg(feature = "websocket")]
    pub use crate::server::WebSocketExposure;

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use std::sync::Arc;

    // === Axum ===
    pub use axum::{Router, http::HeaderMap};
}
