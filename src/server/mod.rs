//! Server module: host, builder and transport exposures
//!
//! - [`SyncHost`]: transport-agnostic state shared by every connection
//! - [`ServerBuilder`]: fluent setup and `serve()` with graceful shutdown
//! - [`exposure`]: transports (WebSocket behind the `websocket` feature)

pub mod builder;
pub mod host;

#[cfg(feature = "websocket")]
pub mod exposure;

pub use builder::ServerBuilder;
pub use host::{AnonymousSessions, SessionProvider, SyncHost};

#[cfg(feature = "websocket")]
pub use exposure::WebSocketExposure;
