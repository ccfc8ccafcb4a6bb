//! Transport exposures
//!
//! Each exposure consumes a [`SyncHost`](crate::server::host::SyncHost) and
//! produces an axum Router speaking one transport.

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "websocket")]
pub use websocket::WebSocketExposure;
