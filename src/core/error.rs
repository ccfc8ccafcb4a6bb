//! Typed error handling for the synchronization engine
//!
//! Errors are grouped the way the engine treats them:
//!
//! - [`SyncError::Transport`]: fatal to one connection, triggers teardown
//! - [`SyncError::Protocol`]: a malformed or unknown frame, dropped silently
//! - [`SyncError::Auth`]: token refresh failure, retried on the next frame
//! - [`SyncError::SessionExpired`]: answered with a logout directive
//! - [`SyncError::Serialization`]: a forward body could not be composed
//!
//! None of these are ever written to the client as an error payload. The only
//! client-visible outcomes are the logout and not-found frames, which are
//! regular protocol messages.
//!
//! # Example
//!
//! ```rust,ignore
//! match Message::parse(raw) {
//!     Ok(msg) => dispatch(msg).await,
//!     Err(e) => tracing::debug!(code = e.error_code(), error = %e, "dropping frame"),
//! }
//! ```

use thiserror::Error;

/// Result alias used across the crate
pub type Result<T, E = SyncError> = std::result::Result<T, E>;

/// The main error type for the synchronization engine
#[derive(Debug, Error)]
pub enum SyncError {
    /// The duplex transport failed or was closed
    #[error("transport error: {0}")]
    Transport(String),

    /// An inbound frame could not be understood
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The auth provider could not validate or refresh a token
    #[error("auth error: {0}")]
    Auth(String),

    /// The session has been idle longer than the inactivity timeout
    #[error("session expired")]
    SessionExpired,

    /// A JSON body could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No application is bound to the requested route
    #[error("no application bound to route {route}")]
    AppUnavailable { route: String },

    /// An application rejected or failed to accept a forwarded body
    #[error("forward to application failed: {0}")]
    Forward(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Stable code for structured log fields
    pub fn error_code(&self) -> &'static str {
        match self {
            SyncError::Transport(_) => "TRANSPORT_ERROR",
            SyncError::Protocol(e) => e.error_code(),
            SyncError::Auth(_) => "AUTH_ERROR",
            SyncError::SessionExpired => "SESSION_EXPIRED",
            SyncError::Serialization(_) => "SERIALIZATION_ERROR",
            SyncError::AppUnavailable { .. } => "APP_UNAVAILABLE",
            SyncError::Forward(_) => "FORWARD_FAILED",
            SyncError::Config(_) => "CONFIG_ERROR",
        }
    }
}

/// Errors raised while decoding an inbound frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The frame carried no bytes
    #[error("empty frame")]
    EmptyFrame,

    /// The discriminator is not one of `*`, `@` or `+`
    #[error("unknown message kind {0:?}")]
    UnknownKind(String),

    /// The frame has a discriminator but no address
    #[error("message has no address")]
    MissingAddress,

    /// The frame exceeds the configured read limit
    #[error("frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },
}

impl ProtocolError {
    /// Stable code for structured log fields
    pub fn error_code(&self) -> &'static str {
        match self {
            ProtocolError::EmptyFrame => "EMPTY_FRAME",
            ProtocolError::UnknownKind(_) => "UNKNOWN_KIND",
            ProtocolError::MissingAddress => "MISSING_ADDRESS",
            ProtocolError::FrameTooLarge { .. } => "FRAME_TOO_LARGE",
        }
    }
}
