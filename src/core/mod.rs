//! Core module containing the fundamental types of the synchronization engine

pub mod auth;
pub mod error;
pub mod headers;
pub mod protocol;
pub mod session;

pub use auth::{AuthProvider, NoAuthProvider, refresh_session_token};
pub use error::{ProtocolError, Result, SyncError};
pub use headers::merge_headers;
pub use protocol::{Message, MessageKind, resolve_address};
pub use session::{OAuthToken, Session};
