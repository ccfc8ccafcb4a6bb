//! Transport-agnostic frames
//!
//! The engine reads a `Stream<Item = Result<Frame, E>>` and writes a
//! `Sink<Frame>`. The WebSocket exposure adapts axum's socket halves to these;
//! tests plug in plain channels.

use std::error::Error;
use std::io;

/// One transport-level frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(Vec<u8>),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    /// Close with an optional status code
    Close(Option<u16>),
}

/// Normal closure
pub const CLOSE_NORMAL: u16 = 1000;
/// Peer is going away (tab closed, navigation)
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Close frame carried no status
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Connection dropped without a close frame
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Whether a close code is routine teardown rather than a fault
pub fn is_expected_close(code: Option<u16>) -> bool {
    matches!(
        code,
        None | Some(CLOSE_NORMAL | CLOSE_GOING_AWAY | CLOSE_NO_STATUS | CLOSE_ABNORMAL)
    )
}

/// Whether a read error is a peer vanishing rather than a fault
///
/// Walks the error's source chain looking for a reset, aborted or broken
/// connection, an unexpected EOF, or a socket dropped without a closing
/// handshake. An abnormal closure (1006) surfaces here, never as a close frame.
pub fn is_expected_error(err: &(dyn Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<io::Error>()
            && matches!(
                io.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            )
        {
            return true;
        }

        let message = e.to_string();
        if message.contains("without closing handshake") || message.contains("closed normally") {
            return true;
        }

        current = e.source();
    }
    false
}
