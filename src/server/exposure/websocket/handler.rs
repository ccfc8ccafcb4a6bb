//! WebSocket upgrade handler
//!
//! Resolves the session, caches the request headers for the first app boot
//! and hands the split socket to a connection engine.

use crate::client::Frame;
use crate::core::session::Session;
use crate::server::host::SyncHost;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::http::{Extensions, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::future;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

/// WebSocket upgrade handler
///
/// Answers 403 when the session provider refuses the request.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    extensions: Extensions,
    State(host): State<Arc<SyncHost>>,
) -> Response {
    let remote_addr = remote_addr(&headers, &extensions);

    let Some(session) = host.sessions.session_for(&headers).await else {
        tracing::info!(client = %remote_addr, "refusing connection without session");
        return StatusCode::FORBIDDEN.into_response();
    };

    ws.max_message_size(host.config.timings.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, host, session, headers, remote_addr))
}

/// Run one connection to completion
async fn handle_socket(
    socket: WebSocket,
    host: Arc<SyncHost>,
    session: Arc<Session>,
    headers: HeaderMap,
    remote_addr: String,
) {
    let client_id = Uuid::new_v4().simple().to_string();
    host.broker.cache_headers(&client_id, headers.clone()).await;

    let client = host
        .client_builder(session)
        .with_id(client_id.as_str())
        .with_remote_addr(remote_addr)
        .with_headers(headers)
        .build();

    let (ws_write, ws_read) = socket.split();
    let sink = ws_write.with(|frame: Frame| future::ready(Ok::<_, axum::Error>(Message::from(frame))));
    let stream = ws_read.map(|msg| msg.map(Frame::from));

    let state = client.run(stream, sink).await;
    tracing::debug!(client_id = %client_id, state = ?state, "connection finished");
}

/// Best-effort peer address for diagnostics
///
/// Prefers the first `x-forwarded-for` hop, then the socket peer when the
/// server was started with connect info.
fn remote_addr(headers: &HeaderMap, extensions: &Extensions) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

impl From<Message> for Frame {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(text) => Frame::Text(text.as_str().as_bytes().to_vec()),
            Message::Binary(data) => Frame::Binary(data.to_vec()),
            Message::Ping(data) => Frame::Ping(data.to_vec()),
            Message::Pong(data) => Frame::Pong(data.to_vec()),
            Message::Close(close) => Frame::Close(close.map(|frame| frame.code)),
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(data) => match String::from_utf8(data) {
                Ok(text) => Message::Text(text.into()),
                Err(e) => Message::Binary(e.into_bytes().into()),
            },
            Frame::Binary(data) => Message::Binary(data.into()),
            Frame::Ping(data) => Message::Ping(data.into()),
            Frame::Pong(data) => Message::Pong(data.into()),
            Frame::Close(code) => Message::Close(code.map(|code| CloseFrame {
                code,
                reason: Utf8Bytes::from_static(""),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_remote_addr_from_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("10.0.0.7, 172.16.0.1"),
        );
        assert_eq!(remote_addr(&headers, &Extensions::new()), "10.0.0.7");
        assert_eq!(remote_addr(&HeaderMap::new(), &Extensions::new()), "unknown");
    }

    #[test]
    fn test_remote_addr_falls_back_to_socket_peer() {
        let peer: SocketAddr = "192.168.1.20:51234".parse().unwrap();
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(peer));

        assert_eq!(
            remote_addr(&HeaderMap::new(), &extensions),
            "192.168.1.20:51234"
        );

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.7"));
        assert_eq!(remote_addr(&headers, &extensions), "10.0.0.7");
    }

    #[test]
    fn test_close_code_survives_conversion() {
        let msg = Message::from(Frame::Close(Some(1001)));
        assert!(matches!(Frame::from(msg), Frame::Close(Some(1001))));

        let msg = Message::from(Frame::Close(None));
        assert!(matches!(Frame::from(msg), Frame::Close(None)));
    }

    #[test]
    fn test_text_frame_becomes_text_message() {
        let msg = Message::from(Frame::Text(b"{\"e\":\"not_found\"}".to_vec()));
        match msg {
            Message::Text(text) => assert_eq!(text.as_str(), "{\"e\":\"not_found\"}"),
            other => panic!("expected text, got {other:?}"),
        }
    }
}
