//! Wire protocol definitions
//!
//! ## Client → Server frames
//!
//! Every inbound text frame is `<kind> <addr>[ <data>]`:
//!
//! ```text
//! * /demo {"title":"x"}    patch: apply data to the page at /demo
//! @ /demo {"clicked":true} query: forward args to the app serving /demo
//! + /demo #settings        watch: subscribe to /demo, boot the app with a hash
//! + /demo                  watch: subscribe to /demo, no hash
//! ```
//!
//! The data part is opaque and may itself contain spaces.
//!
//! ## Server → Client frames
//!
//! ```json
//! {"m": {"username": "alice", "editor": false}}
//! {"e": "not_found"}
//! {"u": "/_auth/logout"}
//! {"p": {...}}
//! ```
//!
//! Several outbound frames may travel in one transport message, joined by `\n`.

use crate::core::error::ProtocolError;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Error code sent when a watched route has neither an app nor a page
pub const NOT_FOUND: &str = "not_found";

/// Path appended to the base URL for the logout directive
pub const LOGOUT_PATH: &str = "_auth/logout";

/// Kind of an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Apply a change to a page (editable connections only)
    Patch,
    /// Forward arguments to the app bound to an address
    Query,
    /// Subscribe to an address and boot its app
    Watch,
}

impl MessageKind {
    /// Parse a wire discriminator
    pub fn from_token(token: &[u8]) -> Option<Self> {
        match token {
            b"*" => Some(MessageKind::Patch),
            b"@" => Some(MessageKind::Query),
            b"+" => Some(MessageKind::Watch),
            _ => None,
        }
    }

    /// Wire discriminator for this kind
    pub fn token(self) -> &'static str {
        match self {
            MessageKind::Patch => "*",
            MessageKind::Query => "@",
            MessageKind::Watch => "+",
        }
    }
}

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// What the client asks for
    pub kind: MessageKind,
    /// Target address as sent on the wire (may be relative)
    pub addr: String,
    /// Opaque payload
    pub data: Vec<u8>,
}

impl Message {
    /// Decode a raw frame
    pub fn parse(raw: &[u8]) -> Result<Self, ProtocolError> {
        if raw.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }

        let (token, rest) = split_once_space(raw);
        let kind = MessageKind::from_token(token).ok_or_else(|| {
            ProtocolError::UnknownKind(String::from_utf8_lossy(token).into_owned())
        })?;

        let Some(rest) = rest else {
            return Err(ProtocolError::MissingAddress);
        };
        let (addr, data) = split_once_space(rest);
        if addr.is_empty() {
            return Err(ProtocolError::MissingAddress);
        }

        Ok(Self {
            kind,
            addr: String::from_utf8_lossy(addr).into_owned(),
            data: data.map(<[u8]>::to_vec).unwrap_or_default(),
        })
    }

    /// Make the address absolute against `base_url`
    pub fn resolve(mut self, base_url: &str) -> Self {
        self.addr = resolve_address(&self.addr, base_url);
        self
    }
}

fn split_once_space(bytes: &[u8]) -> (&[u8], Option<&[u8]>) {
    match bytes.iter().position(|b| *b == b' ') {
        Some(i) => (&bytes[..i], Some(&bytes[i + 1..])),
        None => (bytes, None),
    }
}

/// Resolve an address against a base URL
///
/// URLs with a scheme are returned unchanged. An empty address resolves to
/// the base itself. Relative addresses are appended to the base, then `.` and
/// `..` segments are removed the way URL reference resolution does; `..`
/// never climbs above the root.
pub fn resolve_address(addr: &str, base_url: &str) -> String {
    if addr.contains("://") {
        return addr.to_string();
    }
    if addr.is_empty() {
        return base_url.to_string();
    }
    if addr.starts_with('/') {
        return remove_dot_segments(addr);
    }
    if base_url.ends_with('/') {
        remove_dot_segments(&format!("{base_url}{addr}"))
    } else {
        remove_dot_segments(&format!("{base_url}/{addr}"))
    }
}

fn remove_dot_segments(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    let last = segments.len() - 1;
    let mut out: Vec<&str> = Vec::with_capacity(segments.len());

    for (i, segment) in segments.iter().enumerate() {
        match *segment {
            "." => {}
            ".." => {
                // Keep the leading empty segment of an absolute path
                if out.len() > 1 {
                    out.pop();
                }
            }
            other => {
                out.push(other);
                continue;
            }
        }
        // A trailing dot segment leaves a directory path behind
        if i == last {
            out.push("");
        }
    }

    out.join("/")
}

/// Session metadata pushed when a watched route has no app
#[derive(Debug, Clone, Serialize)]
pub struct Meta<'a> {
    pub username: &'a str,
    pub editor: bool,
}

/// Server → client directive
///
/// Only one field is set per frame.
#[derive(Debug, Default, Serialize)]
pub struct Directive<'a> {
    #[serde(rename = "m", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta<'a>>,
    #[serde(rename = "u", skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    #[serde(rename = "e", skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
}

impl<'a> Directive<'a> {
    /// `{"m": {"username": .., "editor": ..}}`
    pub fn meta(username: &'a str, editor: bool) -> Self {
        Self {
            meta: Some(Meta { username, editor }),
            ..Default::default()
        }
    }

    /// `{"e": "not_found"}`
    pub fn not_found() -> Self {
        Self {
            error: Some(NOT_FOUND),
            ..Default::default()
        }
    }

    /// `{"u": "<base>_auth/logout"}`
    pub fn logout(base_url: &str) -> Self {
        Self {
            redirect: Some(format!("{base_url}{LOGOUT_PATH}")),
            ..Default::default()
        }
    }

    pub fn to_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Initial arguments sent to an app when a client starts watching it
#[derive(Debug, Default, Serialize)]
pub struct Boot {
    /// Location hash
    #[serde(rename = "#", skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl Boot {
    /// Build the boot payload from a watch frame's data
    pub fn from_watch_data(data: &[u8]) -> Self {
        if data.is_empty() {
            Self::default()
        } else {
            Self {
                hash: Some(String::from_utf8_lossy(data).into_owned()),
            }
        }
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// Body forwarded to an app for queries and boots
#[derive(Debug, Serialize)]
pub struct ForwardBody {
    pub args: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

impl ForwardBody {
    pub fn new(args: Value) -> Self {
        Self {
            args,
            headers: None,
        }
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn to_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Decode an opaque payload into JSON args
///
/// Payloads that are empty or not valid JSON become an empty object.
pub fn decode_args(data: &[u8]) -> Value {
    if data.is_empty() {
        return Value::Object(Default::default());
    }
    match serde_json::from_slice(data) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "payload is not JSON, forwarding empty args");
            Value::Object(Default::default())
        }
    }
}
