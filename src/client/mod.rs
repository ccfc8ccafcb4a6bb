//! Per-connection protocol engine
//!
//! - [`handle`]: outbound queue and lifecycle shared with the broker
//! - [`transport`]: frame type the engine reads and writes
//! - [`writer`]: the write loop (coalescing, pings, close)
//! - [`engine`]: the read loop and message dispatch

pub mod engine;
pub mod handle;
pub mod transport;
pub mod writer;

pub use engine::{Client, ClientBuilder};
pub use handle::{ClientHandle, ConnState, Outbox};
pub use transport::{Frame, is_expected_close};
pub use writer::{WriterExit, run_writer};
