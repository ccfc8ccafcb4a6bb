//! Outbound queue and connection handle
//!
//! A [`ClientHandle`] is the only way anything outside the engine talks to a
//! connection. The broker keeps clones of it in its subscriber sets and pushes
//! bytes through [`ClientHandle::send`], which never waits: when the bounded
//! queue is full the message is dropped and the caller gets `false`.
//!
//! ```text
//! Broker / App ──send()──▶ [ bounded mpsc ] ──▶ write loop ──▶ transport
//!                              ▲
//!                quit() ───────┘ (drain, close frame, close transport)
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};

/// Lifecycle of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnState {
    /// Transport accepted, nothing read yet
    Connected = 0,
    /// At least one inbound frame was read
    Active = 1,
    /// Teardown started (unsubscribe and close in progress)
    Closing = 2,
    /// Terminal: unsubscribed from the broker and transport closed
    Closed = 3,
}

impl ConnState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnState::Connected,
            1 => ConnState::Active,
            2 => ConnState::Closing,
            _ => ConnState::Closed,
        }
    }
}

struct Shared {
    state: AtomicU8,
    dropped: AtomicU64,
    quit: watch::Sender<bool>,
}

/// Cheap, cloneable reference to one connection engine
#[derive(Clone)]
pub struct ClientHandle {
    id: Arc<str>,
    tx: mpsc::Sender<Vec<u8>>,
    shared: Arc<Shared>,
}

/// Receiving side of the outbound queue, owned by the write loop
pub struct Outbox {
    pub(crate) rx: mpsc::Receiver<Vec<u8>>,
    pub(crate) quit: watch::Receiver<bool>,
}

impl ClientHandle {
    /// Create a handle and its outbox with a queue of `capacity` messages
    pub fn new(id: impl Into<Arc<str>>, capacity: usize) -> (Self, Outbox) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (quit_tx, quit_rx) = watch::channel(false);

        let handle = Self {
            id: id.into(),
            tx,
            shared: Arc::new(Shared {
                state: AtomicU8::new(ConnState::Connected as u8),
                dropped: AtomicU64::new(0),
                quit: quit_tx,
            }),
        };

        (handle, Outbox { rx, quit: quit_rx })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Enqueue bytes for the client without blocking
    ///
    /// Returns `false` if the queue is full or the connection is shutting
    /// down. Dropped messages are gone for good.
    pub fn send(&self, data: Vec<u8>) -> bool {
        if self.is_quit() {
            return false;
        }
        match self.tx.try_send(data) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let total = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!(
                    client_id = %self.id,
                    dropped_total = total,
                    "outbound queue full, message dropped"
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Close the outbound queue
    ///
    /// The write loop flushes what is already queued, sends a close frame and
    /// closes the transport. Calling this more than once has no further effect.
    pub fn quit(&self) {
        self.shared.quit.send_replace(true);
    }

    pub fn is_quit(&self) -> bool {
        *self.shared.quit.borrow()
    }

    /// Number of messages dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> ConnState {
        ConnState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Connected → Active; no-op in any other state
    pub(crate) fn mark_active(&self) {
        let _ = self.shared.state.compare_exchange(
            ConnState::Connected as u8,
            ConnState::Active as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Move to Closing; returns `false` if teardown already started
    pub(crate) fn begin_close(&self) -> bool {
        let mut current = self.shared.state.load(Ordering::Acquire);
        loop {
            if current >= ConnState::Closing as u8 {
                return false;
            }
            match self.shared.state.compare_exchange(
                current,
                ConnState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    pub(crate) fn mark_closed(&self) {
        self.shared
            .state
            .store(ConnState::Closed as u8, Ordering::Release);
    }

    /// True if both handles point at the same connection
    pub fn same_client(&self, other: &ClientHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("queued", &(self.tx.max_capacity() - self.tx.capacity()))
            .field("dropped", &self.dropped())
            .finish()
    }
}
