//! Write loop
//!
//! Owns the write half of the transport. Waits on three things at once: data
//! on the outbound queue, the quit signal and the ping ticker. Whatever is
//! already queued when it wakes up goes out in the same frame, joined by `\n`.

use super::handle::Outbox;
use super::transport::Frame;
use crate::config::Timings;
use futures::{Sink, SinkExt};
use std::fmt::Display;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};

/// Why the write loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterExit {
    /// The queue was closed; a close frame was sent
    Quit,
    /// Writing a data frame failed or timed out
    WriteFailed(String),
    /// Writing a ping failed or timed out
    PingFailed(String),
}

/// Run the write loop until quit or the first write error
///
/// The sink is closed exactly once, on the way out.
pub async fn run_writer<K>(
    client_id: String,
    mut outbox: Outbox,
    mut sink: K,
    timings: Timings,
) -> WriterExit
where
    K: Sink<Frame> + Unpin,
    K::Error: Display,
{
    let period = timings.ping_period();
    let start = Instant::now().checked_add(period).unwrap_or_else(Instant::now);
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let write_wait = timings.write_wait();

    let exit = loop {
        tokio::select! {
            biased;

            data = outbox.rx.recv() => {
                let Some(first) = data else {
                    // Every sender is gone
                    break send_close(&mut sink, write_wait).await;
                };
                let frame = coalesce(first, &mut outbox);
                if let Err(e) = write(&mut sink, Frame::Text(frame), write_wait).await {
                    break WriterExit::WriteFailed(e);
                }
            }

            _ = wait_quit(&mut outbox.quit) => {
                // No send succeeds past this point; flush what got in before it
                outbox.rx.close();
                if let Ok(first) = outbox.rx.try_recv() {
                    let frame = coalesce(first, &mut outbox);
                    if let Err(e) = write(&mut sink, Frame::Text(frame), write_wait).await {
                        break WriterExit::WriteFailed(e);
                    }
                }
                break send_close(&mut sink, write_wait).await;
            }

            _ = ticker.tick() => {
                if let Err(e) = write(&mut sink, Frame::Ping(Vec::new()), write_wait).await {
                    break WriterExit::PingFailed(e);
                }
            }
        }
    };

    if timeout(write_wait, sink.close()).await.is_err() {
        tracing::debug!(client_id = %client_id, "transport close timed out");
    }

    match &exit {
        WriterExit::Quit => tracing::debug!(client_id = %client_id, "write loop stopped"),
        WriterExit::WriteFailed(e) | WriterExit::PingFailed(e) => {
            tracing::debug!(client_id = %client_id, error = %e, "write loop failed")
        }
    }
    exit
}

/// Resolve once quit is signalled, without holding the watch guard
async fn wait_quit(quit: &mut watch::Receiver<bool>) {
    // A dropped sender means the handle is gone; treat it as quit
    let _ = quit.wait_for(|quit| *quit).await;
}

/// Append every message queued right now to `first`
fn coalesce(first: Vec<u8>, outbox: &mut Outbox) -> Vec<u8> {
    let mut frame = first;
    for _ in 0..outbox.rx.len() {
        match outbox.rx.try_recv() {
            Ok(next) => {
                frame.push(b'\n');
                frame.extend_from_slice(&next);
            }
            Err(_) => break,
        }
    }
    frame
}

async fn write<K>(sink: &mut K, frame: Frame, write_wait: std::time::Duration) -> Result<(), String>
where
    K: Sink<Frame> + Unpin,
    K::Error: Display,
{
    match timeout(write_wait, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("write deadline exceeded".to_string()),
    }
}

async fn send_close<K>(sink: &mut K, write_wait: std::time::Duration) -> WriterExit
where
    K: Sink<Frame> + Unpin,
    K::Error: Display,
{
    // Best effort: the transport is closed right after either way
    let _ = write(sink, Frame::Close(None), write_wait).await;
    WriterExit::Quit
}
