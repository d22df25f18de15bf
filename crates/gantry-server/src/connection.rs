//! One framed TCP connection: a reader task, a writer task and the queues
//! between them and the owning session.
//!
//! ```text
//!   socket ─► reader ─► inbound queue ─► dispatch loop (service)
//!                  └──► error channel ─┘
//!   send_packet ─► outbound queue ─► writer ─► socket
//!                                      ▲
//!                              heartbeat interval
//! ```
//!
//! Both tasks observe the same cancellation token; `close()` cancels it.

use std::time::Duration;

use bytes::Bytes;
use gantry_core::wire::{self, Kind, Packet, PacketId, MAX_FRAME_BYTES};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::framing::{self, FrameError};

/// Depth of the error channel. Errors past this are only logged.
const ERROR_QUEUE: usize = 16;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Conditions surfaced by a connection's I/O tasks.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection closed by peer")]
    Closed,

    #[error("no frame received within {0:?}")]
    Timeout(Duration),

    #[error("frame of {size} bytes exceeds limit of {max}")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Closed from this side while the service keeps running.
    #[error("connection closed locally")]
    Aborted,

    /// The owning service is stopping.
    #[error("service shutting down")]
    Shutdown,
}

impl ConnectionError {
    /// A read timeout leaves the stream usable; everything else ends it.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ConnectionError::Timeout(_))
    }
}

impl From<FrameError> for ConnectionError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Closed => ConnectionError::Closed,
            FrameError::TooLarge { size, max } => ConnectionError::FrameTooLarge { size, max },
            FrameError::Io(e) => ConnectionError::Io(e),
        }
    }
}

/// Why an outbound packet was not queued.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SendError {
    #[error("outbound queue is full")]
    QueueFull,

    #[error("connection is closed")]
    Closed,

    #[error("packet of {size} bytes exceeds frame limit of {max}")]
    TooLarge { size: usize, max: u32 },
}

// ── Settings ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Period between heartbeats. Zero disables them.
    pub heartbeat_interval: Duration,
    /// Deadline for each inbound frame. Zero disables it.
    pub read_timeout: Duration,
    /// Capacity of the inbound and outbound queues.
    pub queue_capacity: usize,
    pub max_frame_bytes: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::ZERO,
            read_timeout: Duration::ZERO,
            queue_capacity: 1000,
            max_frame_bytes: MAX_FRAME_BYTES,
        }
    }
}

// ── Connection ────────────────────────────────────────────────────────────────

/// Receiving ends handed to whoever drives the connection.
pub struct ConnectionEvents {
    pub inbound: mpsc::Receiver<Packet>,
    pub errors: mpsc::Receiver<ConnectionError>,
}

/// Handle to a running connection. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct Connection {
    name: String,
    outbound: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
    max_frame_bytes: u32,
}

impl Connection {
    /// Split `stream` and start the reader and writer on `tracker`.
    pub fn spawn<S>(
        tracker: &TaskTracker,
        stream: S,
        name: impl Into<String>,
        settings: &ConnectionSettings,
        cancel: CancellationToken,
    ) -> (Connection, ConnectionEvents)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let name = name.into();
        let capacity = settings.queue_capacity.max(1);
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (in_tx, in_rx) = mpsc::channel(capacity);
        let (err_tx, err_rx) = mpsc::channel(ERROR_QUEUE);
        let (read_half, write_half) = tokio::io::split(stream);

        tracker.spawn(read_loop(
            read_half,
            name.clone(),
            in_tx,
            err_tx.clone(),
            settings.read_timeout,
            settings.max_frame_bytes,
            cancel.clone(),
        ));
        tracker.spawn(write_loop(
            write_half,
            name.clone(),
            out_rx,
            err_tx,
            settings.heartbeat_interval,
            cancel.clone(),
        ));

        let connection = Connection {
            name,
            outbound: out_tx,
            cancel,
            max_frame_bytes: settings.max_frame_bytes,
        };
        let events = ConnectionEvents {
            inbound: in_rx,
            errors: err_rx,
        };
        (connection, events)
    }

    /// Peer address (or whatever label the connection was created with).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Encode and queue a packet without waiting.
    pub fn send_packet(&self, packet: &Packet) -> Result<(), SendError> {
        if self.cancel.is_cancelled() {
            return Err(SendError::Closed);
        }
        if packet.size() > self.max_frame_bytes as usize {
            return Err(SendError::TooLarge {
                size: packet.size(),
                max: self.max_frame_bytes,
            });
        }
        self.outbound
            .try_send(wire::encode(packet))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => SendError::Closed,
            })
    }

    /// Reply to the packet with the given id.
    pub fn send_response(&self, id: PacketId, body: impl Into<Bytes>) -> Result<(), SendError> {
        self.send_packet(&Packet::response(id, body))
    }

    /// Stop both I/O tasks. Safe to call any number of times.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!(peer = %self.name, "closing connection");
        }
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.outbound.is_closed()
    }
}

// ── Tasks ─────────────────────────────────────────────────────────────────────

fn report(errors: &mpsc::Sender<ConnectionError>, peer: &str, err: ConnectionError) {
    if let Err(mpsc::error::TrySendError::Full(err)) = errors.try_send(err) {
        tracing::debug!(peer = %peer, error = %err, "error channel full, dropping");
    }
}

async fn read_loop<R>(
    mut reader: R,
    peer: String,
    inbound: mpsc::Sender<Packet>,
    errors: mpsc::Sender<ConnectionError>,
    timeout: Duration,
    max_frame_bytes: u32,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let next = async {
            if timeout.is_zero() {
                Ok(framing::read_frame(&mut reader, max_frame_bytes).await)
            } else {
                tokio::time::timeout(timeout, framing::read_frame(&mut reader, max_frame_bytes))
                    .await
            }
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            r = next => r,
        };

        let content = match result {
            Ok(Ok(content)) => content,
            Ok(Err(e)) => {
                report(&errors, &peer, e.into());
                break;
            }
            Err(_elapsed) => {
                // A timeout mid-frame leaves the stream misaligned; the
                // dispatch loop ends the connection on any reported error.
                report(&errors, &peer, ConnectionError::Timeout(timeout));
                continue;
            }
        };

        let packet = match wire::decode(&content) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(peer = %peer, error = %e, "dropping undecodable frame");
                continue;
            }
        };

        if packet.kind() == Kind::HEARTBEAT {
            tracing::trace!(peer = %peer, "heartbeat");
            continue;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = inbound.send(packet) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    tracing::trace!(peer = %peer, "reader exited");
}

async fn write_loop<W>(
    mut writer: W,
    peer: String,
    mut outbound: mpsc::Receiver<Bytes>,
    errors: mpsc::Sender<ConnectionError>,
    interval: Duration,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    let mut heartbeat = (!interval.is_zero()).then(|| {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            item = outbound.recv() => {
                let Some(frame) = item else { break };
                // A peer that stops reading parks the write; cancellation
                // must still get through.
                let written = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    r = framing::write_frame(&mut writer, &frame) => r,
                };
                if let Err(e) = written {
                    report(&errors, &peer, e.into());
                }
            }
            _ = tick(&mut heartbeat) => {
                let frame = wire::encode(&Packet::heartbeat());
                let written = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    r = framing::write_frame(&mut writer, &frame) => r,
                };
                if let Err(e) = written {
                    tracing::warn!(peer = %peer, error = %e, "failed to send heartbeat");
                }
            }
        }
    }

    let _ = writer.shutdown().await;
    tracing::trace!(peer = %peer, "writer exited");
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}
