//! `WebSocket` client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use duel_core::{ConnectionId, PlayerId};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// One item on a connection's outbound queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Text(Arc<String>),
    Ping,
    /// Flush what is queued ahead of it, then close.
    Close,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("outbound queue full")]
    Full,
    #[error("connection closed")]
    Closed,
}

/// A connected, authenticated `WebSocket` client.
#[derive(Debug)]
pub struct ClientConnection {
    pub id: ConnectionId,
    pub player: PlayerId,
    tx: mpsc::Sender<Frame>,
    pub connected_at: Instant,
    /// When the last frame of any kind arrived.
    last_seen: Mutex<Instant>,
    dropped_messages: AtomicU64,
    closed: CancellationToken,
    /// Set once the hub has registered this connection as the player's session.
    accepted: watch::Sender<bool>,
}

impl ClientConnection {
    /// `closed` is cancelled when the connection must stop; pass a child of
    /// the server's shutdown token.
    pub fn new(
        id: ConnectionId,
        player: PlayerId,
        tx: mpsc::Sender<Frame>,
        closed: CancellationToken,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            player,
            tx,
            connected_at: now,
            last_seen: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            closed,
            accepted: watch::Sender::new(false),
        }
    }

    /// Queue a frame without waiting. A full queue counts as a dropped message.
    pub fn send(&self, frame: Frame) -> Result<(), SendError> {
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                Err(SendError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::Closed),
        }
    }

    pub fn send_text(&self, text: String) -> Result<(), SendError> {
        self.send(Frame::Text(Arc::new(text)))
    }

    /// Ask the writer to close after flushing. Falls back to an immediate
    /// stop when the close frame cannot be queued.
    pub fn close(&self) {
        if self.send(Frame::Close).is_err() {
            self.closed.cancel();
        }
    }

    /// Stop the connection now, dropping anything still queued.
    pub fn abort(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn accept(&self) {
        let _ = self.accepted.send_replace(true);
    }

    pub fn is_accepted(&self) -> bool {
        *self.accepted.borrow()
    }

    /// Resolve once [`accept`](Self::accept) has been called.
    pub async fn accepted(&self) {
        let mut rx = self.accepted.subscribe();
        let _ = rx.wait_for(|accepted| *accepted).await;
    }

    /// Record inbound activity, pushing the read deadline out.
    pub fn mark_alive(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    pub fn last_seen(&self) -> Instant {
        *self.last_seen.lock()
    }

    /// The instant after which, absent new activity, the peer is presumed dead.
    pub fn deadline(&self, timeout: Duration) -> Instant {
        self.last_seen() + timeout
    }

    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
