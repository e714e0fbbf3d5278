//! Per-connection liveness: a ping timer plus a read deadline.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::connection::{ClientConnection, Frame};

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// Nothing arrived from the client within the timeout window.
    TimedOut,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Run liveness monitoring for one connection.
///
/// A `Ping` frame is queued every `interval`. Independently, the loop sleeps
/// until the connection's read deadline (`last_seen + timeout`); any inbound
/// frame moves that deadline out via [`ClientConnection::mark_alive`]. Reaching
/// the deadline returns [`HeartbeatResult::TimedOut`].
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ping = time::interval_at(Instant::now() + interval, interval);
    ping.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        let deadline = connection.deadline(timeout);
        tokio::select! {
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
            () = time::sleep_until(deadline) => {
                if connection.deadline(timeout) <= Instant::now() {
                    return HeartbeatResult::TimedOut;
                }
            }
            _ = ping.tick() => {
                if let Err(e) = connection.send(Frame::Ping) {
                    debug!(conn_id = %connection.id, error = %e, "ping not queued");
                }
            }
        }
    }
}
