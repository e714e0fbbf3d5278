//! `WebSocket` session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use duel_core::{ClientMessage, Command, ConnectionId, PlayerId, ProtocolError};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::{ClientConnection, Frame};
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::hub::bus::BusError;
use crate::hub::{Hub, HubCommand};

/// Per-connection timing and queue limits.
#[derive(Clone, Copy, Debug)]
pub struct SessionLimits {
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    pub write_timeout: Duration,
    pub send_queue: usize,
}

/// Run a `WebSocket` session for an authenticated player.
///
/// 1. Registers the connection with the hub (the hub greets or refuses it)
/// 2. Once accepted, translates inbound text frames into commands on the bus
/// 3. Forwards outbound frames, with a write deadline per frame
/// 4. Pings periodically and tears down a peer that stays silent too long
/// 5. Unregisters on exit, whatever the cause
#[instrument(skip_all, fields(conn_id = %conn_id, player_id = %player))]
pub async fn run_ws_session(
    ws: WebSocket,
    player: PlayerId,
    conn_id: ConnectionId,
    hub: Hub,
    limits: SessionLimits,
    shutdown: CancellationToken,
) {
    let (ws_tx, mut ws_rx) = ws.split();
    let (send_tx, send_rx) = mpsc::channel::<Frame>(limits.send_queue);
    let closed = shutdown.child_token();
    let connection = Arc::new(ClientConnection::new(
        conn_id.clone(),
        player,
        send_tx,
        closed.clone(),
    ));

    info!("client connected");
    hub.broadcaster().add(connection.clone());

    let outbound = tokio::spawn(forward_outbound(
        ws_tx,
        send_rx,
        limits.write_timeout,
        closed.clone(),
    ));
    let liveness = {
        let connection = connection.clone();
        let closed = closed.clone();
        tokio::spawn(async move {
            let result =
                run_heartbeat(connection.clone(), limits.ping_interval, limits.ping_timeout, closed)
                    .await;
            if result == HeartbeatResult::TimedOut {
                info!(silent_for = ?connection.last_seen().elapsed(), "liveness deadline passed");
                connection.abort();
            }
        })
    };

    let register = Command::Register {
        player,
        connection: conn_id.clone(),
        transport: connection.clone(),
    };
    if hub.bus().submit(register, &closed).await.is_ok() {
        // A refused duplicate is closed by the hub and never reads a frame.
        tokio::select! {
            () = closed.cancelled() => debug!("closed before registration completed"),
            () = connection.accepted() => {
                read_loop(&mut ws_rx, &connection, &hub, player, &closed).await;
            }
        }
    }

    // Teardown runs the same path no matter why the loop ended.
    closed.cancel();
    let unregister = Command::Unregister {
        player,
        connection: conn_id.clone(),
    };
    if let Err(e) = hub.bus().submit(unregister, &shutdown).await {
        debug!(error = %e, "unregister not submitted");
    }
    hub.broadcaster().remove(&conn_id);
    liveness.abort();
    let _ = outbound.await;
    info!(
        duration_secs = connection.age().as_secs(),
        dropped = connection.drop_count(),
        accepted = connection.is_accepted(),
        "client disconnected"
    );
}

async fn read_loop(
    ws_rx: &mut futures::stream::SplitStream<WebSocket>,
    connection: &ClientConnection,
    hub: &Hub,
    player: PlayerId,
    closed: &CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            () = closed.cancelled() => break,
            msg = ws_rx.next() => msg,
        };
        let msg = match msg {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "read error");
                break;
            }
            None => break,
        };
        connection.mark_alive();

        let command = match msg {
            Message::Text(ref t) => translate(player, t.as_str()),
            Message::Binary(ref data) => match std::str::from_utf8(data) {
                Ok(text) => translate(player, text),
                Err(_) => {
                    warn!(len = data.len(), "non-UTF8 binary frame dropped");
                    continue;
                }
            },
            Message::Pong(_) => Ok(Command::Heartbeat { player }),
            Message::Ping(_) => continue,
            Message::Close(_) => {
                debug!("client sent close frame");
                break;
            }
        };

        match command {
            Ok(command) => match hub.bus().submit(command, closed).await {
                Ok(()) => {}
                Err(BusError::Cancelled | BusError::Closed) => break,
            },
            Err(e) => warn!(error = %e, "protocol error, frame dropped"),
        }
    }
}

/// Parse one inbound text frame into the command it requests.
pub fn translate(player: PlayerId, text: &str) -> Result<HubCommand, ProtocolError> {
    ClientMessage::parse(text).map(|msg| Command::from_client(player, msg))
}

async fn forward_outbound(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Frame>,
    write_timeout: Duration,
    closed: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;
            frame = send_rx.recv() => frame,
            () = closed.cancelled() => break,
        };
        let (message, last) = match frame {
            Some(Frame::Text(text)) => (Message::Text(text.as_str().into()), false),
            Some(Frame::Ping) => (Message::Ping(Vec::new().into()), false),
            Some(Frame::Close) => (Message::Close(None), true),
            None => break,
        };
        match tokio::time::timeout(write_timeout, ws_tx.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(error = %e, "write failed");
                break;
            }
            Err(_) => {
                warn!(timeout = ?write_timeout, "write deadline exceeded");
                break;
            }
        }
        if last {
            break;
        }
    }
    closed.cancel();
    let _ = tokio::time::timeout(write_timeout, ws_tx.close()).await;
}
