//! Outbound delivery to individual sessions.

use std::sync::Arc;

use dashmap::DashMap;
use duel_core::{ConnectionId, HubError, PlayerId, ServerMessage};
use tracing::{debug, warn};

use crate::websocket::connection::ClientConnection;

/// Serializes server messages onto connection queues and tracks open sockets.
#[derive(Debug, Default)]
pub struct Broadcaster {
    connections: DashMap<ConnectionId, Arc<ClientConnection>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, connection: Arc<ClientConnection>) {
        let _ = self.connections.insert(connection.id.clone(), connection);
    }

    pub fn remove(&self, id: &ConnectionId) {
        let _ = self.connections.remove(id);
    }

    /// Write one message to one connection. Failures are returned, never retried.
    pub fn deliver(
        &self,
        connection: &ClientConnection,
        player: PlayerId,
        message: &ServerMessage,
    ) -> Result<(), HubError> {
        let json = message.to_json().map_err(|e| HubError::Delivery {
            player,
            reason: e.to_string(),
        })?;
        connection.send_text(json).map_err(|e| {
            warn!(player_id = %player, conn_id = %connection.id, error = %e, "delivery failed");
            HubError::Delivery {
                player,
                reason: e.to_string(),
            }
        })?;
        debug!(player_id = %player, kind = ?message.kind(), "delivered");
        Ok(())
    }

    pub fn close(&self, connection: &ClientConnection) {
        debug!(conn_id = %connection.id, "closing connection");
        connection.close();
    }

    /// Abort every tracked connection.
    pub fn close_all(&self) {
        for entry in &self.connections {
            entry.value().abort();
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::Frame;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn make_connection(capacity: usize) -> (Arc<ClientConnection>, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = ClientConnection::new(ConnectionId::new(), PlayerId(1), tx, CancellationToken::new());
        (Arc::new(conn), rx)
    }

    #[tokio::test]
    async fn deliver_writes_wire_json() {
        let b = Broadcaster::new();
        let (conn, mut rx) = make_connection(4);
        b.deliver(&conn, PlayerId(1), &ServerMessage::notice("hi")).unwrap();
        let Some(Frame::Text(text)) = rx.recv().await else {
            panic!("expected text frame");
        };
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["type"], 1);
    }

    #[tokio::test]
    async fn deliver_to_full_queue_is_reported() {
        let b = Broadcaster::new();
        let (conn, _rx) = make_connection(1);
        b.deliver(&conn, PlayerId(1), &ServerMessage::notice("a")).unwrap();
        let err = b.deliver(&conn, PlayerId(1), &ServerMessage::notice("b")).unwrap_err();
        assert!(matches!(err, HubError::Delivery { player: PlayerId(1), .. }));
    }

    #[tokio::test]
    async fn tracks_connections_and_closes_all() {
        let b = Broadcaster::new();
        let (c1, _rx1) = make_connection(1);
        let (c2, _rx2) = make_connection(1);
        b.add(c1.clone());
        b.add(c2.clone());
        assert_eq!(b.connection_count(), 2);

        b.close_all();
        assert!(c1.is_closed() && c2.is_closed());

        b.remove(&c1.id);
        assert_eq!(b.connection_count(), 1);
    }
}
