//! The command bus: the only way into hub state.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::HubCommand;

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("command bus is closed")]
    Closed,
    #[error("submission cancelled")]
    Cancelled,
}

/// Cloneable producer half of the bounded command channel.
#[derive(Clone, Debug)]
pub struct CommandBus {
    tx: mpsc::Sender<HubCommand>,
}

impl CommandBus {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<HubCommand>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Enqueue a command, waiting for room on the bus. Gives up as soon as
    /// `cancel` fires so a torn-down producer never hangs here.
    pub async fn submit(&self, command: HubCommand, cancel: &CancellationToken) -> Result<(), BusError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(BusError::Cancelled),
            sent = self.tx.send(command) => sent.map_err(|_| BusError::Closed),
        }
    }

    /// Free slots right now.
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duel_core::{Command, PlayerId};

    fn heartbeat(id: i64) -> HubCommand {
        Command::Heartbeat { player: PlayerId(id) }
    }

    #[tokio::test]
    async fn submit_preserves_order() {
        let (bus, mut rx) = CommandBus::channel(4);
        let cancel = CancellationToken::new();
        for id in 1..=3 {
            bus.submit(heartbeat(id), &cancel).await.unwrap();
        }
        for id in 1..=3 {
            assert_eq!(rx.recv().await.unwrap().player(), PlayerId(id));
        }
    }

    #[tokio::test]
    async fn submit_to_closed_bus() {
        let (bus, rx) = CommandBus::channel(1);
        drop(rx);
        assert!(bus.is_closed());
        let err = bus.submit(heartbeat(1), &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err, BusError::Closed);
    }

    #[tokio::test]
    async fn full_bus_submission_aborts_on_cancel() {
        let (bus, _rx) = CommandBus::channel(1);
        let cancel = CancellationToken::new();
        bus.submit(heartbeat(1), &cancel).await.unwrap();
        assert_eq!(bus.capacity(), 0);

        let blocked = {
            let bus = bus.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { bus.submit(heartbeat(2), &cancel).await })
        };
        tokio::task::yield_now().await;
        cancel.cancel();
        assert_eq!(blocked.await.unwrap(), Err(BusError::Cancelled));
    }

    #[tokio::test]
    async fn cancelled_token_wins_even_with_space() {
        let (bus, mut rx) = CommandBus::channel(4);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(bus.submit(heartbeat(1), &cancel).await, Err(BusError::Cancelled));
        assert!(rx.try_recv().is_err());
    }
}
