//! Online/offline presence, updated off the dispatcher's path.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use duel_core::{HubError, PlayerId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::hub::sink::ErrorSink;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct PresenceError(pub String);

/// Where presence is recorded. Implementations may perform I/O.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    async fn mark_online(&self, player: PlayerId) -> Result<(), PresenceError>;
    async fn mark_offline(&self, player: PlayerId) -> Result<(), PresenceError>;
}

/// Process-local presence table.
#[derive(Debug, Default)]
pub struct InMemoryPresence {
    online: DashMap<PlayerId, DateTime<Utc>>,
}

impl InMemoryPresence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_online(&self, player: PlayerId) -> bool {
        self.online.contains_key(&player)
    }

    pub fn online_since(&self, player: PlayerId) -> Option<DateTime<Utc>> {
        self.online.get(&player).map(|entry| *entry.value())
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }
}

#[async_trait]
impl PresenceStore for InMemoryPresence {
    async fn mark_online(&self, player: PlayerId) -> Result<(), PresenceError> {
        let _ = self.online.insert(player, Utc::now());
        Ok(())
    }

    async fn mark_offline(&self, player: PlayerId) -> Result<(), PresenceError> {
        let _ = self.online.remove(&player);
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresenceUpdate {
    Online(PlayerId),
    Offline(PlayerId),
}

/// Apply presence updates in arrival order until cancelled, then drain.
pub async fn run_presence_worker(
    store: Arc<dyn PresenceStore>,
    mut rx: mpsc::UnboundedReceiver<PresenceUpdate>,
    errors: ErrorSink,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            update = rx.recv() => match update {
                Some(update) => apply(store.as_ref(), update, &errors).await,
                None => return,
            },
            () = cancel.cancelled() => break,
        }
    }
    while let Ok(update) = rx.try_recv() {
        apply(store.as_ref(), update, &errors).await;
    }
}

async fn apply(store: &dyn PresenceStore, update: PresenceUpdate, errors: &ErrorSink) {
    let (player, result) = match update {
        PresenceUpdate::Online(player) => (player, store.mark_online(player).await),
        PresenceUpdate::Offline(player) => (player, store.mark_offline(player).await),
    };
    match result {
        Ok(()) => debug!(player_id = %player, ?update, "presence updated"),
        Err(e) => errors.report(HubError::Presence {
            player,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingPresence;

    #[async_trait]
    impl PresenceStore for FailingPresence {
        async fn mark_online(&self, _player: PlayerId) -> Result<(), PresenceError> {
            Err(PresenceError("store unavailable".into()))
        }
        async fn mark_offline(&self, _player: PlayerId) -> Result<(), PresenceError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn in_memory_online_offline() {
        let p = InMemoryPresence::new();
        p.mark_online(PlayerId(1)).await.unwrap();
        assert!(p.is_online(PlayerId(1)));
        assert!(p.online_since(PlayerId(1)).is_some());
        p.mark_offline(PlayerId(1)).await.unwrap();
        assert!(!p.is_online(PlayerId(1)));
        assert_eq!(p.online_count(), 0);
    }

    #[tokio::test]
    async fn worker_applies_updates_in_order() {
        let store = Arc::new(InMemoryPresence::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let (errors, _err_rx) = ErrorSink::channel();
        tx.send(PresenceUpdate::Online(PlayerId(1))).unwrap();
        tx.send(PresenceUpdate::Online(PlayerId(2))).unwrap();
        tx.send(PresenceUpdate::Offline(PlayerId(1))).unwrap();
        drop(tx);

        run_presence_worker(store.clone(), rx, errors, CancellationToken::new()).await;
        assert!(!store.is_online(PlayerId(1)));
        assert!(store.is_online(PlayerId(2)));
    }

    #[tokio::test]
    async fn failures_go_to_the_error_sink() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (errors, mut err_rx) = ErrorSink::channel();
        tx.send(PresenceUpdate::Online(PlayerId(4))).unwrap();
        drop(tx);

        run_presence_worker(Arc::new(FailingPresence), rx, errors, CancellationToken::new()).await;
        assert!(matches!(
            err_rx.recv().await,
            Some(HubError::Presence { player: PlayerId(4), .. })
        ));
    }
}
