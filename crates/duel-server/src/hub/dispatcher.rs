//! The single consumer of the command bus.
//!
//! Each bus command, plus any follow-ups it produces, is applied to
//! [`HubState`](duel_core::HubState) under one lock acquisition. Effects are
//! performed only after the lock is released.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use duel_core::{Effect, HubError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::broadcast::Broadcaster;
use super::sink::ErrorSink;
use super::{HubCommand, SharedState, Transport};
use crate::presence::PresenceUpdate;

pub struct Dispatcher {
    state: SharedState,
    broadcaster: Arc<Broadcaster>,
    presence: mpsc::UnboundedSender<PresenceUpdate>,
    errors: ErrorSink,
}

impl Dispatcher {
    pub(crate) fn new(
        state: SharedState,
        broadcaster: Arc<Broadcaster>,
        presence: mpsc::UnboundedSender<PresenceUpdate>,
        errors: ErrorSink,
    ) -> Self {
        Self {
            state,
            broadcaster,
            presence,
            errors,
        }
    }

    /// Drain the bus until it closes or `cancel` fires.
    pub async fn run(self, mut commands: mpsc::Receiver<HubCommand>, cancel: CancellationToken) {
        info!("dispatcher started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.dispatch(command),
                    None => break,
                },
            }
        }
        info!("dispatcher stopped");
    }

    /// Apply one command and its follow-ups, then perform the effects.
    #[instrument(skip_all, fields(command = command.kind(), player_id = %command.player()))]
    pub fn dispatch(&self, command: HubCommand) {
        let mut pending = VecDeque::from([command]);
        let mut effects = Vec::new();
        {
            let mut state = self.state.lock();
            while let Some(command) = pending.pop_front() {
                let kind = command.kind();
                let player = command.player();
                debug!(command = kind, player_id = %player, "applying");
                match guarded(|| state.apply(command)) {
                    Ok(outcome) => {
                        effects.extend(outcome.effects);
                        pending.extend(outcome.follow_ups);
                        for fault in outcome.faults {
                            self.errors.report(fault);
                        }
                    }
                    Err(detail) => {
                        self.errors.report(HubError::Internal {
                            command: kind,
                            detail,
                        });
                        effects.extend(state.internal_error_notice(player));
                    }
                }
            }
        }
        for effect in effects {
            self.perform(effect);
        }
    }

    fn perform(&self, effect: Effect<Transport>) {
        match effect {
            Effect::Deliver {
                player,
                transport,
                message,
            } => {
                if let Err(e) = self.broadcaster.deliver(&transport, player, &message) {
                    self.errors.report(e);
                }
            }
            Effect::Close { transport, .. } => self.broadcaster.close(&transport),
            Effect::Accept { transport, .. } => transport.accept(),
            Effect::MarkOnline(player) => self.queue_presence(PresenceUpdate::Online(player)),
            Effect::MarkOffline(player) => self.queue_presence(PresenceUpdate::Offline(player)),
        }
    }

    fn queue_presence(&self, update: PresenceUpdate) {
        if self.presence.send(update).is_err() {
            debug!(?update, "presence worker gone, update dropped");
        }
    }
}

/// Run `f`, turning a panic into its message.
pub(crate) fn guarded<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
