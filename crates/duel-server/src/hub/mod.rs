//! The hub runtime: command bus, dispatcher, broadcaster and error sink
//! wired around one [`HubState`].

pub mod broadcast;
pub mod bus;
pub mod dispatcher;
pub mod sink;

use std::sync::Arc;

use duel_core::{Command, HubState, HubStats, RoomInfo};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::presence::{self, PresenceStore};
use crate::websocket::connection::ClientConnection;

use self::broadcast::Broadcaster;
use self::bus::CommandBus;
use self::dispatcher::Dispatcher;
use self::sink::ErrorSink;

/// Transport handle carried inside sessions and effects.
pub type Transport = Arc<ClientConnection>;
pub type HubCommand = Command<Transport>;
pub(crate) type SharedState = Arc<Mutex<HubState<Transport>>>;

/// Handle to a running hub. Cheap to clone.
#[derive(Clone)]
pub struct Hub {
    state: SharedState,
    bus: CommandBus,
    broadcaster: Arc<Broadcaster>,
    errors: ErrorSink,
}

impl Hub {
    /// Spawn the dispatcher, presence worker and error drain. All three stop
    /// when `shutdown` is cancelled; their handles are returned for joining.
    pub fn start(
        command_queue: usize,
        presence_store: Arc<dyn PresenceStore>,
        shutdown: &CancellationToken,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let state: SharedState = Arc::new(Mutex::new(HubState::new()));
        let broadcaster = Arc::new(Broadcaster::new());
        let (bus, commands) = CommandBus::channel(command_queue);
        let (errors, error_rx) = ErrorSink::channel();
        let (presence_tx, presence_rx) = mpsc::unbounded_channel();

        let dispatcher = Dispatcher::new(
            state.clone(),
            broadcaster.clone(),
            presence_tx,
            errors.clone(),
        );

        let handles = vec![
            tokio::spawn(dispatcher.run(commands, shutdown.clone())),
            tokio::spawn(presence::run_presence_worker(
                presence_store,
                presence_rx,
                errors.clone(),
                shutdown.clone(),
            )),
            tokio::spawn(sink::run_error_drain(error_rx, shutdown.clone())),
        ];

        let hub = Self {
            state,
            bus,
            broadcaster,
            errors,
        };
        (hub, handles)
    }

    pub fn bus(&self) -> &CommandBus {
        &self.bus
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    pub fn errors(&self) -> &ErrorSink {
        &self.errors
    }

    /// Joinable rooms, copied out under the hub lock.
    pub fn spare_rooms(&self) -> Vec<RoomInfo> {
        self.state.lock().spare_rooms()
    }

    pub fn stats(&self) -> HubStats {
        self.state.lock().stats()
    }
}
