use crate::ids::{PlayerId, RoomId};

/// Seating failures inside a single room.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("room is full")]
    Full,
}

/// Faults the hub reports to its error sink. None of these are fatal.
#[derive(Clone, Debug, thiserror::Error)]
pub enum HubError {
    #[error("internal fault while handling {command}: {detail}")]
    Internal { command: &'static str, detail: String },

    #[error("delivery to player {player} failed: {reason}")]
    Delivery { player: PlayerId, reason: String },

    #[error("no registered session for player {0}")]
    UnknownTarget(PlayerId),

    #[error("room {0} vanished while still referenced")]
    DanglingRoom(RoomId),

    #[error("presence update for player {player} failed: {reason}")]
    Presence { player: PlayerId, reason: String },
}

impl HubError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Internal { .. } => "internal",
            Self::Delivery { .. } => "delivery",
            Self::UnknownTarget(_) => "unknown_target",
            Self::DanglingRoom(_) => "dangling_room",
            Self::Presence { .. } => "presence",
        }
    }

    /// Internal faults are bugs; everything else is an expected runtime condition.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. } | Self::DanglingRoom(_))
    }
}
