use crate::ids::{ConnectionId, PlayerId, RoomId};
use crate::protocol::{ClientMessage, Position, ServerMessage};
use crate::session::Role;

/// How a game end was reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// No payload: the reporting side claims the win.
    Won,
    /// The reporting side gives up; its opponent wins.
    Resigned,
}

impl Verdict {
    pub fn winner(self, requester: Role) -> Role {
        match self {
            Self::Won => requester,
            Self::Resigned => requester.opponent(),
        }
    }
}

/// The only sanctioned way to mutate hub state.
///
/// `T` is the transport handle carried by `Register`; see [`crate::session::Session`].
#[derive(Clone, Debug)]
pub enum Command<T> {
    Register {
        player: PlayerId,
        connection: ConnectionId,
        transport: T,
    },
    Unregister {
        player: PlayerId,
        connection: ConnectionId,
    },
    Match {
        player: PlayerId,
    },
    Move {
        player: PlayerId,
        from: Position,
        to: Position,
    },
    SendMessage {
        target: PlayerId,
        message: ServerMessage,
    },
    Start {
        player: PlayerId,
    },
    End {
        player: PlayerId,
        verdict: Verdict,
    },
    Heartbeat {
        player: PlayerId,
    },
    Join {
        player: PlayerId,
        room: RoomId,
    },
    Create {
        player: PlayerId,
    },
}

impl<T> Command<T> {
    /// Translate a decoded client frame into the command it requests.
    pub fn from_client(player: PlayerId, message: ClientMessage) -> Self {
        match message {
            ClientMessage::Match => Self::Match { player },
            ClientMessage::Move { from, to } => Self::Move { player, from, to },
            ClientMessage::End => Self::End {
                player,
                verdict: Verdict::Won,
            },
            ClientMessage::GiveUp => Self::End {
                player,
                verdict: Verdict::Resigned,
            },
            ClientMessage::Join { room_id } => Self::Join {
                player,
                room: room_id,
            },
            ClientMessage::Create => Self::Create { player },
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Unregister { .. } => "unregister",
            Self::Match { .. } => "match",
            Self::Move { .. } => "move",
            Self::SendMessage { .. } => "send_message",
            Self::Start { .. } => "start",
            Self::End { .. } => "end",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Join { .. } => "join",
            Self::Create { .. } => "create",
        }
    }

    /// The session this command addresses.
    pub fn player(&self) -> PlayerId {
        match self {
            Self::Register { player, .. }
            | Self::Unregister { player, .. }
            | Self::Match { player }
            | Self::Move { player, .. }
            | Self::Start { player }
            | Self::End { player, .. }
            | Self::Heartbeat { player }
            | Self::Join { player, .. }
            | Self::Create { player } => *player,
            Self::SendMessage { target, .. } => *target,
        }
    }
}
