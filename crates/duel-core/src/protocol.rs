//! JSON wire envelopes: `{ "type": <int>, ...fields }` in both directions.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ids::RoomId;
use crate::session::Role;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    Normal,
    Match,
    Move,
    Start,
    End,
    Join,
    Create,
    GiveUp,
    Error,
}

impl MessageType {
    pub fn code(self) -> u8 {
        match self {
            Self::Normal => 1,
            Self::Match => 2,
            Self::Move => 3,
            Self::Start => 4,
            Self::End => 5,
            Self::Join => 6,
            Self::Create => 7,
            Self::GiveUp => 8,
            Self::Error => 10,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Normal),
            2 => Some(Self::Match),
            3 => Some(Self::Move),
            4 => Some(Self::Start),
            5 => Some(Self::End),
            6 => Some(Self::Join),
            7 => Some(Self::Create),
            8 => Some(Self::GiveUp),
            10 => Some(Self::Error),
            _ => None,
        }
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = i64::deserialize(deserializer)?;
        Self::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown message type {code}")))
    }
}

/// A board coordinate. Never validated here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("unknown message type {0}")]
    UnknownType(i64),
    #[error("message type {0:?} is not accepted from clients")]
    Unexpected(MessageType),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        ProtocolError::Malformed(e.to_string())
    }
}

/// A frame received from a client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientMessage {
    Match,
    Move { from: Position, to: Position },
    /// "I won": the sender's own role is declared winner.
    End,
    /// "I lose": the opponent is declared winner.
    GiveUp,
    Join { room_id: RoomId },
    Create,
}

#[derive(Deserialize)]
struct Base {
    #[serde(rename = "type")]
    kind: i64,
}

#[derive(Deserialize)]
struct MoveBody {
    from: Position,
    to: Position,
}

#[derive(Deserialize)]
struct JoinBody {
    #[serde(rename = "roomId")]
    room_id: RoomId,
}

impl ClientMessage {
    /// Decode one inbound text frame.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let base: Base = serde_json::from_str(raw)?;
        let kind = MessageType::from_code(base.kind).ok_or(ProtocolError::UnknownType(base.kind))?;
        match kind {
            MessageType::Match => Ok(Self::Match),
            MessageType::Move => {
                let body: MoveBody = serde_json::from_str(raw)?;
                Ok(Self::Move {
                    from: body.from,
                    to: body.to,
                })
            }
            MessageType::End => Ok(Self::End),
            MessageType::GiveUp => Ok(Self::GiveUp),
            MessageType::Join => {
                let body: JoinBody = serde_json::from_str(raw)?;
                Ok(Self::Join {
                    room_id: body.room_id,
                })
            }
            MessageType::Create => Ok(Self::Create),
            other => Err(ProtocolError::Unexpected(other)),
        }
    }
}

/// A frame sent to a client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WireMessage", try_from = "WireMessage")]
pub enum ServerMessage {
    Notice(String),
    Move { from: Position, to: Position },
    Start { role: Role },
    End { winner: Role },
    Joined { room_id: RoomId },
    Created { room_id: RoomId },
    Error(String),
}

impl ServerMessage {
    pub fn notice(text: impl Into<String>) -> Self {
        Self::Notice(text.into())
    }

    pub fn kind(&self) -> MessageType {
        match self {
            Self::Notice(_) => MessageType::Normal,
            Self::Move { .. } => MessageType::Move,
            Self::Start { .. } => MessageType::Start,
            Self::End { .. } => MessageType::End,
            Self::Joined { .. } => MessageType::Join,
            Self::Created { .. } => MessageType::Create,
            Self::Error(_) => MessageType::Error,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Flat on-the-wire shape shared by every outbound variant.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct WireMessage {
    #[serde(rename = "type")]
    kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    to: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    winner: Option<Role>,
    #[serde(rename = "roomId", default, skip_serializing_if = "Option::is_none")]
    room_id: Option<RoomId>,
}

impl WireMessage {
    fn bare(kind: MessageType) -> Self {
        Self {
            kind,
            message: None,
            from: None,
            to: None,
            role: None,
            winner: None,
            room_id: None,
        }
    }
}

impl From<ServerMessage> for WireMessage {
    fn from(msg: ServerMessage) -> Self {
        let mut wire = WireMessage::bare(msg.kind());
        match msg {
            ServerMessage::Notice(text) | ServerMessage::Error(text) => wire.message = Some(text),
            ServerMessage::Move { from, to } => {
                wire.from = Some(from);
                wire.to = Some(to);
            }
            ServerMessage::Start { role } => wire.role = Some(role.as_str().to_string()),
            ServerMessage::End { winner } => wire.winner = Some(winner),
            ServerMessage::Joined { room_id } | ServerMessage::Created { room_id } => {
                wire.room_id = Some(room_id);
            }
        }
        wire
    }
}

impl TryFrom<WireMessage> for ServerMessage {
    type Error = String;

    fn try_from(wire: WireMessage) -> Result<Self, String> {
        let missing = |field: &str| format!("{:?} message without `{field}`", wire.kind);
        match wire.kind {
            MessageType::Normal => Ok(Self::Notice(wire.message.clone().unwrap_or_default())),
            MessageType::Error => Ok(Self::Error(wire.message.clone().unwrap_or_default())),
            MessageType::Move => match (wire.from, wire.to) {
                (Some(from), Some(to)) => Ok(Self::Move { from, to }),
                _ => Err(missing("from/to")),
            },
            MessageType::Start => {
                let role = wire.role.as_deref().ok_or_else(|| missing("role"))?;
                Role::parse(role)
                    .map(|role| Self::Start { role })
                    .ok_or_else(|| format!("unknown role {role:?}"))
            }
            MessageType::End => Ok(Self::End {
                winner: wire.winner.ok_or_else(|| missing("winner"))?,
            }),
            MessageType::Join => Ok(Self::Joined {
                room_id: wire.room_id.ok_or_else(|| missing("roomId"))?,
            }),
            MessageType::Create => Ok(Self::Created {
                room_id: wire.room_id.ok_or_else(|| missing("roomId"))?,
            }),
            other => Err(format!("{other:?} is not an outbound message type")),
        }
    }
}
