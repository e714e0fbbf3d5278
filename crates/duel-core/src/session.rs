use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ids::{ConnectionId, PlayerId, RoomId};

/// What a session is currently allowed to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Online,
    Matching,
    Playing,
}

/// Side assigned when a room fills. `Red` always moves first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Role {
    #[default]
    None,
    Red,
    Black,
}

impl Role {
    pub fn code(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Red => 1,
            Self::Black => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Red),
            2 => Some(Self::Black),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Red => "red",
            Self::Black => "black",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "red" => Some(Self::Red),
            "black" => Some(Self::Black),
            _ => None,
        }
    }

    /// The other side. `None` has no opponent.
    pub fn opponent(self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Red => Self::Black,
            Self::Black => Self::Red,
        }
    }
}

// Roles travel as their numeric code (the `winner` field of an end notice).
impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Self::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown role code {code}")))
    }
}

/// One live connection, as seen by the hub.
///
/// `T` is the outbound transport handle. The hub never inspects it; it only
/// hands it back inside effects so the runtime knows where to write.
#[derive(Clone, Debug)]
pub struct Session<T> {
    pub id: PlayerId,
    pub connection: ConnectionId,
    pub transport: T,
    pub status: SessionStatus,
    pub role: Role,
    pub room: Option<RoomId>,
    pub last_heartbeat: DateTime<Utc>,
}

impl<T> Session<T> {
    pub fn new(id: PlayerId, connection: ConnectionId, transport: T) -> Self {
        Self {
            id,
            connection,
            transport,
            status: SessionStatus::Online,
            role: Role::None,
            room: None,
            last_heartbeat: Utc::now(),
        }
    }

    pub fn start_play(&mut self, role: Role) {
        self.role = role;
        self.status = SessionStatus::Playing;
    }

    /// Back to the lobby: no room, no role.
    pub fn reset(&mut self) {
        self.room = None;
        self.role = Role::None;
        self.status = SessionStatus::Online;
    }

    pub fn touch(&mut self) {
        self.last_heartbeat = Utc::now();
    }

    pub fn is_playing(&self) -> bool {
        self.status == SessionStatus::Playing
    }
}
