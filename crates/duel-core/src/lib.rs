//! Game-agnostic core of the duel hub: sessions, rooms, the match queue and
//! the state machine that ties them together. Nothing in here performs I/O.

pub mod command;
pub mod errors;
pub mod ids;
pub mod matchqueue;
pub mod notices;
pub mod protocol;
pub mod room;
pub mod session;
pub mod state;

pub use command::{Command, Verdict};
pub use errors::{HubError, RoomError};
pub use ids::{ConnectionId, PlayerId, RoomId};
pub use protocol::{ClientMessage, MessageType, Position, ProtocolError, ServerMessage};
pub use session::{Role, Session, SessionStatus};
pub use state::{Effect, HubState, HubStats, Outcome, RoomInfo, SeatInfo};
