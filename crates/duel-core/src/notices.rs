//! User-facing notice texts. Clients may match on these, so keep them stable.

pub const CONNECTED: &str = "connected";
pub const ALREADY_CONNECTED: &str = "already connected elsewhere";
pub const WAITING: &str = "waiting for an opponent";
pub const ALREADY_MATCHING: &str = "already matching";
pub const ALREADY_PLAYING: &str = "already playing";
pub const ALREADY_IN_ROOM: &str = "already in a room";
pub const ALREADY_IN_GAME: &str = "already in game";
pub const ROOM_NOT_FOUND: &str = "room not found";
pub const GAME_NOT_STARTED: &str = "game not started";
pub const WAIT_FOR_OPPONENT: &str = "wait for opponent";
pub const PLEASE_MATCH: &str = "please match";
pub const ROOM_NOT_FULL: &str = "room not full";
pub const PEER_DISCONNECTED: &str = "peer disconnected";
pub const INTERNAL_ERROR: &str = "internal error";
