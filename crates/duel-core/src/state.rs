//! The hub's shared state and the single function that mutates it.
//!
//! [`HubState::apply`] is synchronous and does no I/O. Everything observable
//! (writes to a transport, closing it, presence updates) comes back as
//! [`Effect`]s for the caller to perform after releasing whatever lock guards
//! the state.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::command::{Command, Verdict};
use crate::errors::HubError;
use crate::ids::{ConnectionId, PlayerId, RoomId, RoomIdAllocator};
use crate::matchqueue::MatchQueue;
use crate::notices;
use crate::protocol::{Position, ServerMessage};
use crate::room::Room;
use crate::session::{Role, Session, SessionStatus};

/// A side effect requested by a command.
#[derive(Clone, Debug)]
pub enum Effect<T> {
    Deliver {
        player: PlayerId,
        transport: T,
        message: ServerMessage,
    },
    Close {
        player: PlayerId,
        transport: T,
    },
    /// The connection's registration went through; its frames may now be read.
    Accept {
        player: PlayerId,
        transport: T,
    },
    MarkOnline(PlayerId),
    MarkOffline(PlayerId),
}

/// Everything one command produced.
#[derive(Debug)]
pub struct Outcome<T> {
    pub effects: Vec<Effect<T>>,
    /// Commands to run right after this one, before anything else.
    pub follow_ups: Vec<Command<T>>,
    pub faults: Vec<HubError>,
}

impl<T> Default for Outcome<T> {
    fn default() -> Self {
        Self {
            effects: Vec::new(),
            follow_ups: Vec::new(),
            faults: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeatInfo {
    pub id: PlayerId,
}

/// Snapshot of a joinable room.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RoomInfo {
    pub id: RoomId,
    pub current: Option<SeatInfo>,
    pub next: Option<SeatInfo>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub sessions: usize,
    pub rooms: usize,
    pub waiting: usize,
    pub joinable: usize,
}

/// Copy of the fields a handler needs from a room, so no borrow outlives the lookup.
#[derive(Clone, Copy)]
struct Seats {
    id: RoomId,
    current: Option<PlayerId>,
    next: Option<PlayerId>,
    full: bool,
}

pub struct HubState<T> {
    sessions: HashMap<PlayerId, Session<T>>,
    rooms: BTreeMap<RoomId, Room>,
    spare_rooms: Vec<RoomId>,
    queue: MatchQueue,
    room_ids: RoomIdAllocator,
}

impl<T> Default for HubState<T> {
    fn default() -> Self {
        Self {
            sessions: HashMap::new(),
            rooms: BTreeMap::new(),
            spare_rooms: Vec::new(),
            queue: MatchQueue::new(),
            room_ids: RoomIdAllocator::new(),
        }
    }
}

impl<T: Clone> HubState<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute one command against the state.
    pub fn apply(&mut self, command: Command<T>) -> Outcome<T> {
        let mut out = Outcome::default();
        match command {
            Command::Register {
                player,
                connection,
                transport,
            } => self.register(player, connection, transport, &mut out),
            Command::Unregister { player, connection } => {
                self.unregister(player, &connection, &mut out);
            }
            Command::Match { player } => self.enqueue(player, &mut out),
            Command::Move { player, from, to } => self.relay_move(player, from, to, &mut out),
            Command::SendMessage { target, message } => {
                if self.sessions.contains_key(&target) {
                    self.deliver(&mut out, target, message);
                } else {
                    out.faults.push(HubError::UnknownTarget(target));
                }
            }
            Command::Start { player } => self.start(player, &mut out),
            Command::End { player, verdict } => self.end(player, verdict, &mut out),
            Command::Heartbeat { player } => match self.sessions.get_mut(&player) {
                Some(session) => session.touch(),
                None => ignored(player, "heartbeat"),
            },
            Command::Join { player, room } => self.join(player, room, &mut out),
            Command::Create { player } => self.create(player, &mut out),
        }
        out
    }

    /// The generic notice sent to a session whose command faulted.
    pub fn internal_error_notice(&self, player: PlayerId) -> Option<Effect<T>> {
        self.sessions.get(&player).map(|s| Effect::Deliver {
            player,
            transport: s.transport.clone(),
            message: ServerMessage::Error(notices::INTERNAL_ERROR.into()),
        })
    }

    fn register(
        &mut self,
        player: PlayerId,
        connection: ConnectionId,
        transport: T,
        out: &mut Outcome<T>,
    ) {
        if let Some(existing) = self.sessions.get(&player) {
            warn!(
                player_id = %player,
                existing = %existing.connection,
                refused = %connection,
                "duplicate login refused"
            );
            out.effects.push(Effect::Deliver {
                player,
                transport: transport.clone(),
                message: ServerMessage::notice(notices::ALREADY_CONNECTED),
            });
            out.effects.push(Effect::Close { player, transport });
            return;
        }
        info!(player_id = %player, conn_id = %connection, "session registered");
        let _ = self
            .sessions
            .insert(player, Session::new(player, connection, transport.clone()));
        out.effects.push(Effect::MarkOnline(player));
        out.effects.push(Effect::Accept { player, transport });
        out.follow_ups.push(Command::SendMessage {
            target: player,
            message: ServerMessage::notice(notices::CONNECTED),
        });
    }

    fn unregister(&mut self, player: PlayerId, connection: &ConnectionId, out: &mut Outcome<T>) {
        let room = match self.sessions.get(&player) {
            Some(session) if &session.connection == connection => session.room,
            Some(_) => {
                debug!(player_id = %player, conn_id = %connection, "unregister for superseded connection ignored");
                return;
            }
            None => return,
        };

        if let Some(room_id) = room {
            self.dissolve(
                room_id,
                Some(player),
                Some(ServerMessage::notice(notices::PEER_DISCONNECTED)),
                out,
            );
        }
        let _ = self.queue.remove(player);

        if let Some(session) = self.sessions.remove(&player) {
            info!(player_id = %player, conn_id = %connection, "session unregistered");
            out.effects.push(Effect::Close {
                player,
                transport: session.transport,
            });
            out.effects.push(Effect::MarkOffline(player));
        }
    }

    fn enqueue(&mut self, player: PlayerId, out: &mut Outcome<T>) {
        let Some((status, in_room)) = self.status_of(player) else {
            return ignored(player, "match");
        };
        let refusal = match status {
            SessionStatus::Matching => Some(notices::ALREADY_MATCHING),
            SessionStatus::Playing => Some(notices::ALREADY_PLAYING),
            SessionStatus::Online if in_room => Some(notices::ALREADY_IN_ROOM),
            SessionStatus::Online => None,
        };
        if let Some(text) = refusal {
            return self.notice(out, player, text);
        }

        self.set_status(player, SessionStatus::Matching);
        let _ = self.queue.push(player);

        if let Some((first, second)) = self.queue.pop_pair() {
            let room_id = self.open_room(first, Some(second));
            info!(room_id = %room_id, red = %first, black = %second, "players paired");
            out.follow_ups.push(Command::Start { player: second });
        }
        if self.queue.contains(player) {
            self.notice(out, player, notices::WAITING);
        }
    }

    fn relay_move(&mut self, player: PlayerId, from: Position, to: Position, out: &mut Outcome<T>) {
        let Some(session) = self.sessions.get(&player) else {
            return ignored(player, "move");
        };
        if !session.is_playing() {
            return self.notice(out, player, notices::GAME_NOT_STARTED);
        }
        let seats = match self.seats(session.room) {
            None => return self.notice(out, player, notices::ROOM_NOT_FOUND),
            Some(seats) if !seats.full => return self.notice(out, player, notices::GAME_NOT_STARTED),
            Some(seats) if seats.current != Some(player) => {
                return self.notice(out, player, notices::WAIT_FOR_OPPONENT);
            }
            Some(seats) => seats,
        };

        if let Some(target) = seats.next {
            self.deliver(out, target, ServerMessage::Move { from, to });
        }
        if let Some(room) = self.rooms.get_mut(&seats.id) {
            room.record_move(player, from, to);
            room.exchange();
        }
    }

    fn start(&mut self, player: PlayerId, out: &mut Outcome<T>) {
        let Some(session) = self.sessions.get(&player) else {
            return ignored(player, "start");
        };
        let seats = match self.seats(session.room) {
            None => {
                if let Some(session) = self.sessions.get_mut(&player) {
                    session.reset();
                }
                return self.notice(out, player, notices::PLEASE_MATCH);
            }
            Some(seats) if !seats.full => return self.notice(out, player, notices::ROOM_NOT_FULL),
            Some(seats) => seats,
        };

        for (seat, role) in [(seats.current, Role::Red), (seats.next, Role::Black)] {
            let Some(seat) = seat else { continue };
            if let Some(session) = self.sessions.get_mut(&seat) {
                session.start_play(role);
            }
            self.deliver(out, seat, ServerMessage::Start { role });
        }
        self.spare_rooms.retain(|id| *id != seats.id);
        info!(room_id = %seats.id, "game started");
    }

    fn end(&mut self, player: PlayerId, verdict: Verdict, out: &mut Outcome<T>) {
        let Some(session) = self.sessions.get(&player) else {
            return ignored(player, "end");
        };
        let (playing, role) = (session.is_playing(), session.role);
        let Some(seats) = self.seats(session.room) else {
            return self.notice(out, player, notices::ROOM_NOT_FOUND);
        };
        if !playing {
            return self.notice(out, player, notices::GAME_NOT_STARTED);
        }

        let winner = verdict.winner(role);
        for seat in [seats.current, seats.next].into_iter().flatten() {
            self.deliver(out, seat, ServerMessage::End { winner });
        }
        info!(room_id = %seats.id, winner = winner.as_str(), "game ended");
        self.dissolve(seats.id, None, None, out);
    }

    fn join(&mut self, player: PlayerId, room_id: RoomId, out: &mut Outcome<T>) {
        let Some((status, in_room)) = self.status_of(player) else {
            return ignored(player, "join");
        };
        if status == SessionStatus::Playing {
            return self.notice(out, player, notices::ALREADY_IN_GAME);
        }
        if in_room {
            return self.notice(out, player, notices::ALREADY_IN_ROOM);
        }

        let seated = match self.rooms.get_mut(&room_id) {
            None => Err(notices::ROOM_NOT_FOUND.to_string()),
            Some(room) => room
                .seat(player)
                .map(|()| room.is_full())
                .map_err(|e| e.to_string()),
        };
        let full = match seated {
            Ok(full) => full,
            Err(text) => return self.notice(out, player, &text),
        };

        if self.queue.remove(player) {
            self.set_status(player, SessionStatus::Online);
        }
        if let Some(session) = self.sessions.get_mut(&player) {
            session.room = Some(room_id);
        }
        debug!(player_id = %player, room_id = %room_id, "joined room");
        self.deliver(out, player, ServerMessage::Joined { room_id });
        if full {
            self.spare_rooms.retain(|id| *id != room_id);
            out.follow_ups.push(Command::Start { player });
        }
    }

    fn create(&mut self, player: PlayerId, out: &mut Outcome<T>) {
        let Some((status, in_room)) = self.status_of(player) else {
            return ignored(player, "create");
        };
        if status == SessionStatus::Playing {
            return self.notice(out, player, notices::ALREADY_IN_GAME);
        }
        if in_room {
            return self.notice(out, player, notices::ALREADY_IN_ROOM);
        }

        if self.queue.remove(player) {
            self.set_status(player, SessionStatus::Online);
        }
        let room_id = self.open_room(player, None);
        self.spare_rooms.push(room_id);
        info!(room_id = %room_id, player_id = %player, "room created");
        self.deliver(out, player, ServerMessage::Created { room_id });
    }

    /// Open a room and point the seated sessions at it.
    fn open_room(&mut self, current: PlayerId, next: Option<PlayerId>) -> RoomId {
        let id = self.room_ids.next_id();
        for seat in std::iter::once(current).chain(next) {
            if let Some(session) = self.sessions.get_mut(&seat) {
                session.room = Some(id);
            }
        }
        let _ = self.rooms.insert(id, Room::with_seats(id, current, next));
        id
    }

    /// Delete a room and send everyone but `leaver` back to the lobby.
    fn dissolve(
        &mut self,
        room_id: RoomId,
        leaver: Option<PlayerId>,
        notice: Option<ServerMessage>,
        out: &mut Outcome<T>,
    ) {
        self.spare_rooms.retain(|id| *id != room_id);
        let Some(mut room) = self.rooms.remove(&room_id) else {
            out.faults.push(HubError::DanglingRoom(room_id));
            return;
        };
        for occupant in room.clear() {
            if Some(occupant) == leaver {
                continue;
            }
            if let Some(message) = &notice {
                self.deliver(out, occupant, message.clone());
            }
            if let Some(session) = self.sessions.get_mut(&occupant) {
                session.reset();
            }
        }
        debug!(room_id = %room_id, "room deleted");
    }

    fn deliver(&self, out: &mut Outcome<T>, player: PlayerId, message: ServerMessage) {
        match self.sessions.get(&player) {
            Some(session) => out.effects.push(Effect::Deliver {
                player,
                transport: session.transport.clone(),
                message,
            }),
            None => out.faults.push(HubError::UnknownTarget(player)),
        }
    }

    fn notice(&self, out: &mut Outcome<T>, player: PlayerId, text: &str) {
        self.deliver(out, player, ServerMessage::notice(text));
    }
}

impl<T> HubState<T> {
    pub fn session(&self, player: PlayerId) -> Option<&Session<T>> {
        self.sessions.get(&player)
    }

    pub fn room(&self, room: RoomId) -> Option<&Room> {
        self.rooms.get(&room)
    }

    pub fn queue(&self) -> &MatchQueue {
        &self.queue
    }

    /// Joinable rooms, oldest first. A copy, never a live view.
    pub fn spare_rooms(&self) -> Vec<RoomInfo> {
        self.spare_rooms
            .iter()
            .filter_map(|id| self.rooms.get(id))
            .map(|room| RoomInfo {
                id: room.id,
                current: room.current().map(|id| SeatInfo { id }),
                next: room.next().map(|id| SeatInfo { id }),
            })
            .collect()
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            sessions: self.sessions.len(),
            rooms: self.rooms.len(),
            waiting: self.queue.len(),
            joinable: self.spare_rooms.len(),
        }
    }

    /// Verify the cross-references between sessions, rooms, the spare list
    /// and the match queue.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut seated: HashMap<PlayerId, RoomId> = HashMap::new();
        for (id, room) in &self.rooms {
            if room.is_empty() {
                return Err(format!("room {id} is empty but still exists"));
            }
            for occupant in room.occupants() {
                if let Some(other) = seated.insert(occupant, *id) {
                    return Err(format!("player {occupant} sits in rooms {other} and {id}"));
                }
                match self.sessions.get(&occupant) {
                    Some(s) if s.room == Some(*id) => {}
                    Some(s) => {
                        return Err(format!(
                            "player {occupant} seated in room {id} but points at {:?}",
                            s.room
                        ))
                    }
                    None => return Err(format!("room {id} seats unregistered player {occupant}")),
                }
            }
        }
        for (player, session) in &self.sessions {
            if let Some(room) = session.room {
                if !self.rooms.get(&room).is_some_and(|r| r.contains(*player)) {
                    return Err(format!("player {player} points at room {room} without a seat"));
                }
            }
            if session.status == SessionStatus::Playing && session.room.is_none() {
                return Err(format!("player {player} is playing outside a room"));
            }
        }
        for player in self.queue.iter() {
            match self.sessions.get(player) {
                Some(s) if s.status == SessionStatus::Matching && s.room.is_none() => {}
                _ => return Err(format!("queued player {player} is not a free matching session")),
            }
        }
        for id in &self.spare_rooms {
            match self.rooms.get(id) {
                Some(room) if !room.is_full() => {}
                _ => return Err(format!("spare room {id} is missing or full")),
            }
        }
        Ok(())
    }

    fn status_of(&self, player: PlayerId) -> Option<(SessionStatus, bool)> {
        self.sessions
            .get(&player)
            .map(|s| (s.status, s.room.is_some()))
    }

    fn set_status(&mut self, player: PlayerId, status: SessionStatus) {
        if let Some(session) = self.sessions.get_mut(&player) {
            session.status = status;
        }
    }

    fn seats(&self, room: Option<RoomId>) -> Option<Seats> {
        let room = self.rooms.get(&room?)?;
        Some(Seats {
            id: room.id,
            current: room.current(),
            next: room.next(),
            full: room.is_full(),
        })
    }
}

fn ignored(player: PlayerId, command: &'static str) {
    debug!(player_id = %player, command, "command for unregistered session ignored");
}
