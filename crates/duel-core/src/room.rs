use serde::Serialize;

use crate::errors::RoomError;
use crate::ids::{PlayerId, RoomId};
use crate::protocol::Position;

/// One relayed move, kept for the life of the room.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MoveRecord {
    pub player: PlayerId,
    pub from: Position,
    pub to: Position,
}

/// A two-seat contest. The first player seated takes `current` and moves first.
#[derive(Clone, Debug)]
pub struct Room {
    pub id: RoomId,
    current: Option<PlayerId>,
    next: Option<PlayerId>,
    history: Vec<MoveRecord>,
}

impl Room {
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            current: None,
            next: None,
            history: Vec::new(),
        }
    }

    /// A room opened with its seats already assigned.
    pub fn with_seats(id: RoomId, current: PlayerId, next: Option<PlayerId>) -> Self {
        Self {
            id,
            current: Some(current),
            next,
            history: Vec::new(),
        }
    }

    /// Number of occupied seats, always derived from the seats themselves.
    pub fn occupancy(&self) -> usize {
        usize::from(self.current.is_some()) + usize::from(self.next.is_some())
    }

    pub fn is_full(&self) -> bool {
        self.occupancy() == 2
    }

    pub fn is_empty(&self) -> bool {
        self.occupancy() == 0
    }

    /// The seat entitled to move.
    pub fn current(&self) -> Option<PlayerId> {
        self.current
    }

    pub fn next(&self) -> Option<PlayerId> {
        self.next
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.current == Some(player) || self.next == Some(player)
    }

    /// Occupants in seat order (`current` first).
    pub fn occupants(&self) -> Vec<PlayerId> {
        self.current.into_iter().chain(self.next).collect()
    }

    pub fn seat(&mut self, player: PlayerId) -> Result<(), RoomError> {
        if self.is_full() {
            return Err(RoomError::Full);
        }
        if self.current.is_none() {
            self.current = Some(player);
        } else {
            self.next = Some(player);
        }
        Ok(())
    }

    /// Hand the move to the other seat. Does nothing unless both seats are taken.
    pub fn exchange(&mut self) {
        if self.is_full() {
            std::mem::swap(&mut self.current, &mut self.next);
        }
    }

    pub fn record_move(&mut self, player: PlayerId, from: Position, to: Position) {
        self.history.push(MoveRecord { player, from, to });
    }

    pub fn history(&self) -> &[MoveRecord] {
        &self.history
    }

    /// Empty both seats, returning who was sitting there.
    pub fn clear(&mut self) -> Vec<PlayerId> {
        let occupants = self.occupants();
        self.current = None;
        self.next = None;
        occupants
    }
}
