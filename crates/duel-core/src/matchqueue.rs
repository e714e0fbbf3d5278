use std::collections::VecDeque;

use crate::ids::PlayerId;

/// Players waiting to be paired, oldest first.
#[derive(Debug, Default)]
pub struct MatchQueue {
    waiting: VecDeque<PlayerId>,
}

impl MatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a player. Returns `false` if they were already waiting.
    pub fn push(&mut self, player: PlayerId) -> bool {
        if self.contains(player) {
            return false;
        }
        self.waiting.push_back(player);
        true
    }

    /// Withdraw a player. Returns `true` if they were waiting.
    pub fn remove(&mut self, player: PlayerId) -> bool {
        match self.waiting.iter().position(|p| *p == player) {
            Some(idx) => self.waiting.remove(idx).is_some(),
            None => false,
        }
    }

    /// Take the two longest-waiting players, if there are two.
    pub fn pop_pair(&mut self) -> Option<(PlayerId, PlayerId)> {
        if self.waiting.len() < 2 {
            return None;
        }
        let first = self.waiting.pop_front()?;
        let second = self.waiting.pop_front()?;
        Some((first, second))
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.waiting.contains(&player)
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerId> {
        self.waiting.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_in_arrival_order() {
        let mut q = MatchQueue::new();
        for id in [1, 2, 3, 4] {
            assert!(q.push(PlayerId(id)));
        }
        assert_eq!(q.pop_pair(), Some((PlayerId(1), PlayerId(2))));
        assert_eq!(q.pop_pair(), Some((PlayerId(3), PlayerId(4))));
        assert_eq!(q.pop_pair(), None);
    }

    #[test]
    fn single_waiter_is_not_paired() {
        let mut q = MatchQueue::new();
        q.push(PlayerId(1));
        assert_eq!(q.pop_pair(), None);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn duplicate_push_is_refused() {
        let mut q = MatchQueue::new();
        assert!(q.push(PlayerId(1)));
        assert!(!q.push(PlayerId(1)));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn remove_happens_once() {
        let mut q = MatchQueue::new();
        q.push(PlayerId(1));
        q.push(PlayerId(2));
        q.push(PlayerId(3));
        assert!(q.remove(PlayerId(2)));
        assert!(!q.remove(PlayerId(2)));
        assert_eq!(q.pop_pair(), Some((PlayerId(1), PlayerId(3))));
        assert!(q.is_empty());
    }
}
