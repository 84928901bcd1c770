//! Player Roster
//!
//! Fixed-capacity table mapping transport client ids to simulation player ids.
//! The capacity is a correctness bound of the session, so the table never grows.

use std::ops::Deref;

use crate::game::simulation::SimPlayerId;
use crate::network::protocol::ClientId;

/// A connected player.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Player {
    /// Transport-assigned identifier.
    pub client_id: ClientId,
    /// Simulation identifier; `None` until the game starts.
    pub sim_player_id: Option<SimPlayerId>,
}

impl Player {
    const VACANT: Player = Player {
        client_id: ClientId(0),
        sim_player_id: None,
    };
}

/// Roster of at most `N` players with pairwise distinct client ids.
#[derive(Clone, Debug)]
pub struct Roster<const N: usize> {
    players: [Player; N],
    len: usize,
}

impl<const N: usize> Default for Roster<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Roster<N> {
    /// Maximum number of players.
    pub const CAPACITY: usize = N;

    /// Create an empty roster.
    pub const fn new() -> Self {
        Self {
            players: [Player::VACANT; N],
            len: 0,
        }
    }

    /// Number of players.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nobody is connected.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether every seat is taken.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == N
    }

    /// Players in seat order.
    #[inline]
    pub fn players(&self) -> &[Player] {
        &self.players[..self.len]
    }

    /// Iterate over players in seat order.
    pub fn iter(&self) -> std::slice::Iter<'_, Player> {
        self.players().iter()
    }

    /// Seat index of `client_id`.
    pub fn find_by_client_id(&self, client_id: ClientId) -> Option<usize> {
        self.iter().position(|player| player.client_id == client_id)
    }

    /// Simulation id of `client_id`, if present and assigned.
    pub fn sim_id_of(&self, client_id: ClientId) -> Option<SimPlayerId> {
        self.iter()
            .find(|player| player.client_id == client_id)
            .and_then(|player| player.sim_player_id)
    }

    /// Seat a new, unassigned player.
    ///
    /// # Panics
    ///
    /// If the roster is full or `client_id` is already seated.
    pub fn add(&mut self, client_id: ClientId) {
        assert!(!self.is_full(), "roster full");
        assert!(
            self.find_by_client_id(client_id).is_none(),
            "client {client_id} already seated"
        );
        self.players[self.len] = Player {
            client_id,
            sim_player_id: None,
        };
        self.len += 1;
    }

    /// Remove the player at `index`; the last player takes its seat.
    ///
    /// # Panics
    ///
    /// If `index` is out of range.
    pub fn remove(&mut self, index: usize) -> Player {
        assert!(index < self.len, "seat {index} out of range");
        let removed = self.players[index];
        self.len -= 1;
        self.players.swap(index, self.len);
        self.players[self.len] = Player::VACANT;
        removed
    }

    /// Give every seated player the id produced by `create`, in seat order.
    pub fn assign_sim_ids(&mut self, mut create: impl FnMut() -> SimPlayerId) {
        for player in &mut self.players[..self.len] {
            player.sim_player_id = Some(create());
        }
    }

    /// Copy of the seated client ids, for broadcasts.
    pub fn client_ids(&self) -> ClientIds<N> {
        let mut ids = [ClientId(0); N];
        for (slot, player) in ids.iter_mut().zip(self.iter()) {
            *slot = player.client_id;
        }
        ClientIds { ids, len: self.len }
    }
}

/// Fixed-size snapshot of the roster's client ids.
#[derive(Clone, Copy, Debug)]
pub struct ClientIds<const N: usize> {
    ids: [ClientId; N],
    len: usize,
}

impl<const N: usize> Deref for ClientIds<N> {
    type Target = [ClientId];

    fn deref(&self) -> &[ClientId] {
        &self.ids[..self.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_find() {
        let mut roster = Roster::<4>::new();
        roster.add(ClientId(7));
        roster.add(ClientId(9));

        assert_eq!(roster.len(), 2);
        assert_eq!(roster.find_by_client_id(ClientId(9)), Some(1));
        assert_eq!(roster.find_by_client_id(ClientId(1)), None);
        assert_eq!(roster.sim_id_of(ClientId(7)), None);
    }

    #[test]
    fn test_remove_swaps_last_into_seat() {
        let mut roster = Roster::<3>::new();
        roster.add(ClientId(1));
        roster.add(ClientId(2));
        roster.add(ClientId(3));

        let removed = roster.remove(0);
        assert_eq!(removed.client_id, ClientId(1));
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.find_by_client_id(ClientId(3)), Some(0));
        assert_eq!(roster.find_by_client_id(ClientId(2)), Some(1));
        assert!(!roster.is_full());
    }

    #[test]
    fn test_assign_sim_ids_in_seat_order() {
        let mut roster = Roster::<2>::new();
        roster.add(ClientId(40));
        roster.add(ClientId(41));

        let mut next = 10;
        roster.assign_sim_ids(|| {
            next += 1;
            SimPlayerId(next)
        });

        assert_eq!(roster.sim_id_of(ClientId(40)), Some(SimPlayerId(11)));
        assert_eq!(roster.sim_id_of(ClientId(41)), Some(SimPlayerId(12)));
    }

    #[test]
    fn test_client_ids_snapshot() {
        let mut roster = Roster::<3>::new();
        roster.add(ClientId(5));
        roster.add(ClientId(6));

        let ids = roster.client_ids();
        assert_eq!(&*ids, &[ClientId(5), ClientId(6)]);
    }

    #[test]
    #[should_panic(expected = "roster full")]
    fn test_add_when_full_panics() {
        let mut roster = Roster::<1>::new();
        roster.add(ClientId(1));
        roster.add(ClientId(2));
    }

    #[test]
    #[should_panic(expected = "already seated")]
    fn test_duplicate_client_panics() {
        let mut roster = Roster::<2>::new();
        roster.add(ClientId(1));
        roster.add(ClientId(1));
    }
}
