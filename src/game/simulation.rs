//! Simulation Facade
//!
//! The contract the game loop consumes from the deterministic simulation kernel,
//! and a reference kernel that folds every tick into a chained state hash.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::core::hash::{chain_tick_hash, StateHash, GENESIS_HASH};
use crate::game::orders::{OrderList, Target};

/// Player identifier issued by the simulation at game start.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimPlayerId(pub u32);

/// Deterministic lockstep simulation driven by the game loop.
///
/// # Contract
///
/// - [`Simulation::init`] establishes the initial state.
/// - [`Simulation::create_player`] is only called between `init` and the first `tick`.
/// - [`Simulation::tick`] advances exactly one step and depends on nothing but
///   the current state and the order list.
pub trait Simulation {
    /// Length of one tick in milliseconds.
    const TICK_DURATION_MS: u64;

    /// Reset to the deterministic initial state.
    fn init(&mut self);

    /// Register a new player.
    fn create_player(&mut self) -> SimPlayerId;

    /// Advance one tick.
    fn tick(&mut self, orders: &OrderList<'_>);
}

/// Tick length of `S` in microseconds.
#[inline]
pub const fn tick_duration_us<S: Simulation>() -> u64 {
    S::TICK_DURATION_MS * 1000
}

/// Per-player bookkeeping of the reference kernel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlayerRecord {
    /// Orders issued so far.
    pub orders_issued: u64,
    /// Sum of units named across all orders.
    pub units_commanded: u64,
    /// Destination of the most recent order.
    pub last_target: Option<Target>,
}

/// Reference kernel: 50 Hz, sequential player ids, chained state hash.
///
/// Players are registered before the first tick, so ticking never allocates.
#[derive(Clone, Debug, Default)]
pub struct LockstepSimulation {
    players: Vec<PlayerRecord>,
    tick: u64,
    state_hash: StateHash,
}

impl LockstepSimulation {
    /// Create an uninitialised kernel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ticks advanced since `init`.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Chained hash of every tick's orders.
    pub fn state_hash(&self) -> StateHash {
        self.state_hash
    }

    /// Number of registered players.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Bookkeeping for one player.
    pub fn player(&self, id: SimPlayerId) -> Option<&PlayerRecord> {
        self.players.get(id.0 as usize)
    }
}

impl Simulation for LockstepSimulation {
    const TICK_DURATION_MS: u64 = 20;

    fn init(&mut self) {
        self.players.clear();
        self.tick = 0;
        self.state_hash = GENESIS_HASH;
    }

    fn create_player(&mut self) -> SimPlayerId {
        let id = SimPlayerId(self.players.len() as u32);
        self.players.push(PlayerRecord::default());
        id
    }

    fn tick(&mut self, orders: &OrderList<'_>) {
        self.tick += 1;

        let players = &mut self.players;
        self.state_hash = chain_tick_hash(&self.state_hash, self.tick, |hasher| {
            hasher.update_u64(orders.len() as u64);
            for order in orders.iter() {
                hasher.update_u32(order.player_id.0);
                hasher.update_u64(order.unit_ids.len() as u64);
                for unit in order.unit_ids.iter() {
                    hasher.update_u16(unit);
                }
                hasher.update_i32(order.target.x);
                hasher.update_i32(order.target.y);

                // Orders from unknown players still count towards the hash.
                if let Some(record) = players.get_mut(order.player_id.0 as usize) {
                    record.orders_issued += 1;
                    record.units_commanded += order.unit_ids.len() as u64;
                    record.last_target = Some(order.target);
                }
            }
        });

        trace!(tick = self.tick, orders = orders.len(), "simulation ticked");
    }
}
