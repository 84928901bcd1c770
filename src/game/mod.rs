//! Game Loop Module
//!
//! The lockstep session: roster, order staging, the simulation contract and
//! the tick scheduler that ties them together.
//!
//! ## Module Structure
//!
//! - `orders`: Order, unit id and order list types
//! - `roster`: Fixed-capacity client/player table
//! - `staging`: Per-tick order accumulator
//! - `simulation`: Simulation contract and reference kernel
//! - `state`: Session state machine and tick scheduler

pub mod orders;
pub mod roster;
pub mod simulation;
pub mod staging;
pub mod state;

// Re-export key types
pub use orders::{Order, OrderList, Target, UnitIds, ORDER_UNITS_MAX};
pub use roster::{Player, Roster};
pub use simulation::{LockstepSimulation, SimPlayerId, Simulation};
pub use staging::{OrderStaging, STAGING_QUEUE_SIZE};
pub use state::{GameConfig, GameError, GameState, Mode, Update};
