//! # Lockstep Server
//!
//! Authoritative server for deterministic lockstep games. Clients send orders;
//! every tick the server relays the tick's complete, ordered order list to all
//! players and steps its own copy of the simulation with the same list.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      LOCKSTEP SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/             - Heap-free primitives                    │
//! │  ├── arena.rs      - Bump arena with checkpoint/rewind       │
//! │  ├── chunk_queue.rs- Length-prefixed record FIFO             │
//! │  └── hash.rs       - Chained state hashing                   │
//! │                                                              │
//! │  game/             - Session logic (deterministic)           │
//! │  ├── orders.rs     - Orders and order lists                  │
//! │  ├── roster.rs     - Client to player table                  │
//! │  ├── staging.rs    - Per-tick order accumulator              │
//! │  ├── simulation.rs - Simulation contract + reference kernel  │
//! │  └── state.rs      - Lifecycle and tick scheduler            │
//! │                                                              │
//! │  network/          - Networking (non-deterministic)          │
//! │  ├── protocol.rs   - Events, messages, commands              │
//! │  ├── transport.rs  - WebSocket server                        │
//! │  └── host.rs       - Drives a session over the transport     │
//! │                                                              │
//! │  config.rs         - Host configuration                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Guarantee
//!
//! [`GameState`] works inside one caller-provided byte region. Long-lived
//! storage is carved from it once; every per-update buffer is arena scratch
//! rewound before `update` returns. The game loop itself never allocates.
//!
//! ## Determinism Guarantee
//!
//! Events are handled in arrival order, orders reach the simulation in the
//! order they were staged, and the broadcast is queued before the simulation
//! ticks. Identical event streams and timestamps produce byte-identical
//! command streams.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use config::{ConfigError, HostConfig};
pub use crate::core::arena::Arena;
pub use crate::core::chunk_queue::ChunkQueue;
pub use game::state::{required_memory, GameConfig, GameError, GameState, Mode, Update};
pub use game::{LockstepSimulation, Order, OrderList, SimPlayerId, Simulation, Target};
pub use network::protocol::{ClientId, ClientMessage, NetCommand, NetEvent, ServerMessage};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default roster capacity.
pub const PLAYERS_MAX: usize = 1;

/// Delay hint returned by every update (µs).
pub const POLL_DELAY_US: u64 = 1000;
