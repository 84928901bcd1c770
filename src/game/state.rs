//! Session State Machine and Tick Scheduler
//!
//! One `GameState` runs one lockstep session over a caller-provided memory
//! region. The host calls [`GameState::update`] on every wake; the state drains
//! network events, advances the lifecycle and, when a tick is due, broadcasts
//! the tick's order list and steps the simulation.
//!
//! ## Lifecycle
//!
//! ```text
//! WaitingForClients ──roster full──▶ Active ──termination──▶ Disconnecting
//!        │                             │                          │
//!        └──termination──▶ Disconnecting   roster empty ──▶ Stopped ◀─┘
//! ```
//!
//! ## Memory
//!
//! The staging queue is carved from the region at construction. Every other
//! buffer is arena scratch released before `update` returns, so steady-state
//! operation never touches the heap.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::arena::{Arena, ArenaError};
use crate::core::chunk_queue::{ChunkQueue, QueueError};
use crate::game::orders::{Order, ORDER_UNITS_MAX};
use crate::game::roster::Roster;
use crate::game::simulation::{tick_duration_us, Simulation};
use crate::game::staging::{OrderStaging, Staged, STAGING_QUEUE_SIZE};
use crate::network::protocol::{
    net_command_max_length, ClientId, ClientMessage, CodecError, NetCommand, NetEvent,
    ServerMessage, NET_MESSAGE_MAX_LENGTH,
};
use crate::{PLAYERS_MAX, POLL_DELAY_US};

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Filling the roster.
    #[default]
    WaitingForClients,
    /// Ticking.
    Active,
    /// Shutdown requested, waiting for clients to leave.
    Disconnecting,
    /// Terminal.
    Stopped,
}

/// Session tunables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Force a stop this long after entering `Disconnecting`. `None` waits forever.
    pub disconnect_timeout_us: Option<u64>,
    /// Shorten the delay hint to the next tick deadline while active.
    pub adaptive_delay: bool,
}

/// Result of one [`GameState::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Update {
    /// Longest the host should block before calling `update` again.
    pub delay_us: u64,
    /// False once the session has stopped.
    pub still_running: bool,
}

/// Game loop errors. All of them are contract breaks, not peer misbehavior.
#[derive(Debug, Error)]
pub enum GameError {
    /// Arena precondition violated.
    #[error("arena: {0}")]
    Arena(#[from] ArenaError),

    /// Outbound or frame queue overflow.
    #[error("queue: {0}")]
    Queue(#[from] QueueError),

    /// Undecodable event or message, or an encode that did not fit.
    #[error("codec: {0}")]
    Codec(#[from] CodecError),

    /// The memory region cannot hold the session.
    #[error("memory region of {provided} bytes, {required} required")]
    MemoryTooSmall {
        /// Bytes provided.
        provided: usize,
        /// Bytes required.
        required: usize,
    },
}

/// Scratch needed to encode one server message and its command.
pub const fn message_scratch_length(players: usize) -> usize {
    NET_MESSAGE_MAX_LENGTH + net_command_max_length(players)
}

/// Memory a session for `players` needs: staging storage plus the tick's
/// worst-case scratch (drained frame, message, command).
pub const fn required_memory(players: usize) -> usize {
    STAGING_QUEUE_SIZE + STAGING_QUEUE_SIZE + message_scratch_length(players)
}

/// Who a server message goes to.
#[derive(Debug, Clone, Copy)]
enum Recipients<'r> {
    One(ClientId),
    All(&'r [ClientId]),
}

/// Authoritative state of one lockstep session for up to `N` players.
pub struct GameState<'m, S: Simulation, const N: usize = PLAYERS_MAX> {
    mode: Mode,
    arena: Arena<'m>,
    roster: Roster<N>,
    staging: OrderStaging<'m>,
    next_tick_time: u64,
    simulation: S,
    config: GameConfig,
    disconnect_deadline: Option<u64>,
}

impl<'m, S: Simulation, const N: usize> GameState<'m, S, N> {
    /// Size of the memory region for `N` players.
    pub const REQUIRED_MEMORY: usize = required_memory(N);

    /// Bytes the memory region must provide.
    pub const fn required_memory() -> usize {
        Self::REQUIRED_MEMORY
    }

    /// Set up a session over `memory` at `time` (µs).
    pub fn new(
        memory: &'m mut [u8],
        simulation: S,
        config: GameConfig,
        time: u64,
    ) -> Result<Self, GameError> {
        if memory.len() < Self::REQUIRED_MEMORY {
            return Err(GameError::MemoryTooSmall {
                provided: memory.len(),
                required: Self::REQUIRED_MEMORY,
            });
        }

        let mut arena = Arena::new(memory);
        let staging = OrderStaging::new(arena.reserve(STAGING_QUEUE_SIZE)?);

        debug!(
            players_max = N,
            arena_bytes = arena.capacity(),
            staging_bytes = STAGING_QUEUE_SIZE,
            "game initialised"
        );

        Ok(Self {
            mode: Mode::WaitingForClients,
            arena,
            roster: Roster::new(),
            staging,
            next_tick_time: time,
            simulation,
            config,
            disconnect_deadline: None,
        })
    }

    /// Current lifecycle mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Seated players.
    pub fn roster(&self) -> &Roster<N> {
        &self.roster
    }

    /// Deadline of the next tick (µs).
    pub fn next_tick_time(&self) -> u64 {
        self.next_tick_time
    }

    /// Orders waiting for the next tick.
    pub fn staged_orders(&self) -> usize {
        self.staging.len()
    }

    /// Arena bytes in use; constant across `update` calls.
    pub fn arena_used(&self) -> usize {
        self.arena.used()
    }

    /// The simulation.
    pub fn simulation(&self) -> &S {
        &self.simulation
    }

    /// Give up the session and keep the simulation.
    pub fn into_simulation(self) -> S {
        self.simulation
    }

    /// Run one step of the loop.
    ///
    /// Drains `events`, applies at most one lifecycle transition (which may
    /// fire one tick) and appends any resulting commands to `commands`.
    pub fn update(
        &mut self,
        time: u64,
        termination_requested: bool,
        events: &mut ChunkQueue<'_>,
        commands: &mut ChunkQueue<'_>,
    ) -> Result<Update, GameError> {
        let arena_at_entry = self.arena.used();

        self.process_events(events)?;
        self.advance(time, termination_requested, commands)?;

        debug_assert_eq!(self.arena.used(), arena_at_entry, "arena scratch leaked");

        Ok(Update {
            delay_us: self.delay_hint(time),
            still_running: self.mode != Mode::Stopped,
        })
    }

    fn process_events(&mut self, events: &mut ChunkQueue<'_>) -> Result<(), GameError> {
        while let Some(record) = events.read() {
            match NetEvent::decode(record)? {
                NetEvent::Connect { client_id } => self.handle_connect(client_id),
                NetEvent::Disconnect { client_id } => self.handle_disconnect(client_id),
                NetEvent::Message { client_id, payload } => self.handle_message(client_id, payload)?,
            }
        }
        Ok(())
    }

    fn handle_connect(&mut self, client_id: ClientId) {
        if self.mode != Mode::WaitingForClients {
            debug!(%client_id, mode = ?self.mode, "ignoring connect after lobby closed");
            return;
        }
        if self.roster.is_full() {
            debug!(%client_id, "roster full, ignoring connect");
            return;
        }
        if self.roster.find_by_client_id(client_id).is_some() {
            warn!(%client_id, "duplicate connect ignored");
            return;
        }

        self.roster.add(client_id);
        info!(%client_id, players = self.roster.len(), "added player");
    }

    fn handle_disconnect(&mut self, client_id: ClientId) {
        match self.roster.find_by_client_id(client_id) {
            Some(index) => {
                self.roster.remove(index);
                info!(%client_id, players = self.roster.len(), "removed player");
            }
            None => debug!(%client_id, "disconnect from unknown client"),
        }
    }

    fn handle_message(&mut self, client_id: ClientId, payload: &[u8]) -> Result<(), GameError> {
        match ClientMessage::decode(payload)? {
            ClientMessage::Reply => debug!(%client_id, "received reply"),
            ClientMessage::Order(request) => {
                let Some(player_id) = self.roster.sim_id_of(client_id) else {
                    debug!(%client_id, "dropping order from unassigned client");
                    return Ok(());
                };

                let unit_ids = request.unit_ids;
                if !unit_ids.is_well_formed() || unit_ids.len() > ORDER_UNITS_MAX {
                    warn!(%client_id, bytes = unit_ids.as_bytes().len(), "dropping malformed order");
                    return Ok(());
                }

                let order = Order {
                    player_id,
                    unit_ids,
                    target: request.target,
                };
                if self.staging.stage(&order, &mut self.arena)? == Staged::Full {
                    warn!(%client_id, staged = self.staging.len(), "staging queue full, dropping order");
                }
            }
        }
        Ok(())
    }

    fn advance(
        &mut self,
        time: u64,
        termination_requested: bool,
        commands: &mut ChunkQueue<'_>,
    ) -> Result<(), GameError> {
        if self.mode == Mode::Stopped {
            return Ok(());
        }

        if self.mode != Mode::Disconnecting && termination_requested {
            emit_shutdown::<N>(&mut self.arena, commands)?;
            self.mode = Mode::Disconnecting;
            self.disconnect_deadline = self
                .config
                .disconnect_timeout_us
                .map(|timeout| time.saturating_add(timeout));
            info!(players = self.roster.len(), "termination requested, disconnecting");
        } else if self.mode != Mode::WaitingForClients && self.roster.is_empty() {
            if self.mode != Mode::Disconnecting {
                emit_shutdown::<N>(&mut self.arena, commands)?;
            }
            self.mode = Mode::Stopped;
            info!("all players have left, stopping game");
        } else if self.mode == Mode::WaitingForClients && self.roster.is_full() {
            self.start_game(time, commands)?;
        } else if self.mode == Mode::Active {
            if time >= self.next_tick_time {
                self.tick_frame(commands)?;
            }
        } else if self.mode == Mode::Disconnecting {
            if let Some(deadline) = self.disconnect_deadline {
                if time >= deadline {
                    warn!(players = self.roster.len(), "disconnect timeout elapsed, stopping game");
                    self.mode = Mode::Stopped;
                }
            }
        }
        Ok(())
    }

    fn start_game(&mut self, time: u64, commands: &mut ChunkQueue<'_>) -> Result<(), GameError> {
        self.simulation.init();
        let simulation = &mut self.simulation;
        self.roster.assign_sim_ids(|| simulation.create_player());

        let player_count = self.roster.len() as u32;
        for (index, player) in self.roster.iter().enumerate() {
            let message = ServerMessage::Start {
                player_count,
                your_index: index as u32,
            };
            send_message::<N>(&mut self.arena, commands, Recipients::One(player.client_id), &message)?;
        }

        self.next_tick_time = time + tick_duration_us::<S>();
        self.mode = Mode::Active;
        info!(players = player_count, next_tick_time = self.next_tick_time, "starting game");
        Ok(())
    }

    fn tick_frame(&mut self, commands: &mut ChunkQueue<'_>) -> Result<(), GameError> {
        let recipients = self.roster.client_ids();
        let frame_length = self.staging.used_bytes();
        let scratch_length = frame_length + message_scratch_length(N);

        let staging = &mut self.staging;
        let simulation = &mut self.simulation;
        let order_count = self.arena.scoped(|arena| -> Result<usize, GameError> {
            arena.ensure_free(scratch_length)?;
            let scratch = arena.allocate(scratch_length)?;
            let (frame, scratch) = scratch.split_at_mut(frame_length);

            let orders = staging.drain_into(frame)?;
            let message = ServerMessage::OrderList(orders.clone());
            commands.write(encode_command(Recipients::All(&*recipients), &message, scratch)?)?;
            simulation.tick(&orders);
            Ok(orders.len())
        })?;

        self.staging.reset();
        self.next_tick_time += tick_duration_us::<S>();
        debug!(orders = order_count, next_tick_time = self.next_tick_time, "tick");
        Ok(())
    }

    fn delay_hint(&self, time: u64) -> u64 {
        if self.config.adaptive_delay && self.mode == Mode::Active {
            POLL_DELAY_US.min(self.next_tick_time.saturating_sub(time))
        } else {
            POLL_DELAY_US
        }
    }
}

/// Encode `message`, then the command delivering it, into `scratch`.
///
/// `scratch` must hold [`message_scratch_length`] bytes for the roster size.
fn encode_command<'b>(
    recipients: Recipients<'_>,
    message: &ServerMessage<'_>,
    scratch: &'b mut [u8],
) -> Result<&'b [u8], CodecError> {
    let (message_buf, command_buf) = scratch.split_at_mut(NET_MESSAGE_MAX_LENGTH);
    let payload = message.encode_into(message_buf)?;
    let command = match recipients {
        Recipients::One(client_id) => NetCommand::Send { client_id, payload },
        Recipients::All(client_ids) => NetCommand::Broadcast {
            client_ids: Cow::Borrowed(client_ids),
            payload,
        },
    };
    command.encode_into(command_buf)
}

fn send_message<const N: usize>(
    arena: &mut Arena<'_>,
    commands: &mut ChunkQueue<'_>,
    recipients: Recipients<'_>,
    message: &ServerMessage<'_>,
) -> Result<(), GameError> {
    arena.scoped(|arena| -> Result<(), GameError> {
        let length = message_scratch_length(N);
        arena.ensure_free(length)?;
        let scratch = arena.allocate(length)?;
        commands.write(encode_command(recipients, message, scratch)?)?;
        Ok(())
    })
}

fn emit_shutdown<const N: usize>(
    arena: &mut Arena<'_>,
    commands: &mut ChunkQueue<'_>,
) -> Result<(), GameError> {
    arena.scoped(|arena| -> Result<(), GameError> {
        let length = net_command_max_length(N);
        arena.ensure_free(length)?;
        let scratch = arena.allocate(length)?;
        commands.write(NetCommand::Shutdown.encode_into(scratch)?)?;
        info!("shutdown command issued");
        Ok(())
    })
}
