//! Shared helpers: scripted sessions and owned views of outbound commands.

#![allow(dead_code)]

use lockstep_server::game::orders::pack_unit_ids;
use lockstep_server::game::UnitIds;
use lockstep_server::network::OrderRequest;
use lockstep_server::{
    required_memory, ChunkQueue, ClientId, ClientMessage, GameConfig, GameState, LockstepSimulation,
    Mode, NetCommand, NetEvent, ServerMessage, Simulation, Target, Update,
};

pub const TICK_US: u64 = LockstepSimulation::TICK_DURATION_MS * 1000;

pub fn connect(id: u64) -> Vec<u8> {
    NetEvent::Connect { client_id: ClientId(id) }.to_bytes().unwrap()
}

pub fn disconnect(id: u64) -> Vec<u8> {
    NetEvent::Disconnect { client_id: ClientId(id) }.to_bytes().unwrap()
}

pub fn message(id: u64, message: &ClientMessage<'_>) -> Vec<u8> {
    let payload = message.to_bytes().unwrap();
    NetEvent::Message {
        client_id: ClientId(id),
        payload: &payload,
    }
    .to_bytes()
    .unwrap()
}

pub fn order(id: u64, units: &[u16], x: i32, y: i32) -> Vec<u8> {
    let packed = pack_unit_ids(units);
    message(
        id,
        &ClientMessage::Order(OrderRequest {
            unit_ids: UnitIds::from_bytes(&packed),
            target: Target::new(x, y),
        }),
    )
}

pub fn reply(id: u64) -> Vec<u8> {
    message(id, &ClientMessage::Reply)
}

/// One `update` call: its inputs.
#[derive(Clone, Debug, Default)]
pub struct Step {
    pub time: u64,
    pub terminate: bool,
    pub events: Vec<Vec<u8>>,
}

impl Step {
    pub fn at(time: u64) -> Self {
        Self {
            time,
            ..Self::default()
        }
    }

    pub fn with(mut self, event: Vec<u8>) -> Self {
        self.events.push(event);
        self
    }

    pub fn terminate(mut self) -> Self {
        self.terminate = true;
        self
    }
}

/// Everything observable about one `update` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Observed {
    pub update: Update,
    pub mode: Mode,
    pub commands: Vec<Vec<u8>>,
    pub next_tick_time: u64,
    pub arena_used: usize,
    pub staged: usize,
    pub all_assigned: bool,
    pub none_assigned: bool,
    pub roster_len: usize,
}

/// Result of a scripted session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transcript {
    pub steps: Vec<Observed>,
    pub ticks: u64,
    pub state_hash: [u8; 32],
    pub arena_baseline: usize,
}

impl Transcript {
    pub fn commands(&self) -> Vec<Command> {
        self.steps
            .iter()
            .flat_map(|step| step.commands.iter().map(|c| Command::decode(c)))
            .collect()
    }
}

/// Run `steps` against a fresh session of `N` players created at time 0.
pub fn run_script<const N: usize>(config: GameConfig, steps: &[Step]) -> Transcript {
    let mut memory = vec![0u8; required_memory(N)];
    let mut event_storage = vec![0u8; 256 * 1024];
    let mut command_storage = vec![0u8; 256 * 1024];

    let mut game = GameState::<_, N>::new(&mut memory, LockstepSimulation::new(), config, 0).unwrap();
    let mut events = ChunkQueue::new(&mut event_storage);
    let mut commands = ChunkQueue::new(&mut command_storage);
    let arena_baseline = game.arena_used();

    let mut observed = Vec::with_capacity(steps.len());
    for step in steps {
        for event in &step.events {
            events.write(event).unwrap();
        }
        let update = game
            .update(step.time, step.terminate, &mut events, &mut commands)
            .unwrap();
        assert!(events.is_empty(), "update must drain every event");

        let mut emitted = Vec::new();
        while let Some(record) = commands.read() {
            emitted.push(record.to_vec());
        }

        let players = game.roster().players();
        observed.push(Observed {
            update,
            mode: game.mode(),
            commands: emitted,
            next_tick_time: game.next_tick_time(),
            arena_used: game.arena_used(),
            staged: game.staged_orders(),
            all_assigned: players.iter().all(|p| p.sim_player_id.is_some()),
            none_assigned: players.iter().all(|p| p.sim_player_id.is_none()),
            roster_len: players.len(),
        });
    }

    let simulation = game.into_simulation();
    Transcript {
        steps: observed,
        ticks: simulation.tick_count(),
        state_hash: simulation.state_hash(),
        arena_baseline,
    }
}

/// Owned, decoded order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeenOrder {
    pub player: u32,
    pub units: Vec<u16>,
    pub target: Target,
}

/// Owned, decoded server message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Start { player_count: u32, your_index: u32 },
    Orders(Vec<SeenOrder>),
}

impl Message {
    pub fn decode(bytes: &[u8]) -> Self {
        match ServerMessage::decode(bytes).unwrap() {
            ServerMessage::Start {
                player_count,
                your_index,
            } => Message::Start {
                player_count,
                your_index,
            },
            ServerMessage::OrderList(list) => Message::Orders(
                list.iter()
                    .map(|o| SeenOrder {
                        player: o.player_id.0,
                        units: o.unit_ids.iter().collect(),
                        target: o.target,
                    })
                    .collect(),
            ),
        }
    }
}

/// Owned, decoded outbound command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Send { to: u64, message: Message },
    Broadcast { to: Vec<u64>, message: Message },
    Shutdown,
}

impl Command {
    pub fn decode(bytes: &[u8]) -> Self {
        match NetCommand::decode(bytes).unwrap() {
            NetCommand::Send { client_id, payload } => Command::Send {
                to: client_id.0,
                message: Message::decode(payload),
            },
            NetCommand::Broadcast { client_ids, payload } => Command::Broadcast {
                to: client_ids.iter().map(|c| c.0).collect(),
                message: Message::decode(payload),
            },
            NetCommand::Shutdown => Command::Shutdown,
        }
    }
}
