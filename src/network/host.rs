//! Host Loop
//!
//! Owns the game's memory region and both byte queues, feeds transport events
//! into [`GameState::update`] and carries its commands back out.
//!
//! The loop blocks for at most the delay hint, waking early for transport
//! activity or the shutdown signal. Termination is latched: once requested it
//! stays requested until the session stops.
//!
//! Client frames are checked here before they reach the core: a frame that is
//! not a valid [`ClientMessage`] is logged and dropped, so a misbehaving peer
//! cannot end the session. An undecodable record inside the core stays fatal.

use std::future::Future;
use std::net::SocketAddr;

use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, HostConfig};
use crate::core::chunk_queue::{ChunkQueue, QueueError};
use crate::game::{GameError, GameState, Simulation};
use crate::network::protocol::{ClientMessage, CodecError, NetCommand, NetEvent};
use crate::network::transport::{Transport, TransportError, TransportEvent};

/// Host errors.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Bad configuration.
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    /// Transport failure.
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// The game loop broke a contract.
    #[error("game: {0}")]
    Game(#[from] GameError),

    /// An event or command could not be converted.
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
}

/// A bound transport plus the configuration to run one session on it.
pub struct Host {
    config: HostConfig,
    transport: Transport,
}

impl Host {
    /// Bind the transport.
    pub async fn bind(config: HostConfig) -> Result<Self, HostError> {
        let transport = Transport::bind(config.transport()).await?;
        Ok(Self { config, transport })
    }

    /// Address the transport listens on.
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Run one session of up to `N` players to completion and return the simulation.
    ///
    /// `shutdown` resolving requests termination; the session then ends once
    /// every client has left (or the configured timeout elapses).
    pub async fn run<S: Simulation, const N: usize>(
        mut self,
        simulation: S,
        shutdown: impl Future<Output = ()>,
    ) -> Result<S, HostError> {
        self.config.validate_for(N)?;

        let memory_size = self
            .config
            .memory_size
            .unwrap_or(GameState::<S, N>::REQUIRED_MEMORY);
        let mut memory = vec![0u8; memory_size];
        let mut event_storage = vec![0u8; self.config.event_queue_size];
        let mut command_storage = vec![0u8; self.config.command_queue_size];

        let clock = Instant::now();
        let now_us = || clock.elapsed().as_micros() as u64;

        let mut game = GameState::<S, N>::new(&mut memory, simulation, self.config.game.clone(), now_us())?;
        let mut events = ChunkQueue::new(&mut event_storage);
        let mut commands = ChunkQueue::new(&mut command_storage);

        info!(
            players_max = N,
            memory_bytes = memory_size,
            tick_ms = S::TICK_DURATION_MS,
            "session started"
        );

        tokio::pin!(shutdown);
        let mut termination_requested = false;
        let mut pending: Option<TransportEvent> = None;

        loop {
            self.pump_events(&mut events, &mut pending)?;

            let update = game.update(now_us(), termination_requested, &mut events, &mut commands)?;
            self.dispatch(&mut commands).await?;

            if !update.still_running {
                break;
            }

            tokio::select! {
                _ = &mut shutdown, if !termination_requested => {
                    info!("termination requested");
                    termination_requested = true;
                }
                event = self.transport.recv(), if pending.is_none() => {
                    pending = Some(event.ok_or(TransportError::Closed)?);
                }
                _ = sleep(Duration::from_micros(update.delay_us)) => {}
            }
        }

        info!(mode = ?game.mode(), "session stopped");
        self.transport.shutdown();
        Ok(game.into_simulation())
    }

    /// Move ready transport events into `events` until it is full.
    ///
    /// An event that does not fit is parked in `pending` for the next round.
    fn pump_events(
        &mut self,
        events: &mut ChunkQueue<'_>,
        pending: &mut Option<TransportEvent>,
    ) -> Result<(), HostError> {
        while let Some(event) = pending.take().or_else(|| self.transport.try_recv()) {
            if let TransportEvent::Received(client_id, payload) = &event {
                if let Err(e) = ClientMessage::decode(payload) {
                    warn!(%client_id, bytes = payload.len(), "dropping undecodable frame: {}", e);
                    continue;
                }
            }
            let record = event_record(&event)?;
            match events.write(&record) {
                Ok(()) => {}
                Err(QueueError::Full { .. }) => {
                    debug!(queued = events.count(), "event queue full, deferring");
                    *pending = Some(event);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Execute every queued command.
    async fn dispatch(&self, commands: &mut ChunkQueue<'_>) -> Result<(), HostError> {
        while let Some(record) = commands.read() {
            match NetCommand::decode(record)? {
                NetCommand::Send { client_id, payload } => {
                    self.transport.send(client_id, payload).await;
                }
                NetCommand::Broadcast { client_ids, payload } => {
                    self.transport.broadcast(&client_ids, payload).await;
                }
                NetCommand::Shutdown => {
                    self.transport.close_all().await;
                }
            }
        }
        Ok(())
    }
}

/// Encode a transport event as an inbound event record.
fn event_record(event: &TransportEvent) -> Result<Vec<u8>, CodecError> {
    match event {
        TransportEvent::Connected(client_id) => NetEvent::Connect { client_id: *client_id }.to_bytes(),
        TransportEvent::Disconnected(client_id) => NetEvent::Disconnect { client_id: *client_id }.to_bytes(),
        TransportEvent::Received(client_id, payload) => NetEvent::Message {
            client_id: *client_id,
            payload,
        }
        .to_bytes(),
    }
}
