//! WebSocket Transport
//!
//! Accepts WebSocket connections, assigns each one a [`ClientId`] and turns
//! socket activity into [`TransportEvent`]s for the host loop. Outbound frames
//! go through a bounded per-client channel to a writer task.
//!
//! This layer is **non-deterministic**. It never looks inside payloads.
//!
//! A connection slot is taken when the TCP stream is accepted and released when
//! its task ends, so handshakes in flight count against the limit. A close
//! requested by [`Transport::close_all`] is forced after
//! [`CLOSE_HANDSHAKE_TIMEOUT`] if the peer never answers it.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Duration, Instant};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{accept_async_with_config, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::network::protocol::ClientId;

/// Capacity of the transport-to-host event channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// How long a peer gets to answer our close frame before the socket is dropped.
pub const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Connections beyond this are refused.
    pub max_connections: usize,
    /// Largest inbound WebSocket message, in bytes.
    pub max_message_length: usize,
    /// Outbound frames buffered per client before it is disconnected as too slow.
    pub client_channel_capacity: usize,
}

/// Transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The accept loop has ended.
    #[error("Transport closed")]
    Closed,
}

/// Socket activity reported to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed.
    Connected(ClientId),
    /// Connection closed, for any reason.
    Disconnected(ClientId),
    /// A binary message arrived.
    Received(ClientId, Vec<u8>),
}

/// Handle the transport keeps for each live connection.
struct ClientHandle {
    outbound: mpsc::Sender<Message>,
    kick: Arc<Notify>,
    closing: Arc<Notify>,
}

/// Holds one connection slot until dropped.
struct SlotGuard(Arc<AtomicUsize>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

type Registry = Arc<RwLock<BTreeMap<ClientId, ClientHandle>>>;

/// Listening WebSocket transport.
pub struct Transport {
    local_addr: SocketAddr,
    clients: Registry,
    events_rx: mpsc::Receiver<TransportEvent>,
    shutdown_tx: broadcast::Sender<()>,
    accept_task: JoinHandle<()>,
}

impl Transport {
    /// Bind and start accepting connections.
    pub async fn bind(config: TransportConfig) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, max_connections = config.max_connections, "transport listening");

        let clients: Registry = Arc::new(RwLock::new(BTreeMap::new()));
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown_tx, _) = broadcast::channel(1);

        let accept_task = tokio::spawn(accept_loop(
            listener,
            config,
            clients.clone(),
            events_tx,
            shutdown_tx.clone(),
        ));

        Ok(Self {
            local_addr,
            clients,
            events_rx,
            shutdown_tx,
            accept_task,
        })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the next event. `None` once the transport has shut down.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events_rx.recv().await
    }

    /// Next event, if one is ready.
    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        self.events_rx.try_recv().ok()
    }

    /// Queue `payload` for one client. Unknown clients are ignored.
    pub async fn send(&self, client_id: ClientId, payload: &[u8]) {
        let clients = self.clients.read().await;
        match clients.get(&client_id) {
            Some(handle) => deliver(client_id, handle, Message::Binary(payload.to_vec())),
            None => debug!(%client_id, "send to departed client dropped"),
        }
    }

    /// Queue `payload` for several clients.
    pub async fn broadcast(&self, client_ids: &[ClientId], payload: &[u8]) {
        let clients = self.clients.read().await;
        for client_id in client_ids {
            match clients.get(client_id) {
                Some(handle) => deliver(*client_id, handle, Message::Binary(payload.to_vec())),
                None => debug!(%client_id, "broadcast to departed client dropped"),
            }
        }
    }

    /// Ask every connection to close. Each one reports `Disconnected` when done.
    pub async fn close_all(&self) {
        let clients = self.clients.read().await;
        info!(connections = clients.len(), "closing all connections");
        for (client_id, handle) in clients.iter() {
            deliver(*client_id, handle, Message::Close(None));
            handle.closing.notify_one();
        }
    }

    /// Live connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Stop accepting and drop every connection.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shutdown();
        self.accept_task.abort();
    }
}

/// Hand a frame to the client's writer; kick the client if it has fallen behind.
fn deliver(client_id: ClientId, handle: &ClientHandle, message: Message) {
    match handle.outbound.try_send(message) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(%client_id, "outbound channel full, disconnecting slow client");
            handle.kick.notify_one();
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!(%client_id, "writer already gone");
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    config: TransportConfig,
    clients: Registry,
    events_tx: mpsc::Sender<TransportEvent>,
    shutdown_tx: broadcast::Sender<()>,
) {
    let next_id = AtomicU64::new(1);
    let slots = Arc::new(AtomicUsize::new(0));
    let mut shutdown_rx = shutdown_tx.subscribe();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        // Only this task takes slots, so check-then-add cannot overshoot.
                        let connections = slots.load(Ordering::Acquire);
                        if connections >= config.max_connections {
                            warn!(%addr, connections, "connection limit reached, refusing");
                            continue;
                        }
                        slots.fetch_add(1, Ordering::AcqRel);
                        let slot = SlotGuard(slots.clone());

                        let client_id = ClientId(next_id.fetch_add(1, Ordering::Relaxed));
                        debug!(%client_id, %addr, "new connection");
                        tokio::spawn(serve_connection(
                            stream,
                            client_id,
                            slot,
                            config.clone(),
                            clients.clone(),
                            events_tx.clone(),
                            shutdown_tx.subscribe(),
                        ));
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                debug!("accept loop stopping");
                break;
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    client_id: ClientId,
    _slot: SlotGuard,
    config: TransportConfig,
    clients: Registry,
    events_tx: mpsc::Sender<TransportEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(config.max_message_length);
    ws_config.max_frame_size = Some(config.max_message_length);

    let handshake = tokio::select! {
        result = accept_async_with_config(stream, Some(ws_config)) => result,
        _ = shutdown_rx.recv() => return,
    };
    let ws_stream = match handshake {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%client_id, "WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(config.client_channel_capacity);
    let kick = Arc::new(Notify::new());
    let closing = Arc::new(Notify::new());

    clients.write().await.insert(
        client_id,
        ClientHandle {
            outbound: outbound_tx,
            kick: kick.clone(),
            closing: closing.clone(),
        },
    );
    if events_tx.send(TransportEvent::Connected(client_id)).await.is_err() {
        clients.write().await.remove(&client_id);
        return;
    }

    let mut writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if ws_sender.send(message).await.is_err() || closing {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let mut close_deadline: Option<Instant> = None;
    loop {
        tokio::select! {
            frame = ws_receiver.next() => {
                match frame {
                    Some(Ok(Message::Binary(data))) => {
                        if events_tx.send(TransportEvent::Received(client_id, data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(%client_id, "client closed connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(%client_id, "WebSocket error: {}", e);
                        break;
                    }
                }
            }
            _ = closing.notified(), if close_deadline.is_none() => {
                close_deadline = Some(Instant::now() + CLOSE_HANDSHAKE_TIMEOUT);
            }
            _ = sleep_until(close_deadline.unwrap_or_else(Instant::now)), if close_deadline.is_some() => {
                debug!(%client_id, "close handshake timed out, dropping connection");
                break;
            }
            _ = kick.notified() => break,
            _ = shutdown_rx.recv() => break,
        }
    }

    // Dropping the handle closes the outbound channel and ends the writer,
    // unless it is stuck on a peer that stopped reading.
    clients.write().await.remove(&client_id);
    if timeout(CLOSE_HANDSHAKE_TIMEOUT, &mut writer).await.is_err() {
        debug!(%client_id, "writer stalled, aborting");
        writer.abort();
    }
    let _ = events_tx.send(TransportEvent::Disconnected(client_id)).await;
}
