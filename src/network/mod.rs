//! Network Layer
//!
//! Wire protocol, WebSocket transport and the host loop that drives a session.
//! Only `protocol` is used by the game loop; `transport` and `host` are
//! **non-deterministic** and never touch game state directly.

pub mod host;
pub mod protocol;
pub mod transport;

pub use host::{Host, HostError};
pub use protocol::{
    ClientId, ClientMessage, CodecError, NetCommand, NetEvent, OrderRequest, ServerMessage,
    NET_MESSAGE_MAX_LENGTH,
};
pub use transport::{Transport, TransportConfig, TransportError, TransportEvent};
