//! Protocol Messages
//!
//! Wire format between the transport, the game loop and clients.
//! Everything is bincode (little-endian, fixed-width integers, `u32` enum
//! tags, `u64` lengths). Inbound payloads decode zero-copy from their record.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::orders::{OrderList, Target, UnitIds};
use crate::game::staging::STAGING_QUEUE_SIZE;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Transport-assigned client identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// LENGTH BOUNDS
// =============================================================================

/// Enum tag plus sequence length in front of an order list.
pub const ORDER_LIST_HEADER_LENGTH: usize = 4 + 8;

/// Worst-case encoded server message.
///
/// The order list is the largest message. Each order re-encodes to its staged
/// record minus the record's length prefix, so the staging capacity bounds it.
pub const NET_MESSAGE_MAX_LENGTH: usize = ORDER_LIST_HEADER_LENGTH + STAGING_QUEUE_SIZE;

/// Worst-case encoded command for a roster of `players`:
/// tag, id count, ids, payload length, payload.
pub const fn net_command_max_length(players: usize) -> usize {
    4 + 8 + 8 * players + 8 + NET_MESSAGE_MAX_LENGTH
}

// =============================================================================
// TRANSPORT -> GAME EVENTS
// =============================================================================

/// Network events delivered to the game loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetEvent<'a> {
    /// A client connected.
    Connect {
        /// New client.
        client_id: ClientId,
    },

    /// A client went away.
    Disconnect {
        /// Departed client.
        client_id: ClientId,
    },

    /// A client sent a message.
    Message {
        /// Sender.
        client_id: ClientId,
        /// Encoded [`ClientMessage`].
        payload: &'a [u8],
    },
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage<'a> {
    /// Acknowledgement; carries no state.
    Reply,

    /// Command some units.
    Order(#[serde(borrow)] OrderRequest<'a>),
}

/// An order as sent by a client, before attribution to a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest<'a> {
    /// Units being commanded.
    #[serde(borrow)]
    pub unit_ids: UnitIds<'a>,
    /// Destination.
    pub target: Target,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerMessage<'a> {
    /// The game is starting.
    Start {
        /// Players in the session.
        player_count: u32,
        /// Recipient's seat.
        your_index: u32,
    },

    /// Every order for one tick. Sent each tick, even when empty.
    OrderList(#[serde(borrow)] OrderList<'a>),
}

// =============================================================================
// GAME -> TRANSPORT COMMANDS
// =============================================================================

/// Commands the game loop hands to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetCommand<'a> {
    /// Deliver a message to one client.
    Send {
        /// Recipient.
        client_id: ClientId,
        /// Encoded [`ServerMessage`].
        payload: &'a [u8],
    },

    /// Deliver the same message to several clients.
    Broadcast {
        /// Recipients.
        client_ids: Cow<'a, [ClientId]>,
        /// Encoded [`ServerMessage`].
        payload: &'a [u8],
    },

    /// Close every connection.
    Shutdown,
}

// =============================================================================
// CODEC
// =============================================================================

/// Codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Encoding or decoding failed, including a too-small output buffer.
    #[error("bincode: {0}")]
    Bincode(#[from] bincode::Error),
}

/// Encode `value` into `buf`, returning the written prefix.
pub fn encode_into<'b, T: Serialize + ?Sized>(value: &T, buf: &'b mut [u8]) -> Result<&'b [u8], CodecError> {
    let capacity = buf.len();
    let mut cursor: &mut [u8] = &mut *buf;
    bincode::serialize_into(&mut cursor, value)?;
    let written = capacity - cursor.len();
    Ok(&buf[..written])
}

/// Encode `value` into a fresh buffer. For transports and clients, not the game loop.
pub fn encode_to_vec<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(bincode::serialize(value)?)
}

/// Decode a value that may borrow from `bytes`.
pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, CodecError> {
    Ok(bincode::deserialize(bytes)?)
}

impl<'a> NetEvent<'a> {
    /// Decode an inbound event record.
    pub fn decode(bytes: &'a [u8]) -> Result<Self, CodecError> {
        decode(bytes)
    }

    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        encode_to_vec(self)
    }
}

impl<'a> ClientMessage<'a> {
    /// Decode a client payload.
    pub fn decode(bytes: &'a [u8]) -> Result<Self, CodecError> {
        decode(bytes)
    }

    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        encode_to_vec(self)
    }
}

impl<'a> ServerMessage<'a> {
    /// Decode a server payload.
    pub fn decode(bytes: &'a [u8]) -> Result<Self, CodecError> {
        decode(bytes)
    }

    /// Encode into `buf`.
    pub fn encode_into<'b>(&self, buf: &'b mut [u8]) -> Result<&'b [u8], CodecError> {
        encode_into(self, buf)
    }
}

impl<'a> NetCommand<'a> {
    /// Decode an outbound command record.
    pub fn decode(bytes: &'a [u8]) -> Result<Self, CodecError> {
        decode(bytes)
    }

    /// Encode into `buf`.
    pub fn encode_into<'b>(&self, buf: &'b mut [u8]) -> Result<&'b [u8], CodecError> {
        encode_into(self, buf)
    }
}
