//! Host Configuration
//!
//! Everything the binary needs to stand up a session: listener, buffer sizes,
//! logging and the core's [`GameConfig`]. Loaded from JSON; every field has a
//! default so a partial file is fine.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::chunk_queue::CHUNK_HEADER_LENGTH;
use crate::game::GameConfig;
use crate::network::protocol::net_command_max_length;
use crate::network::transport::TransportConfig;
use crate::PLAYERS_MAX;

/// Tag, client id and payload length in front of a message event's payload.
pub const EVENT_RECORD_OVERHEAD: usize = CHUNK_HEADER_LENGTH + 4 + 8 + 8;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid configuration JSON.
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// Values that cannot work together.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Host configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Connections the transport accepts at once.
    pub max_connections: usize,
    /// Largest inbound WebSocket message.
    pub max_message_length: usize,
    /// Game memory region; `None` sizes it to what the session needs.
    pub memory_size: Option<usize>,
    /// Inbound event queue capacity.
    pub event_queue_size: usize,
    /// Outbound command queue capacity.
    pub command_queue_size: usize,
    /// Outbound frames buffered per client.
    pub client_channel_capacity: usize,
    /// `tracing` filter directive, used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Core tunables.
    pub game: GameConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: PLAYERS_MAX,
            max_message_length: 4096,
            memory_size: None,
            event_queue_size: 64 * 1024,
            command_queue_size: 64 * 1024,
            client_channel_capacity: 64,
            log_filter: "info".to_string(),
            game: GameConfig::default(),
        }
    }
}

impl HostConfig {
    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parse from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check that the buffers can carry a session of `players`.
    pub fn validate_for(&self, players: usize) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections must be at least 1".into()));
        }
        if self.client_channel_capacity == 0 {
            return Err(ConfigError::Invalid("client_channel_capacity must be at least 1".into()));
        }

        let event_needed = self.max_message_length + EVENT_RECORD_OVERHEAD;
        if self.event_queue_size < event_needed {
            return Err(ConfigError::Invalid(format!(
                "event_queue_size {} cannot hold one {}-byte message ({} bytes needed)",
                self.event_queue_size, self.max_message_length, event_needed
            )));
        }

        let command_needed = CHUNK_HEADER_LENGTH + net_command_max_length(players);
        if self.command_queue_size < command_needed {
            return Err(ConfigError::Invalid(format!(
                "command_queue_size {} cannot hold a broadcast to {} players ({} bytes needed)",
                self.command_queue_size, players, command_needed
            )));
        }
        Ok(())
    }

    /// Check against the default roster size.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_for(PLAYERS_MAX)
    }

    /// Transport settings.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            bind_addr: self.bind_addr,
            max_connections: self.max_connections,
            max_message_length: self.max_message_length,
            client_channel_capacity: self.client_channel_capacity,
        }
    }
}
