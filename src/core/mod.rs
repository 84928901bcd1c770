//! Core memory and hashing primitives.
//!
//! Everything the game loop needs to run without touching the heap:
//! a bump arena, byte-record queues over fixed buffers, and deterministic hashing.

pub mod arena;
pub mod chunk_queue;
pub mod hash;

// Re-export core types
pub use arena::{Arena, ArenaError, Checkpoint};
pub use chunk_queue::{ChunkIter, ChunkQueue, QueueError, Records, CHUNK_HEADER_LENGTH};
pub use hash::{StateHash, StateHasher, GENESIS_HASH};
