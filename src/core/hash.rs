//! State Hashing for Lockstep Verification
//!
//! Deterministic SHA-256 hashing of simulation state and tick inputs.
//! Server and clients chain the same hashes, so a mismatch pinpoints the first
//! tick where their simulations diverged.

use sha2::{Digest, Sha256};

/// Hash output type (256 bits / 32 bytes)
pub type StateHash = [u8; 32];

/// Hash of an empty simulation, before the first tick.
pub const GENESIS_HASH: StateHash = [0; 32];

/// Deterministic hasher for simulation state.
///
/// Wraps SHA-256 with little-endian helpers for the primitive types that make
/// up orders. Order of updates is part of the hash.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for one tick of the simulation.
    pub fn for_tick() -> Self {
        Self::new(b"LOCKSTEP_TICK_V1")
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u16 value (little-endian).
    #[inline]
    pub fn update_u16(&mut self, value: u16) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a u64 value (little-endian).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with an i32 value (little-endian).
    #[inline]
    pub fn update_i32(&mut self, value: i32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> StateHash {
        self.hasher.finalize().into()
    }
}

/// Chain a tick onto the previous state hash.
///
/// `add_inputs` feeds the tick's inputs after the previous hash and tick number.
pub fn chain_tick_hash<F>(previous: &StateHash, tick: u64, add_inputs: F) -> StateHash
where
    F: FnOnce(&mut StateHasher),
{
    let mut hasher = StateHasher::for_tick();
    hasher.update_bytes(previous);
    hasher.update_u64(tick);
    add_inputs(&mut hasher);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_hasher_determinism() {
        let make_hash = || {
            let mut hasher = StateHasher::for_tick();
            hasher.update_u32(100);
            hasher.update_u16(7);
            hasher.update_i32(-5);
            hasher.finalize()
        };

        assert_eq!(make_hash(), make_hash());
    }

    #[test]
    fn test_hash_order_matters() {
        let hash1 = {
            let mut h = StateHasher::new(b"test");
            h.update_u32(1);
            h.update_u32(2);
            h.finalize()
        };

        let hash2 = {
            let mut h = StateHasher::new(b"test");
            h.update_u32(2);
            h.update_u32(1);
            h.finalize()
        };

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_chain_depends_on_previous_and_tick() {
        let first = chain_tick_hash(&GENESIS_HASH, 1, |_| {});
        let again = chain_tick_hash(&GENESIS_HASH, 1, |_| {});
        assert_eq!(first, again);

        let other_tick = chain_tick_hash(&GENESIS_HASH, 2, |_| {});
        assert_ne!(first, other_tick);

        let chained = chain_tick_hash(&first, 1, |_| {});
        assert_ne!(first, chained);
    }
}
