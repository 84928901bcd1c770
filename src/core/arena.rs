//! Bump Arena
//!
//! Single-region bump allocator with checkpoint/rewind.
//! Owns all working memory of a game session; nothing is freed individually.

use thiserror::Error;

/// Arena errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArenaError {
    /// Not enough free bytes for the request.
    #[error("arena exhausted: requested {requested} bytes, {free} free")]
    OutOfMemory {
        /// Bytes requested.
        requested: usize,
        /// Bytes available.
        free: usize,
    },

    /// Permanent reservation attempted after transient allocations.
    #[error("permanent reservation requires an empty arena ({used} bytes in use)")]
    NotEmpty {
        /// Bytes currently allocated.
        used: usize,
    },
}

/// Saved bump position. Restoring it releases everything allocated since.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a checkpoint that is never rewound leaks arena space"]
pub struct Checkpoint(usize);

/// Bump allocator over a caller-owned byte region.
///
/// Allocations borrow the arena mutably, so a slice handed out can never
/// outlive a later [`Arena::rewind`].
#[derive(Debug)]
pub struct Arena<'m> {
    memory: &'m mut [u8],
    offset: usize,
}

impl<'m> Arena<'m> {
    /// Create an arena over `memory`.
    pub fn new(memory: &'m mut [u8]) -> Self {
        Self { memory, offset: 0 }
    }

    /// Total size of the region.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.memory.len()
    }

    /// Bytes currently allocated (the bump offset).
    #[inline]
    pub fn used(&self) -> usize {
        self.offset
    }

    /// Bytes still available.
    #[inline]
    pub fn free_space(&self) -> usize {
        self.memory.len() - self.offset
    }

    /// Fail unless at least `bytes` are available.
    #[inline]
    pub fn ensure_free(&self, bytes: usize) -> Result<(), ArenaError> {
        if self.free_space() < bytes {
            return Err(ArenaError::OutOfMemory {
                requested: bytes,
                free: self.free_space(),
            });
        }
        Ok(())
    }

    /// Allocate `len` bytes. Contents are whatever the region last held.
    pub fn allocate(&mut self, len: usize) -> Result<&mut [u8], ArenaError> {
        self.ensure_free(len)?;
        let start = self.offset;
        self.offset += len;
        Ok(&mut self.memory[start..self.offset])
    }

    /// Carve `len` bytes off the front of the region for the arena's whole lifetime.
    ///
    /// Only valid while nothing is allocated, i.e. during session setup.
    pub fn reserve(&mut self, len: usize) -> Result<&'m mut [u8], ArenaError> {
        if self.offset != 0 {
            return Err(ArenaError::NotEmpty { used: self.offset });
        }
        self.ensure_free(len)?;
        let memory = std::mem::take(&mut self.memory);
        let (reserved, rest) = memory.split_at_mut(len);
        self.memory = rest;
        Ok(reserved)
    }

    /// Capture the current bump position.
    #[inline]
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.offset)
    }

    /// Release everything allocated after `checkpoint`.
    #[inline]
    pub fn rewind(&mut self, checkpoint: Checkpoint) {
        debug_assert!(checkpoint.0 <= self.offset, "rewind past the bump pointer");
        self.offset = checkpoint.0;
    }

    /// Run `f` between a checkpoint and its rewind.
    ///
    /// Everything `f` allocates is released on return, on both the success
    /// and the error path.
    pub fn scoped<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let checkpoint = self.checkpoint();
        let result = f(self);
        self.rewind(checkpoint);
        result
    }
}
