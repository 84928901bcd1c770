//! Chunk Queue
//!
//! FIFO of variable-length byte records over a fixed buffer.
//! Each record is stored as a little-endian `u32` length followed by its bytes.

use thiserror::Error;

/// Size of the per-record length prefix.
pub const CHUNK_HEADER_LENGTH: usize = 4;

/// Chunk queue errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The record does not fit in the remaining space.
    #[error("chunk queue full: record of {record} bytes, {free} bytes free")]
    Full {
        /// Record length (without prefix).
        record: usize,
        /// Bytes free at the tail.
        free: usize,
    },
}

/// FIFO of opaque byte records.
///
/// Records are copied in by [`ChunkQueue::write`] and borrowed out by
/// [`ChunkQueue::read`]. When the last record is read both cursors return to
/// the start of the buffer, so a queue that is regularly drained never fills up.
#[derive(Debug)]
pub struct ChunkQueue<'b> {
    storage: &'b mut [u8],
    read_pos: usize,
    write_pos: usize,
    count: usize,
}

impl<'b> ChunkQueue<'b> {
    /// Create an empty queue over `storage`.
    pub fn new(storage: &'b mut [u8]) -> Self {
        Self {
            storage,
            read_pos: 0,
            write_pos: 0,
            count: 0,
        }
    }

    /// Number of records waiting.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Whether no records are waiting.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Bytes available for new records (prefixes included).
    #[inline]
    pub fn free_space(&self) -> usize {
        self.storage.len() - self.write_pos
    }

    /// Total buffer size.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Append a record.
    pub fn write(&mut self, record: &[u8]) -> Result<(), QueueError> {
        let needed = CHUNK_HEADER_LENGTH + record.len();
        if needed > self.free_space() || u32::try_from(record.len()).is_err() {
            return Err(QueueError::Full {
                record: record.len(),
                free: self.free_space(),
            });
        }

        let start = self.write_pos;
        let body = start + CHUNK_HEADER_LENGTH;
        self.storage[start..body].copy_from_slice(&(record.len() as u32).to_le_bytes());
        self.storage[body..body + record.len()].copy_from_slice(record);
        self.write_pos = body + record.len();
        self.count += 1;
        Ok(())
    }

    /// Pop the oldest record. `None` when the queue is empty.
    pub fn read(&mut self) -> Option<&[u8]> {
        if self.count == 0 {
            return None;
        }

        let start = self.read_pos;
        let length = read_length(&self.storage[start..]);
        let body = start + CHUNK_HEADER_LENGTH;
        self.count -= 1;

        if self.count == 0 {
            // The popped bytes stay valid until the next write.
            self.read_pos = 0;
            self.write_pos = 0;
        } else {
            self.read_pos = body + length;
        }

        Some(&self.storage[body..body + length])
    }

    /// Drop all records.
    pub fn reset(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
        self.count = 0;
    }

    /// Bytes taken by waiting records (prefixes included).
    #[inline]
    pub fn used_bytes(&self) -> usize {
        self.write_pos - self.read_pos
    }

    /// Visit waiting records oldest-first without consuming them.
    pub fn iter(&self) -> ChunkIter<'_> {
        ChunkIter {
            bytes: &self.storage[self.read_pos..self.write_pos],
            remaining: self.count,
        }
    }

    /// Turn the queue into a read-only view of its waiting records.
    pub fn freeze(self) -> Records<'b> {
        let storage: &'b [u8] = self.storage;
        Records {
            bytes: &storage[self.read_pos..self.write_pos],
            count: self.count,
        }
    }
}

/// Read-only run of length-prefixed records, as laid out by [`ChunkQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Records<'a> {
    bytes: &'a [u8],
    count: usize,
}

impl<'a> Records<'a> {
    /// No records.
    pub const fn empty() -> Self {
        Self { bytes: &[], count: 0 }
    }

    /// Number of records.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Raw bytes, prefixes included.
    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Iterate oldest-first.
    pub fn iter(&self) -> ChunkIter<'a> {
        ChunkIter {
            bytes: self.bytes,
            remaining: self.count,
        }
    }
}

/// Non-consuming iterator over queued records.
#[derive(Debug, Clone)]
pub struct ChunkIter<'q> {
    bytes: &'q [u8],
    remaining: usize,
}

impl<'q> Iterator for ChunkIter<'q> {
    type Item = &'q [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let length = read_length(self.bytes);
        let (record, rest) = self.bytes[CHUNK_HEADER_LENGTH..].split_at(length);
        self.bytes = rest;
        self.remaining -= 1;
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for ChunkIter<'_> {}

#[inline]
fn read_length(bytes: &[u8]) -> usize {
    let mut prefix = [0u8; CHUNK_HEADER_LENGTH];
    prefix.copy_from_slice(&bytes[..CHUNK_HEADER_LENGTH]);
    u32::from_le_bytes(prefix) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut storage = [0u8; 64];
        let mut queue = ChunkQueue::new(&mut storage);

        queue.write(b"first").unwrap();
        queue.write(b"second").unwrap();
        queue.write(b"").unwrap();
        assert_eq!(queue.count(), 3);

        assert_eq!(queue.read(), Some(&b"first"[..]));
        assert_eq!(queue.read(), Some(&b"second"[..]));
        assert_eq!(queue.read(), Some(&b""[..]));
        assert_eq!(queue.read(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_full_queue_rejects_record() {
        let mut storage = [0u8; 12];
        let mut queue = ChunkQueue::new(&mut storage);

        queue.write(b"abcd").unwrap();
        let err = queue.write(b"x").unwrap_err();
        assert_eq!(err, QueueError::Full { record: 1, free: 4 });
        assert_eq!(queue.count(), 1);
    }

    #[test]
    fn test_drained_queue_reuses_space() {
        let mut storage = [0u8; 12];
        let mut queue = ChunkQueue::new(&mut storage);

        for round in 0..10u8 {
            queue.write(&[round; 8]).unwrap();
            assert_eq!(queue.read(), Some(&[round; 8][..]));
        }
        assert_eq!(queue.free_space(), 12);
    }

    #[test]
    fn test_reset() {
        let mut storage = [0u8; 32];
        let mut queue = ChunkQueue::new(&mut storage);

        queue.write(b"a").unwrap();
        queue.write(b"b").unwrap();
        queue.reset();

        assert_eq!(queue.count(), 0);
        assert_eq!(queue.read(), None);
        assert_eq!(queue.free_space(), 32);
    }

    #[test]
    fn test_iter_does_not_consume() {
        let mut storage = [0u8; 64];
        let mut queue = ChunkQueue::new(&mut storage);

        queue.write(b"one").unwrap();
        queue.write(b"two").unwrap();
        queue.read();
        queue.write(b"three").unwrap();

        let records: Vec<&[u8]> = queue.iter().collect();
        assert_eq!(records, vec![&b"two"[..], &b"three"[..]]);
        assert_eq!(queue.count(), 2);
        assert_eq!(queue.used_bytes(), 16);
    }

    #[test]
    fn test_freeze_keeps_waiting_records() {
        let mut storage = [0u8; 64];
        let mut queue = ChunkQueue::new(&mut storage);

        queue.write(b"gone").unwrap();
        queue.write(b"kept").unwrap();
        queue.read();

        let records = queue.freeze();
        assert_eq!(records.count(), 1);
        assert_eq!(records.iter().collect::<Vec<_>>(), vec![&b"kept"[..]]);
    }
}
