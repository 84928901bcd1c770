//! Order Staging Queue
//!
//! Accumulates orders between tick boundaries in arrival order.
//! Append-only until the tick drains it, then reset.

use crate::core::arena::Arena;
use crate::core::chunk_queue::{ChunkQueue, QueueError};
use crate::game::orders::{Order, OrderList, ORDER_MAX_LENGTH};
use crate::game::GameError;
use crate::network::protocol::encode_into;

/// Storage reserved for staged orders.
pub const STAGING_QUEUE_SIZE: usize = 20 * 1024;

/// Outcome of staging an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staged {
    /// Queued for the next tick.
    Queued,
    /// No room left this tick; the order was dropped.
    Full,
}

/// Per-tick accumulator of encoded orders.
#[derive(Debug)]
pub struct OrderStaging<'m> {
    queue: ChunkQueue<'m>,
}

impl<'m> OrderStaging<'m> {
    /// Stage into `storage`.
    pub fn new(storage: &'m mut [u8]) -> Self {
        Self {
            queue: ChunkQueue::new(storage),
        }
    }

    /// Orders waiting for the next tick.
    #[inline]
    pub fn len(&self) -> usize {
        self.queue.count()
    }

    /// Whether nothing is staged.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Bytes a drain will need.
    #[inline]
    pub fn used_bytes(&self) -> usize {
        self.queue.used_bytes()
    }

    /// Encode `order` through arena scratch and append it.
    pub fn stage(&mut self, order: &Order<'_>, arena: &mut Arena<'_>) -> Result<Staged, GameError> {
        arena.scoped(|arena| -> Result<Staged, GameError> {
            arena.ensure_free(ORDER_MAX_LENGTH)?;
            let scratch = arena.allocate(ORDER_MAX_LENGTH)?;
            let record = encode_into(order, scratch)?;
            match self.queue.write(record) {
                Ok(()) => Ok(Staged::Queued),
                Err(QueueError::Full { .. }) => Ok(Staged::Full),
            }
        })
    }

    /// Move every staged order, oldest first, into `frame`.
    ///
    /// `frame` must hold at least [`OrderStaging::used_bytes`] bytes. The count
    /// is taken up front; nothing is staged while draining.
    pub fn drain_into<'f>(&mut self, frame: &'f mut [u8]) -> Result<OrderList<'f>, GameError> {
        let count = self.queue.count();
        let mut packed = ChunkQueue::new(frame);
        for _ in 0..count {
            if let Some(record) = self.queue.read() {
                packed.write(record)?;
            }
        }
        Ok(OrderList::from_records(packed.freeze())?)
    }

    /// Drop everything staged.
    pub fn reset(&mut self) {
        self.queue.reset();
    }
}
