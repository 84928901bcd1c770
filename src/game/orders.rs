//! Orders and Order Lists
//!
//! An order is one player's command sending a set of their units to a target.
//! Unit ids travel as packed little-endian `u16`s and are borrowed straight from
//! the record they were decoded from, so relaying an order never allocates.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::chunk_queue::{ChunkIter, Records};
use crate::game::simulation::SimPlayerId;
use crate::network::protocol::{decode, CodecError};

/// Maximum number of units a single order may name.
pub const ORDER_UNITS_MAX: usize = 64;

/// Encoded size of an order without its unit ids:
/// player id (4) + unit byte length (8) + target (8).
pub const ORDER_HEADER_LENGTH: usize = 4 + 8 + 8;

/// Worst-case encoded size of one order.
pub const ORDER_MAX_LENGTH: usize = ORDER_HEADER_LENGTH + 2 * ORDER_UNITS_MAX;

/// World position an order sends units to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    /// X coordinate.
    pub x: i32,
    /// Y coordinate.
    pub y: i32,
}

impl Target {
    /// Create a target.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Borrowed list of 16-bit unit ids, packed little-endian.
#[derive(Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitIds<'a>(&'a [u8]);

impl<'a> UnitIds<'a> {
    /// Wrap packed bytes.
    pub const fn from_bytes(bytes: &'a [u8]) -> Self {
        Self(bytes)
    }

    /// Raw packed bytes.
    pub const fn as_bytes(&self) -> &'a [u8] {
        self.0
    }

    /// Whether the byte length is a whole number of ids.
    #[inline]
    pub fn is_well_formed(&self) -> bool {
        self.0.len() % 2 == 0
    }

    /// Number of unit ids.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len() / 2
    }

    /// Whether no units are named.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over the ids.
    pub fn iter(&self) -> impl Iterator<Item = u16> + 'a {
        self.0
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
    }
}

impl fmt::Debug for UnitIds<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Pack unit ids into their wire form.
///
/// Used by clients and tests building orders; the server only ever borrows.
pub fn pack_unit_ids(ids: &[u16]) -> Vec<u8> {
    ids.iter().flat_map(|id| id.to_le_bytes()).collect()
}

/// A validated order attributed to a simulation player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order<'a> {
    /// Issuing player.
    pub player_id: SimPlayerId,
    /// Units being commanded.
    #[serde(borrow)]
    pub unit_ids: UnitIds<'a>,
    /// Destination.
    pub target: Target,
}

/// The ordered list of all orders for one tick.
///
/// On the server this is a view over the length-prefixed order records drained
/// from the staging queue; decoded from the wire it owns its entries.
#[derive(Clone)]
pub struct OrderList<'a> {
    repr: Repr<'a>,
}

#[derive(Clone)]
enum Repr<'a> {
    Packed(Records<'a>),
    Decoded(Vec<Order<'a>>),
}

impl<'a> OrderList<'a> {
    /// An empty list.
    pub const fn empty() -> Self {
        Self {
            repr: Repr::Packed(Records::empty()),
        }
    }

    /// Wrap order records, checking every record decodes.
    pub fn from_records(records: Records<'a>) -> Result<Self, CodecError> {
        for record in records.iter() {
            decode::<Order<'_>>(record)?;
        }
        Ok(Self {
            repr: Repr::Packed(records),
        })
    }

    /// Build from already decoded orders.
    pub fn from_orders(orders: Vec<Order<'a>>) -> Self {
        Self {
            repr: Repr::Decoded(orders),
        }
    }

    /// Number of orders.
    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Packed(records) => records.count(),
            Repr::Decoded(orders) => orders.len(),
        }
    }

    /// Whether the tick carries no orders.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate in arrival order.
    pub fn iter(&self) -> OrderIter<'a, '_> {
        match &self.repr {
            Repr::Packed(records) => OrderIter::Packed(records.iter()),
            Repr::Decoded(orders) => OrderIter::Decoded(orders.iter()),
        }
    }
}

impl Default for OrderList<'_> {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for OrderList<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl Eq for OrderList<'_> {}

impl fmt::Debug for OrderList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Iterator over an [`OrderList`].
pub enum OrderIter<'a, 'l> {
    /// Decoding packed records.
    Packed(ChunkIter<'a>),
    /// Walking decoded orders.
    Decoded(std::slice::Iter<'l, Order<'a>>),
}

impl<'a> Iterator for OrderIter<'a, '_> {
    type Item = Order<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            // Records were validated in `from_records`.
            OrderIter::Packed(records) => decode(records.next()?).ok(),
            OrderIter::Decoded(orders) => orders.next().copied(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            OrderIter::Packed(records) => records.size_hint(),
            OrderIter::Decoded(orders) => orders.size_hint(),
        }
    }
}

impl ExactSizeIterator for OrderIter<'_, '_> {}

impl Serialize for OrderList<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de: 'a, 'a> Deserialize<'de> for OrderList<'a> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<Order<'a>>::deserialize(deserializer).map(OrderList::from_orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chunk_queue::ChunkQueue;
    use crate::network::protocol::encode_into;

    fn order(player: u32, units: &[u8], x: i32, y: i32) -> Order<'_> {
        Order {
            player_id: SimPlayerId(player),
            unit_ids: UnitIds::from_bytes(units),
            target: Target::new(x, y),
        }
    }

    #[test]
    fn test_unit_ids_iter() {
        let bytes = pack_unit_ids(&[3, 5, 0x1234]);
        let ids = UnitIds::from_bytes(&bytes);

        assert!(ids.is_well_formed());
        assert_eq!(ids.len(), 3);
        assert_eq!(ids.iter().collect::<Vec<_>>(), vec![3, 5, 0x1234]);
    }

    #[test]
    fn test_unit_ids_odd_length_malformed() {
        let ids = UnitIds::from_bytes(&[1, 2, 3]);
        assert!(!ids.is_well_formed());
    }

    #[test]
    fn test_max_order_fits_bound() {
        let bytes = pack_unit_ids(&[7; ORDER_UNITS_MAX]);
        let order = order(1, &bytes, i32::MIN, i32::MAX);

        let mut buf = [0u8; ORDER_MAX_LENGTH];
        let encoded = encode_into(&order, &mut buf).unwrap();
        assert_eq!(encoded.len(), ORDER_MAX_LENGTH);

        let decoded: Order<'_> = decode(encoded).unwrap();
        assert_eq!(decoded, order);
    }

    #[test]
    fn test_packed_list_iterates_in_order() {
        let units_a = pack_unit_ids(&[1, 2]);
        let units_b = pack_unit_ids(&[9]);
        let first = order(0, &units_a, 10, 20);
        let second = order(1, &units_b, -5, 7);

        let mut storage = [0u8; 256];
        let mut queue = ChunkQueue::new(&mut storage);
        let mut scratch = [0u8; ORDER_MAX_LENGTH];
        queue.write(encode_into(&first, &mut scratch).unwrap()).unwrap();
        queue.write(encode_into(&second, &mut scratch).unwrap()).unwrap();

        let list = OrderList::from_records(queue.freeze()).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![first, second]);
    }

    #[test]
    fn test_packed_equals_decoded() {
        let units = pack_unit_ids(&[4]);
        let only = order(2, &units, 0, 0);

        let mut storage = [0u8; 64];
        let mut queue = ChunkQueue::new(&mut storage);
        let mut scratch = [0u8; ORDER_MAX_LENGTH];
        queue.write(encode_into(&only, &mut scratch).unwrap()).unwrap();

        let packed = OrderList::from_records(queue.freeze()).unwrap();
        let decoded = OrderList::from_orders(vec![only]);
        assert_eq!(packed, decoded);
    }

    #[test]
    fn test_corrupt_record_rejected() {
        let mut storage = [0u8; 64];
        let mut queue = ChunkQueue::new(&mut storage);
        queue.write(&[1, 2, 3]).unwrap();

        assert!(OrderList::from_records(queue.freeze()).is_err());
    }

    #[test]
    fn test_empty_list() {
        let list = OrderList::empty();
        assert!(list.is_empty());
        assert_eq!(list.iter().count(), 0);
    }
}
