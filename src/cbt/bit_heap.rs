//! Bit-packed sum-reduction heap of the concurrent binary tree.
//!
//! The heap stores one counter per tree node, packed back to back with a
//! per-level bit width of `max_depth - depth + 1`. The deepest level is one
//! bit wide and doubles as the leaf bitfield. All together the heap occupies
//! exactly `2^(max_depth + 2)` bits.

/// A tree node, identified by its heap index.
///
/// The root has id 1. Ids at depth `d` lie in `[2^d, 2^(d+1))`, so the id
/// encodes the binary path from the root and the depth is recoverable from
/// the position of the most significant bit.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Node {
    pub id: u32,
    pub depth: u32,
}

impl Node {
    pub fn root() -> Self {
        Self { id: 1, depth: 0 }
    }

    /// Recovers the depth from the id's most significant bit.
    pub fn from_id(id: u32) -> Self {
        debug_assert!(id > 0);

        Self {
            id,
            depth: 31 - id.leading_zeros(),
        }
    }

    pub fn is_root(self) -> bool {
        self.id == 1
    }

    pub fn left_child(self) -> Self {
        Self {
            id: self.id << 1,
            depth: self.depth + 1,
        }
    }

    pub fn right_child(self) -> Self {
        Self {
            id: self.id << 1 | 1,
            depth: self.depth + 1,
        }
    }

    pub fn parent(self) -> Self {
        Self {
            id: self.id >> 1,
            depth: self.depth - 1,
        }
    }

    pub fn sibling(self) -> Self {
        Self {
            id: self.id ^ 1,
            depth: self.depth,
        }
    }

    pub fn right_sibling(self) -> Self {
        Self {
            id: self.id | 1,
            depth: self.depth,
        }
    }

    pub fn leftmost_descendant_at(self, depth: u32) -> Self {
        debug_assert!(depth >= self.depth);

        Self {
            id: self.id << (depth - self.depth),
            depth,
        }
    }
}

/// The packed heap. Word `0` holds the shallow levels, the bitfield occupies
/// the last quarter of the allocation.
#[derive(Clone)]
pub struct BitHeap {
    words: Vec<u32>,
    max_depth: u32,
}

fn field_mask(width: u32) -> u32 {
    if width == 32 {
        u32::MAX
    } else {
        (1 << width) - 1
    }
}

impl BitHeap {
    /// The depth bounds follow from the reduction prepass (5 levels minimum)
    /// and from the root counter having to fit a `u32`.
    pub const MIN_MAX_DEPTH: u32 = 5;
    pub const MAX_MAX_DEPTH: u32 = 28;

    pub fn new(max_depth: u32) -> Self {
        assert!(
            (Self::MIN_MAX_DEPTH..=Self::MAX_MAX_DEPTH).contains(&max_depth),
            "unsupported tree depth: {max_depth}"
        );

        Self {
            words: vec![0; 1 << (max_depth - 3)],
            max_depth,
        }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Total heap size in bits.
    pub fn bit_count(&self) -> u32 {
        1 << (self.max_depth + 2)
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// First bit of the node's packed counter.
    fn bit_id(&self, node: Node) -> u32 {
        debug_assert!(node.depth <= self.max_depth);
        debug_assert!(node.id >= 1 << node.depth && node.id < 2 << node.depth);

        (2 << node.depth) + node.id * (1 + self.max_depth - node.depth)
    }

    /// Width of a counter at the given depth.
    fn bit_width(&self, depth: u32) -> u32 {
        1 + self.max_depth - depth
    }

    /// First bitfield bit covered by the node's leaf-depth descendants.
    fn bitfield_bit_id(&self, node: Node) -> u32 {
        (2 << self.max_depth) + (node.id << (self.max_depth - node.depth))
    }

    fn read_bits(&self, first: u32, width: u32) -> u32 {
        let word = (first >> 5) as usize;
        let offset = first & 31;
        let low_width = u32::min(width, 32 - offset);

        let mut value = (self.words[word] >> offset) & field_mask(low_width);

        // The field straddles into the next word.
        if low_width < width {
            let high = self.words[word + 1] & field_mask(width - low_width);
            value |= high << low_width;
        }

        value
    }

    fn write_bits(&mut self, first: u32, width: u32, value: u32) {
        debug_assert!(width == 32 || value < 1 << width);

        let word = (first >> 5) as usize;
        let offset = first & 31;
        let low_width = u32::min(width, 32 - offset);

        self.words[word] &= !(field_mask(low_width) << offset);
        self.words[word] |= (value & field_mask(low_width)) << offset;

        if low_width < width {
            let high_width = width - low_width;
            self.words[word + 1] &= !field_mask(high_width);
            self.words[word + 1] |= value >> low_width;
        }
    }

    /// Reads the node's sum counter.
    pub fn read(&self, node: Node) -> u32 {
        self.read_bits(self.bit_id(node), self.bit_width(node.depth))
    }

    /// Writes the node's sum counter.
    pub fn write(&mut self, node: Node, value: u32) {
        self.write_bits(self.bit_id(node), self.bit_width(node.depth), value);
    }

    /// Tests the single bitfield bit of the node's leftmost leaf-depth
    /// descendant.
    pub fn bitfield_get(&self, node: Node) -> bool {
        self.read_bits(self.bitfield_bit_id(node), 1) == 1
    }

    pub fn bitfield_set(&mut self, node: Node) {
        self.write_bits(self.bitfield_bit_id(node), 1, 1);
    }

    pub fn bitfield_clear(&mut self, node: Node) {
        self.write_bits(self.bitfield_bit_id(node), 1, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn node_arithmetic() {
        let node = Node::from_id(0b1011);
        assert_eq!(node.depth, 3);
        assert_eq!(node.parent().id, 0b101);
        assert_eq!(node.sibling().id, 0b1010);
        assert_eq!(node.right_sibling().id, 0b1011);
        assert_eq!(node.left_child().id, 0b10110);
        assert_eq!(node.right_child().id, 0b10111);
        assert_eq!(node.leftmost_descendant_at(6).id, 0b1011000);
        assert!(Node::root().is_root());
    }

    #[test]
    fn heap_occupies_expected_bit_range() {
        let heap = BitHeap::new(10);
        assert_eq!(heap.words().len(), 1 << 7);
        assert_eq!(heap.bit_count(), 1 << 12);

        // The last bitfield bit lands exactly on the last heap bit.
        let last = Node {
            id: (2 << 10) - 1,
            depth: 10,
        };
        assert_eq!(heap.bit_id(last), heap.bit_count() - 1);
    }

    #[test]
    fn round_trip_at_every_level() {
        let max_depth = 20;
        let mut heap = BitHeap::new(max_depth);
        let mut rng = StdRng::seed_from_u64(7);

        for depth in 0..=max_depth {
            for _ in 0..64 {
                let id = (1 << depth) + rng.random_range(0..1u32 << depth);
                let node = Node { id, depth };
                let value = rng.random_range(0..1u64 << heap.bit_width(depth)) as u32;

                heap.write(node, value);
                assert_eq!(heap.read(node), value, "depth {depth} id {id}");
            }
        }
    }

    #[test]
    fn straddling_fields_round_trip() {
        // At max_depth 20 the depth 16 counters are 5 bits wide and march
        // across word boundaries every few nodes.
        let max_depth = 20;
        let mut heap = BitHeap::new(max_depth);
        let depth = 16;

        let nodes: Vec<Node> = (0..1u32 << depth)
            .map(|i| Node {
                id: (1 << depth) + i,
                depth,
            })
            .collect();

        for (i, &node) in nodes.iter().enumerate() {
            heap.write(node, (i % 31 + 1) as u32);
        }
        for (i, &node) in nodes.iter().enumerate() {
            assert_eq!(heap.read(node), (i % 31 + 1) as u32);
        }
    }

    #[test]
    fn writes_leave_neighboring_fields_intact() {
        let max_depth = 20;
        let mut heap = BitHeap::new(max_depth);
        let depth = 12;
        let width = heap.bit_width(depth);

        let node = |i: u32| Node {
            id: (1 << depth) + i,
            depth,
        };

        heap.write(node(100), field_mask(width));
        heap.write(node(102), field_mask(width));
        heap.write(node(101), 0);

        assert_eq!(heap.read(node(100)), field_mask(width));
        assert_eq!(heap.read(node(101)), 0);
        assert_eq!(heap.read(node(102)), field_mask(width));
    }

    #[test]
    fn bitfield_matches_deepest_level() {
        let max_depth = 10;
        let mut heap = BitHeap::new(max_depth);

        let leaf = Node {
            id: (1 << max_depth) + 37,
            depth: max_depth,
        };
        heap.bitfield_set(leaf);

        assert!(heap.bitfield_get(leaf));
        assert_eq!(heap.read(leaf), 1);

        // An ancestor addresses the same bit through its leftmost descendant.
        let ancestor = Node {
            id: leaf.id >> 3,
            depth: max_depth - 3,
        };
        assert!(!heap.bitfield_get(ancestor));

        heap.bitfield_clear(leaf);
        assert!(!heap.bitfield_get(leaf));
        assert_eq!(heap.read(leaf), 0);
    }
}
