//! CPU mirror of the concurrent binary tree.
//!
//! The GPU owns the tree during steady state; this type exists to seed the
//! initial subdivision before upload, and to exercise the exact same split,
//! merge and reduction rules in tests and tooling.

use crate::cbt::{
    bit_heap::{BitHeap, Node},
    neighbors::{diamond_parent, edge_neighbor_id},
};

pub struct CbtTree {
    heap: BitHeap,
}

impl CbtTree {
    /// Seeds `2^init_depth` uniform leaves and reduces, so the sums are
    /// valid before the first frame touches the tree.
    pub fn new(max_depth: u32, init_depth: u32) -> Self {
        assert!(init_depth <= max_depth, "seed depth exceeds tree depth");

        let mut tree = Self {
            heap: BitHeap::new(max_depth),
        };

        for id in 1 << init_depth..2 << init_depth {
            tree.heap.bitfield_set(Node {
                id,
                depth: init_depth,
            });
        }
        tree.reduce();

        tree
    }

    pub fn max_depth(&self) -> u32 {
        self.heap.max_depth()
    }

    pub fn heap(&self) -> &BitHeap {
        &self.heap
    }

    /// Raw heap words, in upload order.
    pub fn words(&self) -> &[u32] {
        self.heap.words()
    }

    pub fn leaf_count(&self) -> u32 {
        self.heap.read(Node::root())
    }

    /// Recomputes every interior sum from the bitfield, level by level from
    /// the bottom. The deepest level is the bitfield itself and needs no
    /// pass.
    pub fn reduce(&mut self) {
        for depth in (0..self.max_depth()).rev() {
            for id in 1 << depth..2 << depth {
                let node = Node { id, depth };
                let sum = self.heap.read(node.left_child()) + self.heap.read(node.right_child());
                self.heap.write(node, sum);
            }
        }
    }

    /// A leaf is the shallowest node whose subtree holds exactly one set bit.
    pub fn is_leaf(&self, node: Node) -> bool {
        self.heap.read(node) == 1 && (node.is_root() || self.heap.read(node.parent()) != 1)
    }

    /// Walks the sums down to the `leaf_index`-th leaf, left to right.
    pub fn decode_leaf(&self, mut leaf_index: u32) -> Node {
        debug_assert!(leaf_index < self.leaf_count());

        let mut node = Node::root();
        while self.heap.read(node) > 1 {
            let left = node.left_child();
            let left_sum = self.heap.read(left);
            if leaf_index < left_sum {
                node = left;
            } else {
                leaf_index -= left_sum;
                node = node.right_child();
            }
        }

        node
    }

    pub fn leaves(&self) -> impl Iterator<Item = Node> + '_ {
        (0..self.leaf_count()).map(|index| self.decode_leaf(index))
    }

    /// Splits one node without restoring conformity. Setting the bit of the
    /// right child's leftmost descendant turns the node's subtree sum from 1
    /// into 2. A no-op at the depth ceiling.
    pub fn split(&mut self, node: Node) {
        if node.depth >= self.max_depth() {
            return;
        }

        self.heap
            .bitfield_set(node.right_child().leftmost_descendant_at(self.max_depth()));
    }

    /// Merges one node with its sibling by clearing the right sibling's bit.
    /// A no-op at the root.
    pub fn merge(&mut self, node: Node) {
        if node.is_root() {
            return;
        }

        self.heap
            .bitfield_clear(node.right_sibling().leftmost_descendant_at(self.max_depth()));
    }

    /// Splits a node and cascades along hypotenuse neighbors so that no
    /// T-junction survives. Mirrors the split kernel.
    pub fn split_conforming(&mut self, node: Node) {
        if node.depth >= self.max_depth() {
            return;
        }

        self.split(node);

        let mut id = edge_neighbor_id(node);
        while id > 1 {
            let mut current = Node::from_id(id);
            self.split(current);
            current = current.parent();
            self.split(current);
            id = edge_neighbor_id(current);
        }
    }

    /// Merges a node only when its whole parent diamond has collapsed to
    /// leaves, which keeps the merge crack free. Mirrors the merge kernel.
    pub fn merge_conforming(&mut self, node: Node) {
        if node.is_root() {
            return;
        }

        let diamond = diamond_parent(node);
        if self.heap.read(diamond.base) <= 2 && self.heap.read(diamond.top) <= 2 {
            self.merge(node);
            self.merge(diamond.top.right_child());
        }
    }

    /// Checks the structural invariant: every interior sum matches its
    /// children, and the root matches the bitfield population count.
    pub fn validate(&self) -> bool {
        for depth in 0..self.max_depth() {
            for id in 1 << depth..2 << depth {
                let node = Node { id, depth };
                if self.heap.read(node)
                    != self.heap.read(node.left_child()) + self.heap.read(node.right_child())
                {
                    return false;
                }
            }
        }

        let bitfield_first_word = 3 * self.heap.words().len() / 4;
        let popcount: u32 = self.heap.words()[bitfield_first_word..]
            .iter()
            .map(|word| word.count_ones())
            .sum();

        self.leaf_count() == popcount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn seeding_produces_a_uniform_reduced_tree() {
        let tree = CbtTree::new(10, 6);

        assert_eq!(tree.leaf_count(), 64);
        assert!(tree.validate());

        for leaf in tree.leaves().collect::<Vec<_>>() {
            assert_eq!(leaf.depth, 6);
            assert!(tree.is_leaf(leaf));
        }
    }

    #[test]
    fn decode_enumerates_leaves_left_to_right() {
        let tree = CbtTree::new(8, 3);
        let leaves: Vec<Node> = tree.leaves().collect();

        assert_eq!(leaves.len(), 8);
        for pair in leaves.windows(2) {
            assert!(pair[0].id < pair[1].id);
        }
    }

    #[test]
    fn split_increments_root_by_one() {
        let mut tree = CbtTree::new(10, 6);
        let leaf = tree.decode_leaf(20);

        // Siblings of the ancestor chain sit outside the affected subtrees.
        let off_chain: Vec<Node> = (1..=6)
            .map(|depth| Node::from_id((leaf.id >> (6 - depth)) ^ 1))
            .collect();
        let before: Vec<u32> = off_chain.iter().map(|&node| tree.heap().read(node)).collect();

        tree.split(leaf);
        tree.reduce();

        assert_eq!(tree.leaf_count(), 65);
        assert!(tree.validate());

        for (&node, &sum) in off_chain.iter().zip(&before) {
            assert_eq!(tree.heap().read(node), sum);
        }
    }

    #[test]
    fn merge_decrements_root_by_one() {
        let mut tree = CbtTree::new(10, 6);
        let leaf = tree.decode_leaf(20);

        tree.split(leaf);
        tree.reduce();
        assert_eq!(tree.leaf_count(), 65);

        tree.merge(leaf.left_child());
        tree.reduce();

        assert_eq!(tree.leaf_count(), 64);
        assert!(tree.validate());
    }

    #[test]
    fn boundary_split_and_merge_are_no_ops() {
        let mut tree = CbtTree::new(6, 6);
        let words = tree.words().to_vec();

        // Every leaf sits at the depth ceiling; splits must not move.
        for leaf in tree.leaves().collect::<Vec<_>>() {
            tree.split(leaf);
            tree.split_conforming(leaf);
        }
        assert_eq!(tree.words(), &words[..]);

        // The root can never merge.
        let mut tree = CbtTree::new(6, 0);
        let words = tree.words().to_vec();
        tree.merge(Node::root());
        tree.merge_conforming(Node::root());
        assert_eq!(tree.words(), &words[..]);
    }

    #[test]
    fn conforming_split_leaves_no_t_junction() {
        let mut tree = CbtTree::new(12, 4);
        let leaf = tree.decode_leaf(5);

        tree.split_conforming(leaf);
        tree.reduce();

        assert!(tree.validate());

        // Across every interior hypotenuse, adjacent leaves differ by at
        // most one level.
        for leaf in tree.leaves().collect::<Vec<_>>() {
            let edge = edge_neighbor_id(leaf);
            if edge > 0 {
                let neighbor = Node::from_id(edge);
                let sum = tree.heap().read(neighbor);
                assert!(sum <= 2, "leaf {:#b} faces a finer region", leaf.id);
            }
        }
    }

    #[test]
    fn random_split_merge_storm_keeps_the_invariant() {
        let mut tree = CbtTree::new(12, 5);
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..200 {
            let leaf = tree.decode_leaf(rng.random_range(0..tree.leaf_count()));
            if rng.random_bool(0.6) {
                tree.split_conforming(leaf);
            } else {
                tree.merge_conforming(leaf);
            }
            tree.reduce();
            assert!(tree.validate());
        }
    }

    #[test]
    fn subdivision_round_trip_restores_the_seed_count() {
        let mut tree = CbtTree::new(10, 6);
        assert_eq!(tree.leaf_count(), 64);

        // Pick three leaves whose hypotenuse lies on the domain boundary, so
        // each conforming split stands alone.
        let flagged: Vec<Node> = tree
            .leaves()
            .filter(|&leaf| edge_neighbor_id(leaf) == 0)
            .take(3)
            .collect();
        assert_eq!(flagged.len(), 3);

        for &leaf in &flagged {
            tree.split_conforming(leaf);
        }
        tree.reduce();
        assert_eq!(tree.leaf_count(), 67);
        assert!(tree.validate());

        for &leaf in &flagged {
            tree.merge_conforming(leaf.left_child());
        }
        tree.reduce();
        assert_eq!(tree.leaf_count(), 64);
        assert!(tree.validate());
    }
}
