//! Longest-edge-bisection neighborhood arithmetic on the square domain.
//!
//! A triangle's same-depth neighborhood is decoded by replaying the node's
//! binary path from one of the two base triangles and transforming the
//! neighbor ids at every bisection. An id of `0` marks a missing neighbor
//! (the edge lies on the domain boundary).

use crate::cbt::bit_heap::Node;

/// Ids of the triangles sharing the node's left edge, right edge and
/// hypotenuse, all at the node's depth.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct SameDepthNeighbors {
    pub left: u32,
    pub right: u32,
    pub edge: u32,
    pub node: u32,
}

/// The pair of same-depth nodes forming the diamond around a node's
/// parent edge. `top == base` when the edge lies on the boundary.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct DiamondParent {
    pub base: Node,
    pub top: Node,
}

/// Pushes a neighborhood one bisection deeper, towards the child selected
/// by `split_bit`.
fn split_neighbor_ids(ids: SameDepthNeighbors, split_bit: u32) -> SameDepthNeighbors {
    let b2 = (ids.right != 0) as u32;
    let b3 = (ids.edge != 0) as u32;

    if split_bit == 0 {
        SameDepthNeighbors {
            left: ids.node << 1 | 1,
            right: ids.edge << 1 | b3,
            edge: ids.right << 1 | b2,
            node: ids.node << 1,
        }
    } else {
        SameDepthNeighbors {
            left: ids.edge << 1,
            right: ids.node << 1,
            edge: ids.left << 1,
            node: ids.node << 1 | 1,
        }
    }
}

fn path_bit(id: u32, bit: u32) -> u32 {
    (id >> bit) & 1
}

/// Decodes the full same-depth neighborhood of a node on the square domain.
pub fn same_depth_neighbors(node: Node) -> SameDepthNeighbors {
    if node.depth == 0 {
        return SameDepthNeighbors {
            left: 0,
            right: 0,
            edge: 0,
            node: 1,
        };
    }

    // The two base triangles of the square share their hypotenuse.
    let b = path_bit(node.id, node.depth - 1);
    let mut ids = SameDepthNeighbors {
        left: 0,
        right: 0,
        edge: 3 - b,
        node: 2 + b,
    };

    for bit in (0..node.depth.saturating_sub(1)).rev() {
        ids = split_neighbor_ids(ids, path_bit(node.id, bit));
    }

    ids
}

/// Id of the triangle across the node's hypotenuse, `0` on the boundary.
pub fn edge_neighbor_id(node: Node) -> u32 {
    same_depth_neighbors(node).edge
}

/// The diamond that must collapse for the node to merge.
pub fn diamond_parent(node: Node) -> DiamondParent {
    let base = node.parent();
    let edge = edge_neighbor_id(base);

    DiamondParent {
        base,
        top: if edge > 0 { Node::from_id(edge) } else { base },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_triangles_share_their_hypotenuse() {
        let a = same_depth_neighbors(Node::from_id(2));
        let b = same_depth_neighbors(Node::from_id(3));

        assert_eq!(a, SameDepthNeighbors { left: 0, right: 0, edge: 3, node: 2 });
        assert_eq!(b, SameDepthNeighbors { left: 0, right: 0, edge: 2, node: 3 });
    }

    #[test]
    fn edge_neighborhood_is_symmetric() {
        // Whenever a neighbor exists, the relation points back.
        for depth in 1..=6 {
            for id in 1u32 << depth..2u32 << depth {
                let edge = edge_neighbor_id(Node::from_id(id));
                if edge > 0 {
                    assert_eq!(edge_neighbor_id(Node::from_id(edge)), id, "id {id:#b}");
                }
            }
        }
    }

    #[test]
    fn depth_two_hypotenuses_lie_on_the_boundary() {
        // The first bisection turns the square's sides into hypotenuses.
        for id in 4u32..8 {
            assert_eq!(edge_neighbor_id(Node::from_id(id)), 0);
        }
    }

    #[test]
    fn neighbors_stay_within_their_level() {
        for depth in 1..=8 {
            for id in 1u32 << depth..2u32 << depth {
                let ids = same_depth_neighbors(Node::from_id(id));
                assert_eq!(ids.node, id);
                for neighbor in [ids.left, ids.right, ids.edge] {
                    if neighbor > 0 {
                        assert_eq!(Node::from_id(neighbor).depth, depth);
                    }
                }
            }
        }
    }

    #[test]
    fn diamond_of_a_boundary_edge_degenerates() {
        // Parent at depth 2 has no edge neighbor, so the diamond folds onto
        // its base.
        let node = Node::from_id(0b1000);
        let diamond = diamond_parent(node);
        assert_eq!(diamond.base, Node::from_id(0b100));
        assert_eq!(diamond.top, diamond.base);
    }

    #[test]
    fn diamond_spans_the_parent_edge() {
        let node = Node::from_id(0b100);
        let diamond = diamond_parent(node);
        assert_eq!(diamond.base, Node::from_id(0b10));
        assert_eq!(diamond.top, Node::from_id(0b11));
    }
}
