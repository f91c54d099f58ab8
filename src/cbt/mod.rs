//! The concurrent binary tree backing the adaptive subdivision.

pub mod bit_heap;
pub mod dispatch;
pub mod neighbors;
pub mod reduction;
pub mod tree;

pub use bit_heap::{BitHeap, Node};
pub use tree::CbtTree;

use bevy::render::render_resource::BufferAddress;

/// Size of the GPU heap buffer in bytes, rounded up to the 256-byte
/// alignment required for binding at a dynamic offset.
pub fn buffer_size(max_depth: u32) -> BufferAddress {
    let words = 1u64 << (max_depth - 3);
    (words * 4).next_multiple_of(256)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_size_is_aligned() {
        assert_eq!(buffer_size(10) % 256, 0);
        assert_eq!(buffer_size(20), (1u64 << 17) * 4);
        assert!(buffer_size(6) >= 256);
    }
}
