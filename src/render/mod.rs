//! GPU side of the adaptive subdivision pipeline.
//!
//! Every frame a short compute pass refines the concurrent binary tree in
//! place: a single-thread dispatcher derives the indirect arguments from the
//! current leaf count, the subdivision kernel splits and merges leaves
//! against the view, and the sum reduction rebuilds the interior of the tree
//! bottom up. The terrain is then drawn with one indirect draw call decoding
//! the leaves in the vertex shader.

use bevy::render::render_resource::BufferAddress;

pub mod compute_pipelines;
pub mod render_pipeline;
pub mod terrain_bind_group;
pub mod terrain_pass;
pub mod terrain_view_bind_group;

pub use terrain_bind_group::GpuTerrain;
pub use terrain_view_bind_group::GpuTerrainView;

/// Three dispatch words, one padding word, five draw words, padded out to
/// a multiple of 16.
pub(crate) const INDIRECT_BUFFER_SIZE: BufferAddress = 12 * 4;

/// Byte offset of the draw arguments within the indirect buffer.
pub(crate) const DRAW_INDIRECT_OFFSET: BufferAddress = 4 * 4;

/// One reduction depth value per 256 bytes, bindable at a dynamic offset.
pub(crate) const REDUCTION_DEPTH_STRIDE: u32 = 256;
