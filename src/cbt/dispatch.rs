//! Indirect argument math shared between the dispatcher kernel and tests.
//!
//! The dispatcher runs as a single thread, reads the root sum and rewrites
//! both argument sets in place: the workgroup count feeding the subdivision
//! kernel's indirect dispatch, and the draw arguments feeding the terrain
//! draw call.

pub const SUBDIVISION_WORKGROUP_SIZE: u32 = 64;

/// How leaves turn into geometry. Fixed when the terrain is created.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum GeometryMode {
    /// Three vertices per leaf, generated in the vertex shader.
    Direct,
    /// One instance of a fixed meshlet per leaf, subdivided this many times.
    Meshlet { subdivision: u32 },
}

/// Arguments of `dispatch_workgroups_indirect`.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct DispatchArgs {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

/// Arguments of `draw_indirect`.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct DrawArgs {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

/// Arguments of `draw_indexed_indirect`.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct DrawIndexedArgs {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: u32,
    pub first_instance: u32,
}

/// One workgroup per 64 leaves, rounded up.
pub fn subdivision_dispatch_args(leaf_count: u32) -> DispatchArgs {
    DispatchArgs {
        x: leaf_count.div_ceil(SUBDIVISION_WORKGROUP_SIZE),
        y: 1,
        z: 1,
    }
}

pub fn direct_draw_args(leaf_count: u32) -> DrawArgs {
    DrawArgs {
        vertex_count: leaf_count * 3,
        instance_count: 1,
        first_vertex: 0,
        first_instance: 0,
    }
}

pub fn meshlet_draw_args(leaf_count: u32, index_count: u32) -> DrawIndexedArgs {
    DrawIndexedArgs {
        index_count,
        instance_count: leaf_count,
        first_index: 0,
        base_vertex: 0,
        first_instance: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_args_round_up() {
        assert_eq!(subdivision_dispatch_args(1).x, 1);
        assert_eq!(subdivision_dispatch_args(64).x, 1);
        assert_eq!(subdivision_dispatch_args(65).x, 2);
        assert_eq!(subdivision_dispatch_args(64 * 100).x, 100);

        let args = subdivision_dispatch_args(1000);
        assert_eq!((args.y, args.z), (1, 1));
    }

    #[test]
    fn direct_mode_draws_one_triangle_per_leaf() {
        let args = direct_draw_args(67);
        assert_eq!(args.vertex_count, 67 * 3);
        assert_eq!(args.instance_count, 1);
    }

    #[test]
    fn meshlet_mode_draws_one_instance_per_leaf() {
        let args = meshlet_draw_args(67, 384);
        assert_eq!(args.index_count, 384);
        assert_eq!(args.instance_count, 67);
    }
}
