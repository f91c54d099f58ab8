use crate::{
    cbt::dispatch::GeometryMode,
    meshlet,
    terrain::{Terrain, TerrainComponents, TerrainConfig},
    util::GpuBuffer,
};
use bevy::{
    prelude::*,
    render::{
        render_resource::{binding_types::*, *},
        renderer::RenderDevice,
        Extract,
    },
};

/// Layout of the bind group shared by all compute kernels. The heap is
/// writable, the subdivision kernel mutates the bitfield and the reduction
/// rewrites the sums.
pub(crate) fn create_terrain_compute_layout(device: &RenderDevice) -> BindGroupLayout {
    device.create_bind_group_layout(
        None,
        &BindGroupLayoutEntries::sequential(
            ShaderStages::COMPUTE,
            (
                storage_buffer_sized(false, None),             // cbt heap
                uniform_buffer::<TerrainConfigUniform>(false), // terrain config
            ),
        ),
    )
}

/// The same buffers for the draw path, with the heap bound read-only to
/// match the shader's access mode.
pub(crate) fn create_terrain_render_layout(device: &RenderDevice) -> BindGroupLayout {
    device.create_bind_group_layout(
        None,
        &BindGroupLayoutEntries::sequential(
            ShaderStages::VERTEX,
            (
                storage_buffer_read_only_sized(false, None),   // cbt heap
                uniform_buffer::<TerrainConfigUniform>(false), // terrain config
            ),
        ),
    )
}

/// The terrain config data that is available in shaders.
#[derive(Default, ShaderType)]
pub(crate) struct TerrainConfigUniform {
    max_depth: u32,
    min_depth: u32,
    side_length: f32,
    height_scale: f32,
}

impl From<&TerrainConfig> for TerrainConfigUniform {
    fn from(config: &TerrainConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            min_depth: config.min_depth,
            side_length: config.side_length,
            height_scale: config.height_scale,
        }
    }
}

pub(crate) struct MeshletBuffers {
    pub(crate) vertex_buffer: Buffer,
    pub(crate) index_buffer: Buffer,
    pub(crate) index_count: u32,
}

impl MeshletBuffers {
    fn new(device: &RenderDevice, subdivision: u32) -> Self {
        let geometry = meshlet::build(subdivision);

        let vertices = geometry
            .vertices
            .iter()
            .map(|vertex| [vertex.x, vertex.y])
            .collect::<Vec<[f32; 2]>>();

        let vertex_buffer = device.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("meshlet_vertex_buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("meshlet_index_buffer"),
            contents: bytemuck::cast_slice(&geometry.indices),
            usage: BufferUsages::INDEX,
        });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: geometry.indices.len() as u32,
        }
    }
}

/// Per terrain GPU data shared by all of its views.
pub struct GpuTerrain {
    pub(crate) config: TerrainConfig,
    pub(crate) config_buffer: GpuBuffer<TerrainConfigUniform>,
    pub(crate) meshlet: Option<MeshletBuffers>,
}

impl GpuTerrain {
    fn new(device: &RenderDevice, config: &TerrainConfig) -> Self {
        let config_buffer = GpuBuffer::create_labeled(
            "terrain_config_buffer",
            device,
            &TerrainConfigUniform::from(config),
            BufferUsages::UNIFORM,
        );

        let meshlet = match config.geometry_mode {
            GeometryMode::Direct => None,
            GeometryMode::Meshlet { subdivision } => {
                Some(MeshletBuffers::new(device, subdivision))
            }
        };

        Self {
            config: config.clone(),
            config_buffer,
            meshlet,
        }
    }

    pub(crate) fn initialize(
        device: Res<RenderDevice>,
        mut gpu_terrains: ResMut<TerrainComponents<GpuTerrain>>,
        terrain_query: Extract<Query<(Entity, &TerrainConfig), Added<Terrain>>>,
    ) {
        for (terrain, config) in terrain_query.iter() {
            if let Err(error) = config.validate() {
                error!("invalid terrain config: {error}");
                continue;
            }

            gpu_terrains.insert(terrain, GpuTerrain::new(&device, config));
        }
    }
}
