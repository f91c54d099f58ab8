use crate::{
    debug::DebugTerrain,
    render::{
        terrain_bind_group::{create_terrain_render_layout, GpuTerrain},
        terrain_pass::TerrainItem,
        terrain_view_bind_group::{
            DrawTerrainCommand, GpuTerrainView, SetTerrainBindGroup, SetTerrainViewBindGroup,
            TerrainViewUniform,
        },
    },
    shaders::{DEFAULT_FRAGMENT_SHADER, DEFAULT_VERTEX_SHADER},
    terrain::TerrainComponents,
    terrain_view::TerrainViewComponents,
};
use bevy::{
    core_pipeline::core_3d::CORE_3D_DEPTH_FORMAT,
    image::BevyDefault,
    prelude::*,
    render::{
        render_phase::{
            DrawFunctions, PhaseItemExtraIndex, SetItemPipeline, ViewSortedRenderPhases,
        },
        render_resource::{binding_types::*, *},
        renderer::RenderDevice,
        sync_world::MainEntity,
    },
};

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[repr(transparent)]
    pub struct TerrainRenderPipelineKey: u32 {
        const NONE               = 0;
        const WIREFRAME          = 1 << 0;
        const SHOW_DEPTH         = 1 << 1;
        const MESHLET            = 1 << 2;
        const MSAA_RESERVED_BITS = TerrainRenderPipelineKey::MSAA_MASK_BITS << TerrainRenderPipelineKey::MSAA_SHIFT_BITS;
    }
}

impl TerrainRenderPipelineKey {
    const MSAA_MASK_BITS: u32 = 0b111111;
    const MSAA_SHIFT_BITS: u32 = 32 - 6;

    pub fn from_msaa_samples(msaa_samples: u32) -> Self {
        let msaa_bits = ((msaa_samples - 1) & Self::MSAA_MASK_BITS) << Self::MSAA_SHIFT_BITS;
        TerrainRenderPipelineKey::from_bits_retain(msaa_bits)
    }

    pub fn from_debug(debug: &DebugTerrain) -> Self {
        let mut key = TerrainRenderPipelineKey::NONE;

        if debug.wireframe {
            key |= TerrainRenderPipelineKey::WIREFRAME;
        }
        if debug.show_depth {
            key |= TerrainRenderPipelineKey::SHOW_DEPTH;
        }

        key
    }

    pub fn msaa_samples(&self) -> u32 {
        ((self.bits() >> Self::MSAA_SHIFT_BITS) & Self::MSAA_MASK_BITS) + 1
    }

    pub fn polygon_mode(&self) -> PolygonMode {
        match self.contains(TerrainRenderPipelineKey::WIREFRAME) {
            true => PolygonMode::Line,
            false => PolygonMode::Fill,
        }
    }

    pub fn shader_defs(&self) -> Vec<ShaderDefVal> {
        let mut shader_defs = Vec::new();

        if self.contains(TerrainRenderPipelineKey::SHOW_DEPTH) {
            shader_defs.push("SHOW_DEPTH".into());
        }
        if self.contains(TerrainRenderPipelineKey::MESHLET) {
            shader_defs.push("MESHLET".into());
        }

        shader_defs
    }
}

/// The pipeline used to render the terrain entities.
#[derive(Resource)]
pub struct TerrainRenderPipeline {
    pub(crate) terrain_layout: BindGroupLayout,
    pub(crate) view_layout: BindGroupLayout,
    vertex_shader: Handle<Shader>,
    fragment_shader: Handle<Shader>,
}

impl FromWorld for TerrainRenderPipeline {
    fn from_world(world: &mut World) -> Self {
        let device = world.resource::<RenderDevice>();

        let terrain_layout = create_terrain_render_layout(device);
        let view_layout = device.create_bind_group_layout(
            None,
            &BindGroupLayoutEntries::sequential(
                ShaderStages::VERTEX,
                (uniform_buffer::<TerrainViewUniform>(false),),
            ),
        );

        let vertex_shader = world.load_asset(DEFAULT_VERTEX_SHADER);
        let fragment_shader = world.load_asset(DEFAULT_FRAGMENT_SHADER);

        Self {
            terrain_layout,
            view_layout,
            vertex_shader,
            fragment_shader,
        }
    }
}

impl SpecializedRenderPipeline for TerrainRenderPipeline {
    type Key = TerrainRenderPipelineKey;

    fn specialize(&self, key: Self::Key) -> RenderPipelineDescriptor {
        let shader_defs = key.shader_defs();

        let buffers = if key.contains(TerrainRenderPipelineKey::MESHLET) {
            // Barycentric patch coordinates of the meshlet vertices.
            vec![VertexBufferLayout {
                array_stride: 8,
                step_mode: VertexStepMode::Vertex,
                attributes: vec![VertexAttribute {
                    format: VertexFormat::Float32x2,
                    offset: 0,
                    shader_location: 0,
                }],
            }]
        } else {
            Vec::new()
        };

        RenderPipelineDescriptor {
            label: Some("terrain_render_pipeline".into()),
            layout: vec![self.terrain_layout.clone(), self.view_layout.clone()],
            push_constant_ranges: default(),
            vertex: VertexState {
                shader: self.vertex_shader.clone(),
                entry_point: "vertex".into(),
                shader_defs: shader_defs.clone(),
                buffers,
            },
            primitive: PrimitiveState {
                front_face: FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: key.polygon_mode(),
                conservative: false,
                topology: PrimitiveTopology::TriangleList,
                strip_index_format: None,
            },
            fragment: Some(FragmentState {
                shader: self.fragment_shader.clone(),
                shader_defs,
                entry_point: "fragment".into(),
                targets: vec![Some(ColorTargetState {
                    format: TextureFormat::bevy_default(),
                    blend: Some(BlendState::REPLACE),
                    write_mask: ColorWrites::ALL,
                })],
            }),
            depth_stencil: Some(DepthStencilState {
                format: CORE_3D_DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: CompareFunction::GreaterEqual,
                stencil: StencilState::default(),
                bias: DepthBiasState::default(),
            }),
            multisample: MultisampleState {
                count: key.msaa_samples(),
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            zero_initialize_workgroup_memory: false,
        }
    }
}

/// The draw function of the terrain. It sets the pipeline and the bind
/// groups and then issues the indirect draw call.
pub(crate) type DrawTerrain = (
    SetItemPipeline,
    SetTerrainBindGroup<0>,
    SetTerrainViewBindGroup<1>,
    DrawTerrainCommand,
);

/// Queues all terrain entities for rendering via the terrain pipeline.
pub(crate) fn queue_terrain(
    draw_functions: Res<DrawFunctions<TerrainItem>>,
    debug: Option<Res<DebugTerrain>>,
    pipeline_cache: Res<PipelineCache>,
    render_pipeline: Res<TerrainRenderPipeline>,
    mut pipelines: ResMut<SpecializedRenderPipelines<TerrainRenderPipeline>>,
    mut terrain_phases: ResMut<ViewSortedRenderPhases<TerrainItem>>,
    gpu_terrains: Res<TerrainComponents<GpuTerrain>>,
    gpu_terrain_views: Res<TerrainViewComponents<GpuTerrainView>>,
    views: Query<(Entity, MainEntity, &Msaa)>,
) {
    let draw_function = draw_functions.read().get_id::<DrawTerrain>().unwrap();

    for (render_view, view, msaa) in &views {
        let Some(terrain_phase) = terrain_phases.get_mut(&render_view) else {
            continue;
        };

        for &(terrain, terrain_view) in gpu_terrain_views.keys() {
            if terrain_view != view {
                continue;
            }

            let gpu_terrain = gpu_terrains.get(&terrain).unwrap();

            let mut key = TerrainRenderPipelineKey::from_msaa_samples(msaa.samples());
            if gpu_terrain.meshlet.is_some() {
                key |= TerrainRenderPipelineKey::MESHLET;
            }
            if let Some(debug) = &debug {
                key |= TerrainRenderPipelineKey::from_debug(debug);
            }

            let pipeline = pipelines.specialize(&pipeline_cache, &render_pipeline, key);

            terrain_phase.add(TerrainItem {
                representative_entity: (terrain, terrain.into()),
                draw_function,
                pipeline,
                batch_range: 0..1,
                extra_index: PhaseItemExtraIndex(0),
                distance: 0.0,
            });
        }
    }
}
