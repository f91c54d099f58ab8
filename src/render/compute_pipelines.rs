use crate::{
    cbt::{
        dispatch::GeometryMode,
        reduction::{level_passes, prepass_workgroups, ReductionStrategy},
    },
    debug::DebugTerrain,
    meshlet,
    render::{
        terrain_bind_group::{create_terrain_compute_layout, GpuTerrain},
        terrain_view_bind_group::{GpuTerrainView, TerrainViewUniform},
        REDUCTION_DEPTH_STRIDE,
    },
    shaders::{
        DISPATCH_SHADER, SUBDIVISION_SHADER, SUM_REDUCTION_PREPASS_SHADER,
        SUM_REDUCTION_PREPASS_SUBGROUP_SHADER, SUM_REDUCTION_SHADER,
    },
    terrain::TerrainComponents,
    terrain_view::TerrainViewComponents,
};
use bevy::{
    prelude::*,
    render::{
        render_graph::{self, RenderLabel},
        render_resource::{binding_types::*, *},
        renderer::{RenderContext, RenderDevice},
    },
};

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[repr(transparent)]
    pub struct TerrainComputePipelineKey: u32 {
        const NONE                  = 0;
        const DISPATCH              = 1 << 0;
        const SUBDIVISION           = 1 << 1;
        const PREPASS               = 1 << 2;
        const REDUCTION             = 1 << 3;
        const SUBGROUP              = 1 << 4;
        const MESHLET               = 1 << 5;
        const MESHLET_RESERVED_BITS = TerrainComputePipelineKey::MESHLET_SUBDIVISION_MASK << TerrainComputePipelineKey::MESHLET_SUBDIVISION_SHIFT;
    }
}

impl TerrainComputePipelineKey {
    const MESHLET_SUBDIVISION_MASK: u32 = 0b111111;
    const MESHLET_SUBDIVISION_SHIFT: u32 = 32 - 6;

    pub fn from_geometry_mode(mode: GeometryMode) -> Self {
        match mode {
            GeometryMode::Direct => TerrainComputePipelineKey::NONE,
            GeometryMode::Meshlet { subdivision } => {
                TerrainComputePipelineKey::MESHLET
                    | TerrainComputePipelineKey::from_bits_retain(
                        (subdivision & Self::MESHLET_SUBDIVISION_MASK)
                            << Self::MESHLET_SUBDIVISION_SHIFT,
                    )
            }
        }
    }

    fn meshlet_index_count(&self) -> u32 {
        let subdivision =
            (self.bits() >> Self::MESHLET_SUBDIVISION_SHIFT) & Self::MESHLET_SUBDIVISION_MASK;
        meshlet::index_count(subdivision)
    }

    pub fn shader_defs(&self) -> Vec<ShaderDefVal> {
        let mut shader_defs = Vec::new();

        if self.contains(TerrainComputePipelineKey::SUBGROUP) {
            shader_defs.push("SUBGROUP".into());
        }
        if self.contains(TerrainComputePipelineKey::MESHLET) {
            shader_defs.push("MESHLET".into());
            shader_defs.push(ShaderDefVal::UInt(
                "MESHLET_INDEX_COUNT".into(),
                self.meshlet_index_count(),
            ));
        }

        shader_defs
    }
}

pub(crate) struct TerrainComputeItem {
    dispatch_pipeline: CachedComputePipelineId,
    subdivision_pipeline: CachedComputePipelineId,
    prepass_pipeline: CachedComputePipelineId,
    reduction_pipeline: CachedComputePipelineId,
}

impl TerrainComputeItem {
    fn pipelines<'a>(
        &'a self,
        pipeline_cache: &'a PipelineCache,
    ) -> Option<(
        &'a ComputePipeline,
        &'a ComputePipeline,
        &'a ComputePipeline,
        &'a ComputePipeline,
    )> {
        Some((
            pipeline_cache.get_compute_pipeline(self.dispatch_pipeline)?,
            pipeline_cache.get_compute_pipeline(self.subdivision_pipeline)?,
            pipeline_cache.get_compute_pipeline(self.prepass_pipeline)?,
            pipeline_cache.get_compute_pipeline(self.reduction_pipeline)?,
        ))
    }
}

#[derive(Resource)]
pub struct TerrainComputePipelines {
    pub(crate) terrain_layout: BindGroupLayout,
    pub(crate) view_layout: BindGroupLayout,
    pub(crate) indirect_layout: BindGroupLayout,
    pub(crate) depth_layout: BindGroupLayout,
    dispatch_shader: Handle<Shader>,
    subdivision_shader: Handle<Shader>,
    prepass_shader: Handle<Shader>,
    prepass_subgroup_shader: Handle<Shader>,
    reduction_shader: Handle<Shader>,
    subgroup_supported: bool,
}

impl TerrainComputePipelines {
    /// The subgroup prepass covers thirteen levels and requires uniform
    /// subgroups of at least 32 invocations.
    pub(crate) fn reduction_strategy(&self, max_depth: u32) -> ReductionStrategy {
        if self.subgroup_supported && max_depth >= 13 {
            ReductionStrategy::SubgroupAccelerated
        } else {
            ReductionStrategy::SwarOnly
        }
    }
}

impl FromWorld for TerrainComputePipelines {
    fn from_world(world: &mut World) -> Self {
        let device = world.resource::<RenderDevice>();

        let subgroup_supported = device.features().contains(WgpuFeatures::SUBGROUP)
            && device.limits().min_subgroup_size >= 32;

        if subgroup_supported {
            info!("subgroup operations available, using the accelerated sum reduction");
        } else {
            info!("subgroup operations unavailable, using the plain sum reduction");
        }

        let terrain_layout = create_terrain_compute_layout(device);
        let view_layout = device.create_bind_group_layout(
            None,
            &BindGroupLayoutEntries::sequential(
                ShaderStages::COMPUTE,
                (uniform_buffer::<TerrainViewUniform>(false),),
            ),
        );
        let indirect_layout = device.create_bind_group_layout(
            None,
            &BindGroupLayoutEntries::sequential(
                ShaderStages::COMPUTE,
                (storage_buffer_sized(false, None),),
            ),
        );
        let depth_layout = device.create_bind_group_layout(
            None,
            &BindGroupLayoutEntries::sequential(
                ShaderStages::COMPUTE,
                (uniform_buffer_sized(true, BufferSize::new(4)),),
            ),
        );

        let dispatch_shader = world.load_asset(DISPATCH_SHADER);
        let subdivision_shader = world.load_asset(SUBDIVISION_SHADER);
        let prepass_shader = world.load_asset(SUM_REDUCTION_PREPASS_SHADER);
        let prepass_subgroup_shader = world.load_asset(SUM_REDUCTION_PREPASS_SUBGROUP_SHADER);
        let reduction_shader = world.load_asset(SUM_REDUCTION_SHADER);

        TerrainComputePipelines {
            terrain_layout,
            view_layout,
            indirect_layout,
            depth_layout,
            dispatch_shader,
            subdivision_shader,
            prepass_shader,
            prepass_subgroup_shader,
            reduction_shader,
            subgroup_supported,
        }
    }
}

impl SpecializedComputePipeline for TerrainComputePipelines {
    type Key = TerrainComputePipelineKey;

    fn specialize(&self, key: Self::Key) -> ComputePipelineDescriptor {
        let mut layout = default();
        let mut shader = default();
        let mut entry_point = default();

        let shader_defs = key.shader_defs();

        if key.contains(TerrainComputePipelineKey::DISPATCH) {
            layout = vec![self.terrain_layout.clone(), self.indirect_layout.clone()];
            shader = self.dispatch_shader.clone();
            entry_point = "prepare_indirect".into();
        }
        if key.contains(TerrainComputePipelineKey::SUBDIVISION) {
            layout = vec![self.terrain_layout.clone(), self.view_layout.clone()];
            shader = self.subdivision_shader.clone();
            entry_point = "subdivide".into();
        }
        if key.contains(TerrainComputePipelineKey::PREPASS) {
            layout = vec![self.terrain_layout.clone()];
            shader = if key.contains(TerrainComputePipelineKey::SUBGROUP) {
                self.prepass_subgroup_shader.clone()
            } else {
                self.prepass_shader.clone()
            };
            entry_point = "reduce_prepass".into();
        }
        if key.contains(TerrainComputePipelineKey::REDUCTION) {
            layout = vec![self.terrain_layout.clone(), self.depth_layout.clone()];
            shader = self.reduction_shader.clone();
            entry_point = "reduce_level".into();
        }

        ComputePipelineDescriptor {
            label: Some("terrain_compute_pipeline".into()),
            layout,
            push_constant_ranges: default(),
            shader,
            shader_defs,
            entry_point,
            zero_initialize_workgroup_memory: false,
        }
    }
}

#[derive(Debug, Hash, PartialEq, Eq, Clone, RenderLabel)]
pub struct TerrainCompute;

impl render_graph::Node for TerrainCompute {
    fn run<'w>(
        &self,
        _graph: &mut render_graph::RenderGraphContext,
        context: &mut RenderContext<'w>,
        world: &'w World,
    ) -> Result<(), render_graph::NodeRunError> {
        let compute_items = world.resource::<TerrainViewComponents<TerrainComputeItem>>();
        let compute_pipelines = world.resource::<TerrainComputePipelines>();
        let pipeline_cache = world.resource::<PipelineCache>();
        let gpu_terrain_views = world.resource::<TerrainViewComponents<GpuTerrainView>>();
        let debug = world.get_resource::<DebugTerrain>();

        if debug.map(|debug| debug.freeze).unwrap_or(false) {
            return Ok(());
        }

        context.add_command_buffer_generation_task(move |device| {
            let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
            let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor::default());

            for (&(terrain, view), compute_item) in compute_items.iter() {
                let Some((
                    dispatch_pipeline,
                    subdivision_pipeline,
                    prepass_pipeline,
                    reduction_pipeline,
                )) = compute_item.pipelines(pipeline_cache)
                else {
                    continue;
                };

                let gpu_terrain_view = gpu_terrain_views.get(&(terrain, view)).unwrap();
                if gpu_terrain_view.skip {
                    continue;
                }

                let max_depth = gpu_terrain_view.max_depth;
                let strategy = compute_pipelines.reduction_strategy(max_depth);

                pass.set_bind_group(0, &gpu_terrain_view.compute_bind_group, &[]);

                // Indirect arguments for this frame's subdivision.
                pass.set_bind_group(1, &gpu_terrain_view.indirect_bind_group, &[]);
                pass.set_pipeline(dispatch_pipeline);
                pass.dispatch_workgroups(1, 1, 1);

                pass.set_bind_group(1, &gpu_terrain_view.view_bind_group, &[]);
                pass.set_pipeline(subdivision_pipeline);
                pass.dispatch_workgroups_indirect(&gpu_terrain_view.indirect_buffer, 0);

                pass.set_pipeline(prepass_pipeline);
                pass.dispatch_workgroups(prepass_workgroups(max_depth), 1, 1);

                pass.set_pipeline(reduction_pipeline);
                for level in level_passes(max_depth, strategy) {
                    pass.set_bind_group(
                        1,
                        &gpu_terrain_view.depth_bind_group,
                        &[level.depth * REDUCTION_DEPTH_STRIDE],
                    );
                    pass.dispatch_workgroups(level.workgroups, 1, 1);
                }

                // Draw arguments for the updated tree.
                pass.set_bind_group(1, &gpu_terrain_view.indirect_bind_group, &[]);
                pass.set_pipeline(dispatch_pipeline);
                pass.dispatch_workgroups(1, 1, 1);
            }

            drop(pass);

            encoder.finish()
        });

        Ok(())
    }
}

pub(crate) fn queue_terrain_compute_pipelines(
    pipeline_cache: Res<PipelineCache>,
    compute_pipelines: Res<TerrainComputePipelines>,
    mut pipelines: ResMut<SpecializedComputePipelines<TerrainComputePipelines>>,
    mut compute_items: ResMut<TerrainViewComponents<TerrainComputeItem>>,
    gpu_terrains: Res<TerrainComponents<GpuTerrain>>,
    gpu_terrain_views: Res<TerrainViewComponents<GpuTerrainView>>,
) {
    for &(terrain, view) in gpu_terrain_views.keys() {
        let gpu_terrain = gpu_terrains.get(&terrain).unwrap();
        let config = &gpu_terrain.config;

        let mut key = TerrainComputePipelineKey::from_geometry_mode(config.geometry_mode);

        if compute_pipelines.reduction_strategy(config.max_depth)
            == ReductionStrategy::SubgroupAccelerated
        {
            key |= TerrainComputePipelineKey::SUBGROUP;
        }

        let dispatch_pipeline = pipelines.specialize(
            &pipeline_cache,
            &compute_pipelines,
            key | TerrainComputePipelineKey::DISPATCH,
        );
        let subdivision_pipeline = pipelines.specialize(
            &pipeline_cache,
            &compute_pipelines,
            key | TerrainComputePipelineKey::SUBDIVISION,
        );
        let prepass_pipeline = pipelines.specialize(
            &pipeline_cache,
            &compute_pipelines,
            key | TerrainComputePipelineKey::PREPASS,
        );
        let reduction_pipeline = pipelines.specialize(
            &pipeline_cache,
            &compute_pipelines,
            key | TerrainComputePipelineKey::REDUCTION,
        );

        compute_items.insert(
            (terrain, view),
            TerrainComputeItem {
                dispatch_pipeline,
                subdivision_pipeline,
                prepass_pipeline,
                reduction_pipeline,
            },
        );
    }
}
