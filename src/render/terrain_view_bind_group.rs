use crate::{
    cbt::{self, CbtTree},
    render::{
        compute_pipelines::TerrainComputePipelines,
        render_pipeline::TerrainRenderPipeline,
        terrain_bind_group::GpuTerrain,
        DRAW_INDIRECT_OFFSET, INDIRECT_BUFFER_SIZE, REDUCTION_DEPTH_STRIDE,
    },
    terrain::TerrainComponents,
    terrain_view::{ComputeSchedule, TerrainView, TerrainViewComponents, TerrainViewConfig},
    util::GpuBuffer,
};
use bevy::{
    ecs::{
        query::ROQueryItem,
        system::{lifetimeless::SRes, SystemParamItem},
    },
    prelude::*,
    render::{
        render_phase::{PhaseItem, RenderCommand, RenderCommandResult, TrackedRenderPass},
        render_resource::*,
        renderer::{RenderDevice, RenderQueue},
        sync_world::MainEntity,
        Extract,
    },
};

/// The terrain view data that is available in shaders.
#[derive(Default, ShaderType)]
pub(crate) struct TerrainViewUniform {
    clip_from_world: Mat4,
    camera_world_position: Vec3,
    lod_factor: f32,
    split_threshold: f32,
    merge_threshold: f32,
    target_edge_pixels: f32,
    update_mode: u32,
    frame_index: u32,
    spread_factor: u32,
}

/// Per (terrain, view) GPU data: the tree itself, the indirect arguments
/// and the bind groups of the compute and draw paths.
pub struct GpuTerrainView {
    pub(crate) skip: bool,
    pub(crate) max_depth: u32,
    pub(crate) indirect_buffer: Buffer,
    view_buffer: GpuBuffer<TerrainViewUniform>,
    pub(crate) compute_bind_group: BindGroup,
    pub(crate) view_bind_group: BindGroup,
    pub(crate) indirect_bind_group: BindGroup,
    pub(crate) depth_bind_group: BindGroup,
    pub(crate) terrain_render_bind_group: BindGroup,
    pub(crate) view_render_bind_group: BindGroup,
}

impl GpuTerrainView {
    fn new(
        device: &RenderDevice,
        compute_pipelines: &TerrainComputePipelines,
        render_pipeline: &TerrainRenderPipeline,
        gpu_terrain: &GpuTerrain,
    ) -> Self {
        let config = &gpu_terrain.config;

        // The tree is seeded on the CPU once and lives on the GPU from
        // then on.
        let tree = CbtTree::new(config.max_depth, config.init_depth);
        let mut contents = bytemuck::cast_slice(tree.words()).to_vec();
        contents.resize(cbt::buffer_size(config.max_depth) as usize, 0);

        let cbt_buffer = device.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("cbt_buffer"),
            contents: &contents,
            usage: BufferUsages::STORAGE,
        });

        let indirect_buffer = device.create_buffer(&BufferDescriptor {
            label: Some("indirect_buffer"),
            size: INDIRECT_BUFFER_SIZE,
            usage: BufferUsages::STORAGE | BufferUsages::INDIRECT,
            mapped_at_creation: false,
        });

        let view_buffer = GpuBuffer::empty_labeled(
            "terrain_view_buffer",
            device,
            BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        );

        // One depth value per possible reduction pass, spaced out to the
        // dynamic offset stride.
        let mut depths = vec![0u8; config.max_depth as usize * REDUCTION_DEPTH_STRIDE as usize];
        for depth in 0..config.max_depth {
            let offset = depth as usize * REDUCTION_DEPTH_STRIDE as usize;
            depths[offset..offset + 4].copy_from_slice(&depth.to_le_bytes());
        }
        let depth_buffer = device.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("reduction_depth_buffer"),
            contents: &depths,
            usage: BufferUsages::UNIFORM,
        });

        let compute_bind_group = device.create_bind_group(
            "terrain_compute_bind_group",
            &compute_pipelines.terrain_layout,
            &BindGroupEntries::sequential((
                cbt_buffer.as_entire_binding(),
                &gpu_terrain.config_buffer,
            )),
        );
        let view_bind_group = device.create_bind_group(
            "terrain_view_bind_group",
            &compute_pipelines.view_layout,
            &BindGroupEntries::single(&view_buffer),
        );
        let indirect_bind_group = device.create_bind_group(
            "indirect_bind_group",
            &compute_pipelines.indirect_layout,
            &BindGroupEntries::single(indirect_buffer.as_entire_binding()),
        );
        let depth_bind_group = device.create_bind_group(
            "reduction_depth_bind_group",
            &compute_pipelines.depth_layout,
            &BindGroupEntries::single(BufferBinding {
                buffer: &depth_buffer,
                offset: 0,
                size: BufferSize::new(4),
            }),
        );
        let terrain_render_bind_group = device.create_bind_group(
            "terrain_render_bind_group",
            &render_pipeline.terrain_layout,
            &BindGroupEntries::sequential((
                cbt_buffer.as_entire_binding(),
                &gpu_terrain.config_buffer,
            )),
        );
        let view_render_bind_group = device.create_bind_group(
            "terrain_view_render_bind_group",
            &render_pipeline.view_layout,
            &BindGroupEntries::single(&view_buffer),
        );

        Self {
            skip: false,
            max_depth: config.max_depth,
            indirect_buffer,
            view_buffer,
            compute_bind_group,
            view_bind_group,
            indirect_bind_group,
            depth_bind_group,
            terrain_render_bind_group,
            view_render_bind_group,
        }
    }

    pub(crate) fn initialize(
        device: Res<RenderDevice>,
        compute_pipelines: Res<TerrainComputePipelines>,
        render_pipeline: Res<TerrainRenderPipeline>,
        gpu_terrains: Res<TerrainComponents<GpuTerrain>>,
        mut gpu_terrain_views: ResMut<TerrainViewComponents<GpuTerrainView>>,
        view_configs: Extract<Res<TerrainViewComponents<TerrainViewConfig>>>,
    ) {
        for &(terrain, view) in view_configs.keys() {
            if gpu_terrain_views.contains_key(&(terrain, view)) {
                continue;
            }
            let Some(gpu_terrain) = gpu_terrains.get(&terrain) else {
                continue;
            };

            gpu_terrain_views.insert(
                (terrain, view),
                GpuTerrainView::new(&device, &compute_pipelines, &render_pipeline, gpu_terrain),
            );
        }
    }

    pub(crate) fn extract(
        mut gpu_terrain_views: ResMut<TerrainViewComponents<GpuTerrainView>>,
        view_configs: Extract<Res<TerrainViewComponents<TerrainViewConfig>>>,
        schedules: Extract<Res<TerrainViewComponents<ComputeSchedule>>>,
        view_query: Extract<
            Query<(&GlobalTransform, &Camera, &Projection), With<TerrainView>>,
        >,
    ) {
        for (&(terrain, view), gpu_terrain_view) in gpu_terrain_views.iter_mut() {
            let Some(view_config) = view_configs.get(&(terrain, view)) else {
                continue;
            };
            let Ok((transform, camera, projection)) = view_query.get(view) else {
                continue;
            };

            let schedule = schedules.get(&(terrain, view)).copied().unwrap_or_default();
            gpu_terrain_view.skip = schedule.skip;

            let Some(viewport_size) = camera.physical_viewport_size() else {
                continue;
            };
            let fov = match projection {
                Projection::Perspective(perspective) => perspective.fov,
                Projection::Orthographic(_) => std::f32::consts::FRAC_PI_2,
            };

            // Screen space error of a one world unit edge at distance one.
            let lod_factor = 2.0
                * (viewport_size.y as f32
                    / (2.0 * (fov / 2.0).tan() * view_config.target_edge_pixels))
                    .log2();

            let world_from_view = transform.compute_matrix();
            let clip_from_world = camera.clip_from_view() * world_from_view.inverse();

            gpu_terrain_view.view_buffer.set_value(TerrainViewUniform {
                clip_from_world,
                camera_world_position: transform.translation(),
                lod_factor,
                split_threshold: view_config.split_threshold,
                merge_threshold: view_config.merge_threshold,
                target_edge_pixels: view_config.target_edge_pixels,
                update_mode: schedule.update_mode,
                frame_index: schedule.frame_index,
                spread_factor: view_config.spread_factor,
            });
        }
    }

    pub(crate) fn prepare(
        queue: Res<RenderQueue>,
        mut gpu_terrain_views: ResMut<TerrainViewComponents<GpuTerrainView>>,
    ) {
        for gpu_terrain_view in gpu_terrain_views.values_mut() {
            gpu_terrain_view.view_buffer.update(&queue);
        }
    }
}

pub struct SetTerrainBindGroup<const I: usize>;

impl<const I: usize, P: PhaseItem> RenderCommand<P> for SetTerrainBindGroup<I> {
    type Param = SRes<TerrainViewComponents<GpuTerrainView>>;
    type ViewQuery = MainEntity;
    type ItemQuery = ();

    #[inline]
    fn render<'w>(
        item: &P,
        view: ROQueryItem<'w, Self::ViewQuery>,
        _: Option<ROQueryItem<'w, Self::ItemQuery>>,
        gpu_terrain_views: SystemParamItem<'w, '_, Self::Param>,
        pass: &mut TrackedRenderPass<'w>,
    ) -> RenderCommandResult {
        let Some(gpu_terrain_view) = gpu_terrain_views
            .into_inner()
            .get(&(item.main_entity().id(), view))
        else {
            return RenderCommandResult::Skip;
        };

        pass.set_bind_group(I, &gpu_terrain_view.terrain_render_bind_group, &[]);
        RenderCommandResult::Success
    }
}

pub struct SetTerrainViewBindGroup<const I: usize>;

impl<const I: usize, P: PhaseItem> RenderCommand<P> for SetTerrainViewBindGroup<I> {
    type Param = SRes<TerrainViewComponents<GpuTerrainView>>;
    type ViewQuery = MainEntity;
    type ItemQuery = ();

    #[inline]
    fn render<'w>(
        item: &P,
        view: ROQueryItem<'w, Self::ViewQuery>,
        _: Option<ROQueryItem<'w, Self::ItemQuery>>,
        gpu_terrain_views: SystemParamItem<'w, '_, Self::Param>,
        pass: &mut TrackedRenderPass<'w>,
    ) -> RenderCommandResult {
        let Some(gpu_terrain_view) = gpu_terrain_views
            .into_inner()
            .get(&(item.main_entity().id(), view))
        else {
            return RenderCommandResult::Skip;
        };

        pass.set_bind_group(I, &gpu_terrain_view.view_render_bind_group, &[]);
        RenderCommandResult::Success
    }
}

pub(crate) struct DrawTerrainCommand;

impl<P: PhaseItem> RenderCommand<P> for DrawTerrainCommand {
    type Param = (
        SRes<TerrainViewComponents<GpuTerrainView>>,
        SRes<TerrainComponents<GpuTerrain>>,
    );
    type ViewQuery = MainEntity;
    type ItemQuery = ();

    #[inline]
    fn render<'w>(
        item: &P,
        view: ROQueryItem<'w, Self::ViewQuery>,
        _: Option<ROQueryItem<'w, Self::ItemQuery>>,
        (gpu_terrain_views, gpu_terrains): SystemParamItem<'w, '_, Self::Param>,
        pass: &mut TrackedRenderPass<'w>,
    ) -> RenderCommandResult {
        let terrain = item.main_entity().id();
        let Some(gpu_terrain_view) = gpu_terrain_views
            .into_inner()
            .get(&(terrain, view))
        else {
            return RenderCommandResult::Skip;
        };
        let Some(gpu_terrain) = gpu_terrains.into_inner().get(&terrain) else {
            return RenderCommandResult::Skip;
        };

        match &gpu_terrain.meshlet {
            Some(meshlet) => {
                pass.set_vertex_buffer(0, meshlet.vertex_buffer.slice(..));
                pass.set_index_buffer(meshlet.index_buffer.slice(..), 0, IndexFormat::Uint32);
                pass.draw_indexed_indirect(&gpu_terrain_view.indirect_buffer, DRAW_INDIRECT_OFFSET);
            }
            None => {
                pass.draw_indirect(&gpu_terrain_view.indirect_buffer, DRAW_INDIRECT_OFFSET);
            }
        }

        RenderCommandResult::Success
    }
}
