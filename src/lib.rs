//! GPU-driven adaptive terrain subdivision on a concurrent binary tree.
//!
//! The terrain is a square patch bisected into right triangles. A packed
//! binary tree on the GPU tracks which triangles are currently leaves; every
//! frame a compute pass splits leaves that project too large and merges
//! diamonds that project too small, then the whole terrain is drawn with a
//! single indirect draw call.

pub mod camera_optimizer;
pub mod cbt;
pub mod debug;
pub mod meshlet;
pub mod render;
pub mod shaders;
pub mod terrain;
pub mod terrain_view;
pub mod util;

pub mod prelude {
    pub use crate::{
        camera_optimizer::{CameraOptimizer, CameraOptimizerSettings},
        cbt::{dispatch::GeometryMode, CbtTree},
        debug::DebugTerrain,
        terrain::{Terrain, TerrainComponents, TerrainConfig},
        terrain_view::{TerrainView, TerrainViewComponents, TerrainViewConfig},
        TerrainPlugin,
    };
}

use crate::{
    debug::{change_config, extract_debug, toggle_debug, DebugTerrain},
    render::{
        compute_pipelines::{queue_terrain_compute_pipelines, TerrainCompute, TerrainComputeItem,
            TerrainComputePipelines},
        render_pipeline::{queue_terrain, DrawTerrain, TerrainRenderPipeline},
        terrain_pass::{extract_terrain_phases, TerrainItem, TerrainPass},
        GpuTerrain, GpuTerrainView,
    },
    shaders::load_terrain_shaders,
    terrain::TerrainComponents,
    terrain_view::{update_compute_schedules, ComputeSchedule, TerrainViewComponents,
        TerrainViewConfig},
};
use bevy::{
    core_pipeline::core_3d::graph::{Core3d, Node3d},
    prelude::*,
    render::{
        graph::CameraDriverLabel,
        render_graph::{RenderGraph, RenderGraphApp, ViewNodeRunner},
        render_phase::{sort_phase_system, AddRenderCommand, DrawFunctions,
            ViewSortedRenderPhases},
        render_resource::{SpecializedComputePipelines, SpecializedRenderPipelines},
        Render, RenderApp, RenderSet,
    },
};

/// The plugin for the terrain renderer.
pub struct TerrainPlugin;

impl Plugin for TerrainPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<TerrainViewComponents<TerrainViewConfig>>()
            .init_resource::<TerrainViewComponents<ComputeSchedule>>()
            .init_resource::<DebugTerrain>()
            .add_systems(Update, (toggle_debug, change_config))
            .add_systems(PostUpdate, update_compute_schedules);

        app.sub_app_mut(RenderApp)
            .init_resource::<TerrainComponents<GpuTerrain>>()
            .init_resource::<TerrainViewComponents<GpuTerrainView>>()
            .init_resource::<TerrainViewComponents<TerrainComputeItem>>()
            .init_resource::<ViewSortedRenderPhases<TerrainItem>>()
            .init_resource::<DrawFunctions<TerrainItem>>()
            .add_render_command::<TerrainItem, DrawTerrain>()
            .add_systems(
                ExtractSchedule,
                (
                    extract_debug,
                    extract_terrain_phases,
                    GpuTerrain::initialize,
                    GpuTerrainView::initialize.after(GpuTerrain::initialize),
                    GpuTerrainView::extract.after(GpuTerrainView::initialize),
                ),
            )
            .add_systems(
                Render,
                (
                    GpuTerrainView::prepare.in_set(RenderSet::Prepare),
                    (queue_terrain_compute_pipelines, queue_terrain).in_set(RenderSet::Queue),
                    sort_phase_system::<TerrainItem>.in_set(RenderSet::PhaseSort),
                ),
            );

        app.sub_app_mut(RenderApp)
            .add_render_graph_node::<ViewNodeRunner<TerrainPass>>(Core3d, TerrainPass)
            .add_render_graph_edges(
                Core3d,
                (Node3d::MainOpaquePass, TerrainPass, Node3d::MainTransparentPass),
            );
    }

    fn finish(&self, app: &mut App) {
        load_terrain_shaders(app);

        let render_app = app
            .sub_app_mut(RenderApp)
            .init_resource::<TerrainComputePipelines>()
            .init_resource::<SpecializedComputePipelines<TerrainComputePipelines>>()
            .init_resource::<TerrainRenderPipeline>()
            .init_resource::<SpecializedRenderPipelines<TerrainRenderPipeline>>();

        let mut render_graph = render_app.world_mut().resource_mut::<RenderGraph>();
        render_graph.add_node(TerrainCompute, TerrainCompute);
        render_graph.add_node_edge(TerrainCompute, CameraDriverLabel);
    }
}
