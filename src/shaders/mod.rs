use bevy::{asset::embedded_asset, prelude::*};
use itertools::Itertools;

pub const CBT_SHADER: &str = "embedded://bevy_terrain_cbt/shaders/cbt.wgsl";
pub const TYPES_SHADER: &str = "embedded://bevy_terrain_cbt/shaders/types.wgsl";
pub const DISPATCH_SHADER: &str = "embedded://bevy_terrain_cbt/shaders/dispatch.wgsl";
pub const SUBDIVISION_SHADER: &str = "embedded://bevy_terrain_cbt/shaders/subdivision.wgsl";
pub const SUM_REDUCTION_PREPASS_SHADER: &str =
    "embedded://bevy_terrain_cbt/shaders/sum_reduction_prepass.wgsl";
pub const SUM_REDUCTION_PREPASS_SUBGROUP_SHADER: &str =
    "embedded://bevy_terrain_cbt/shaders/sum_reduction_prepass_subgroup.wgsl";
pub const SUM_REDUCTION_SHADER: &str = "embedded://bevy_terrain_cbt/shaders/sum_reduction.wgsl";
pub const DEFAULT_VERTEX_SHADER: &str = "embedded://bevy_terrain_cbt/shaders/render/vertex.wgsl";
pub const DEFAULT_FRAGMENT_SHADER: &str =
    "embedded://bevy_terrain_cbt/shaders/render/fragment.wgsl";

/// Keeps the embedded shaders loaded for the lifetime of the app.
#[derive(Default, Resource)]
pub(crate) struct InternalShaders(Vec<Handle<Shader>>);

impl InternalShaders {
    pub(crate) fn load(app: &mut App, shaders: &[&'static str]) {
        let mut shaders = shaders
            .iter()
            .map(|&shader| app.world_mut().resource_mut::<AssetServer>().load(shader))
            .collect_vec();

        let mut internal_shaders = app.world_mut().resource_mut::<InternalShaders>();
        internal_shaders.0.append(&mut shaders);
    }
}

pub(crate) fn load_terrain_shaders(app: &mut App) {
    embedded_asset!(app, "cbt.wgsl");
    embedded_asset!(app, "types.wgsl");
    embedded_asset!(app, "dispatch.wgsl");
    embedded_asset!(app, "subdivision.wgsl");
    embedded_asset!(app, "sum_reduction_prepass.wgsl");
    embedded_asset!(app, "sum_reduction_prepass_subgroup.wgsl");
    embedded_asset!(app, "sum_reduction.wgsl");
    embedded_asset!(app, "render/vertex.wgsl");
    embedded_asset!(app, "render/fragment.wgsl");

    app.init_resource::<InternalShaders>();
    InternalShaders::load(app, &[CBT_SHADER, TYPES_SHADER]);
}
