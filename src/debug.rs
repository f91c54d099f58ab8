use crate::{
    camera_optimizer::CameraOptimizer,
    terrain_view::{TerrainViewComponents, TerrainViewConfig},
};
use bevy::{prelude::*, render::Extract};

/// Runtime toggles for inspecting the subdivision. Insert the resource to
/// opt in; all systems treat it as optional.
#[derive(Clone, Resource)]
pub struct DebugTerrain {
    pub wireframe: bool,
    pub show_depth: bool,
    /// Stops the whole compute sequence, freezing the tree in place.
    pub freeze: bool,
    pub disable_camera_optimizer: bool,
}

impl Default for DebugTerrain {
    fn default() -> Self {
        Self {
            wireframe: false,
            show_depth: false,
            freeze: false,
            disable_camera_optimizer: false,
        }
    }
}

pub fn toggle_debug(
    input: Res<ButtonInput<KeyCode>>,
    mut debug_terrain: ResMut<DebugTerrain>,
    mut optimizers: Query<&mut CameraOptimizer>,
) {
    if input.just_pressed(KeyCode::KeyW) {
        debug_terrain.wireframe = !debug_terrain.wireframe;
        info!("toggled the wireframe {}", if debug_terrain.wireframe { "on" } else { "off" });
    }
    if input.just_pressed(KeyCode::KeyL) {
        debug_terrain.show_depth = !debug_terrain.show_depth;
        info!("toggled the depth view {}", if debug_terrain.show_depth { "on" } else { "off" });
    }
    if input.just_pressed(KeyCode::KeyF) {
        debug_terrain.freeze = !debug_terrain.freeze;
        info!("{} the subdivision", if debug_terrain.freeze { "froze" } else { "unfroze" });
    }
    if input.just_pressed(KeyCode::KeyO) {
        debug_terrain.disable_camera_optimizer = !debug_terrain.disable_camera_optimizer;
        info!(
            "{} the camera optimizer",
            if debug_terrain.disable_camera_optimizer { "disabled" } else { "enabled" }
        );

        // Resuming must not reuse a stale skip streak.
        for mut optimizer in &mut optimizers {
            optimizer.force_next_update();
        }
    }
}

pub fn change_config(
    input: Res<ButtonInput<KeyCode>>,
    mut view_configs: ResMut<TerrainViewComponents<TerrainViewConfig>>,
) {
    for config in view_configs.values_mut() {
        if input.just_pressed(KeyCode::KeyI) && config.split_threshold > 4.0 {
            config.split_threshold -= 2.0;
            config.merge_threshold = (config.split_threshold / 3.0).max(1.0);
        }
        if input.just_pressed(KeyCode::KeyU) {
            config.split_threshold += 2.0;
            config.merge_threshold = config.split_threshold / 3.0;
        }
    }
}

pub fn extract_debug(mut commands: Commands, debug: Extract<Option<Res<DebugTerrain>>>) {
    if let Some(debug) = debug.as_ref() {
        commands.insert_resource((*debug).clone());
    }
}
