use crate::{camera_optimizer::CameraOptimizer, debug::DebugTerrain, terrain::Terrain};
use bevy::{prelude::*, utils::HashMap};
use std::ops::{Deref, DerefMut};

/// Marker for views (cameras) that subdivide terrains.
#[derive(Clone, Copy, Component)]
pub struct TerrainView;

/// Stores a component of type `C` for each terrain-view pair.
#[derive(Resource)]
pub struct TerrainViewComponents<C>(pub HashMap<(Entity, Entity), C>);

impl<C> Deref for TerrainViewComponents<C> {
    type Target = HashMap<(Entity, Entity), C>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<C> DerefMut for TerrainViewComponents<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<C> Default for TerrainViewComponents<C> {
    fn default() -> Self {
        Self(HashMap::default())
    }
}

/// Per-view subdivision tuning.
#[derive(Clone, Debug, Component)]
pub struct TerrainViewConfig {
    /// Screen-space hypotenuse length above which a leaf splits.
    pub split_threshold: f32,
    /// Screen-space hypotenuse length below which a leaf merges. Kept well
    /// under the split threshold for hysteresis.
    pub merge_threshold: f32,
    /// Only every n-th leaf acts per frame, spreading structural change
    /// over multiple frames.
    pub spread_factor: u32,
    /// Edge length in pixels the subdivision converges towards.
    pub target_edge_pixels: f32,
}

impl Default for TerrainViewConfig {
    fn default() -> Self {
        Self {
            split_threshold: 24.0,
            merge_threshold: 8.0,
            spread_factor: 2,
            target_edge_pixels: 16.0,
        }
    }
}

/// The per-frame compute decision for one terrain-view pair, made on the
/// main world and extracted for the compute node to act on.
///
/// Split and merge alternate by frame parity, so a leaf created by an even
/// frame's split pass is merge-eligible on the following odd frame. Skipped
/// frames do not advance the phase.
#[derive(Clone, Copy, Debug, Default)]
pub struct ComputeSchedule {
    pub skip: bool,
    pub frame_index: u32,
    pub update_mode: u32,
}

/// Advances the skip-frame state machines and fixes this frame's schedule
/// for every terrain-view pair.
pub(crate) fn update_compute_schedules(
    debug: Option<Res<DebugTerrain>>,
    mut schedules: ResMut<TerrainViewComponents<ComputeSchedule>>,
    terrains: Query<Entity, With<Terrain>>,
    mut views: Query<(Entity, &GlobalTransform, Option<&mut CameraOptimizer>), With<TerrainView>>,
) {
    let freeze = debug.as_ref().is_some_and(|debug| debug.freeze);
    let optimizer_allowed = !debug.is_some_and(|debug| debug.disable_camera_optimizer);

    for (view, transform, optimizer) in &mut views {
        let mut skip = freeze;

        if let Some(mut optimizer) = optimizer {
            optimizer.update(transform.translation(), *transform.forward());

            skip |= optimizer_allowed && optimizer.should_skip_compute();
            if skip {
                optimizer.record_compute_skipped();
            } else {
                optimizer.record_compute_executed();
            }
        }

        for terrain in &terrains {
            let previous = schedules.get(&(terrain, view)).copied();
            let frame_index = match previous {
                Some(schedule) if !schedule.skip => schedule.frame_index.wrapping_add(1),
                Some(schedule) => schedule.frame_index,
                None => 0,
            };

            schedules.insert(
                (terrain, view),
                ComputeSchedule {
                    skip,
                    frame_index,
                    update_mode: frame_index & 1,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_alternates_only_on_computed_frames() {
        let mut schedule = ComputeSchedule {
            skip: false,
            frame_index: 0,
            update_mode: 0,
        };

        let mut advance = |skip: bool, schedule: &mut ComputeSchedule| {
            let frame_index = if schedule.skip {
                schedule.frame_index
            } else {
                schedule.frame_index + 1
            };
            *schedule = ComputeSchedule {
                skip,
                frame_index,
                update_mode: frame_index & 1,
            };
        };

        advance(false, &mut schedule);
        assert_eq!(schedule.update_mode, 1);
        advance(true, &mut schedule);
        assert_eq!(schedule.update_mode, 0);
        advance(false, &mut schedule);
        assert_eq!(schedule.update_mode, 0);
        advance(false, &mut schedule);
        assert_eq!(schedule.update_mode, 1);
    }
}
