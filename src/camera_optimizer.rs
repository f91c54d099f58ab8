//! Skip-frame heuristic for a stationary camera.
//!
//! Subdivision converges within a few frames once the view stops moving.
//! After that, re-running the compute sequence only rewrites identical
//! buffers, so the whole sequence can be skipped while the camera stays
//! put. Skipping never mutates the tree, so a wrong skip costs one frame
//! of staleness at worst, never broken geometry.

use bevy::{math::Vec3, prelude::Component};

#[derive(Copy, Clone, Debug)]
pub struct CameraOptimizerSettings {
    /// World-space movement below this does not count as movement.
    pub position_threshold: f32,
    /// Rotation measured as `1 - dot(forward, previous_forward)`.
    pub rotation_threshold: f32,
    /// Consecutive static frames before skipping kicks in. Covers the
    /// frames subdivision needs to settle after the last movement.
    pub convergence_frames: u32,
    /// Upper bound on consecutive skips, so a missed movement signal can
    /// never freeze the terrain for good.
    pub max_skip_frames: u32,
}

impl Default for CameraOptimizerSettings {
    fn default() -> Self {
        Self {
            position_threshold: 0.01,
            rotation_threshold: 1.0e-4,
            convergence_frames: 10,
            max_skip_frames: 30,
        }
    }
}

#[derive(Copy, Clone, Default)]
struct CameraSnapshot {
    position: Vec3,
    forward: Vec3,
    valid: bool,
}

/// Per-view skip-frame state. Lives on the view entity and is consulted by
/// the compute node each frame.
#[derive(Component)]
pub struct CameraOptimizer {
    settings: CameraOptimizerSettings,
    snapshot: CameraSnapshot,
    static_frames: u32,
    frames_since_compute: u32,
    force_next_compute: bool,
    last_frame_skipped: bool,
    enabled: bool,
}

impl Default for CameraOptimizer {
    fn default() -> Self {
        Self::new(CameraOptimizerSettings::default())
    }
}

impl CameraOptimizer {
    pub fn new(settings: CameraOptimizerSettings) -> Self {
        Self {
            settings,
            snapshot: CameraSnapshot::default(),
            static_frames: 0,
            frames_since_compute: 0,
            force_next_compute: false,
            last_frame_skipped: false,
            enabled: true,
        }
    }

    fn camera_moved(&mut self, position: Vec3, forward: Vec3) -> bool {
        if !self.snapshot.valid {
            self.snapshot = CameraSnapshot {
                position,
                forward,
                valid: true,
            };
            return true;
        }

        let moved = position.distance(self.snapshot.position) > self.settings.position_threshold
            || 1.0 - forward.dot(self.snapshot.forward) > self.settings.rotation_threshold;

        if moved {
            self.snapshot.position = position;
            self.snapshot.forward = forward;
        }

        moved
    }

    /// Feeds the current view into the static-frame counter. Call once per
    /// frame, before the skip decision.
    pub fn update(&mut self, position: Vec3, forward: Vec3) {
        if self.camera_moved(position, forward) {
            self.static_frames = 0;
        } else {
            self.static_frames += 1;
        }
    }

    pub fn should_skip_compute(&self) -> bool {
        self.enabled
            && !self.force_next_compute
            && self.static_frames > self.settings.convergence_frames
            && self.frames_since_compute < self.settings.max_skip_frames
    }

    /// Bookkeeping after the sequence actually ran. Exactly one of the two
    /// record calls must happen per frame, matching the action taken.
    pub fn record_compute_executed(&mut self) {
        self.force_next_compute = false;
        self.frames_since_compute = 0;
        self.last_frame_skipped = false;
    }

    pub fn record_compute_skipped(&mut self) {
        self.frames_since_compute += 1;
        self.last_frame_skipped = true;
    }

    /// Forces the next frame to compute, regardless of stationarity. Used
    /// on configuration changes.
    pub fn force_next_update(&mut self) {
        self.force_next_compute = true;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.force_next_compute = true;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn was_last_frame_skipped(&self) -> bool {
        self.last_frame_skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CameraOptimizerSettings {
        CameraOptimizerSettings {
            position_threshold: 0.01,
            rotation_threshold: 1.0e-4,
            convergence_frames: 3,
            max_skip_frames: 5,
        }
    }

    fn hold_still(optimizer: &mut CameraOptimizer, frames: u32) {
        for _ in 0..frames {
            optimizer.update(Vec3::ZERO, Vec3::NEG_Z);
        }
    }

    #[test]
    fn skips_only_after_convergence() {
        let mut optimizer = CameraOptimizer::new(settings());

        // The first update seeds the snapshot and counts as movement.
        optimizer.update(Vec3::ZERO, Vec3::NEG_Z);
        assert!(!optimizer.should_skip_compute());

        hold_still(&mut optimizer, 3);
        assert!(!optimizer.should_skip_compute());

        hold_still(&mut optimizer, 1);
        assert!(optimizer.should_skip_compute());
    }

    #[test]
    fn sub_threshold_jitter_counts_as_static() {
        let mut optimizer = CameraOptimizer::new(settings());
        optimizer.update(Vec3::ZERO, Vec3::NEG_Z);

        for i in 0..4 {
            let jitter = Vec3::splat(0.001 * (i % 2) as f32);
            optimizer.update(jitter, Vec3::NEG_Z);
        }
        assert!(optimizer.should_skip_compute());
    }

    #[test]
    fn movement_resets_the_static_counter() {
        let mut optimizer = CameraOptimizer::new(settings());
        optimizer.update(Vec3::ZERO, Vec3::NEG_Z);
        hold_still(&mut optimizer, 4);
        assert!(optimizer.should_skip_compute());

        optimizer.update(Vec3::new(1.0, 0.0, 0.0), Vec3::NEG_Z);
        assert!(!optimizer.should_skip_compute());
    }

    #[test]
    fn rotation_alone_counts_as_movement() {
        let mut optimizer = CameraOptimizer::new(settings());
        optimizer.update(Vec3::ZERO, Vec3::NEG_Z);
        hold_still(&mut optimizer, 4);
        assert!(optimizer.should_skip_compute());

        optimizer.update(Vec3::ZERO, Vec3::new(0.1, 0.0, -1.0).normalize());
        assert!(!optimizer.should_skip_compute());
    }

    #[test]
    fn skip_streaks_are_bounded() {
        let mut optimizer = CameraOptimizer::new(settings());
        optimizer.update(Vec3::ZERO, Vec3::NEG_Z);
        hold_still(&mut optimizer, 4);

        for _ in 0..5 {
            assert!(optimizer.should_skip_compute());
            optimizer.record_compute_skipped();
        }
        assert!(!optimizer.should_skip_compute());
        assert!(optimizer.was_last_frame_skipped());

        optimizer.record_compute_executed();
        assert!(!optimizer.was_last_frame_skipped());
        assert!(optimizer.should_skip_compute());
    }

    #[test]
    fn force_overrides_stationarity_once() {
        let mut optimizer = CameraOptimizer::new(settings());
        optimizer.update(Vec3::ZERO, Vec3::NEG_Z);
        hold_still(&mut optimizer, 4);

        optimizer.force_next_update();
        assert!(!optimizer.should_skip_compute());

        optimizer.record_compute_executed();
        assert!(optimizer.should_skip_compute());
    }

    #[test]
    fn disabled_optimizer_never_skips() {
        let mut optimizer = CameraOptimizer::new(settings());
        optimizer.update(Vec3::ZERO, Vec3::NEG_Z);
        hold_still(&mut optimizer, 10);

        optimizer.set_enabled(false);
        assert!(!optimizer.should_skip_compute());

        optimizer.set_enabled(true);
        optimizer.record_compute_executed();
        assert!(optimizer.should_skip_compute());
    }
}
