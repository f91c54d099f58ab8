use crate::cbt::{bit_heap::BitHeap, dispatch::GeometryMode};
use bevy::{prelude::*, utils::HashMap};
use std::ops::{Deref, DerefMut};

/// Marker for terrain entities.
#[derive(Clone, Copy, Component)]
#[require(Transform, Visibility)]
pub struct Terrain;

/// Stores a component of type `C` for each terrain entity.
#[derive(Resource)]
pub struct TerrainComponents<C>(pub HashMap<Entity, C>);

impl<C> Deref for TerrainComponents<C> {
    type Target = HashMap<Entity, C>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<C> DerefMut for TerrainComponents<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<C> Default for TerrainComponents<C> {
    fn default() -> Self {
        Self(HashMap::default())
    }
}

/// Configuration of one terrain. The tree shape and the geometry mode are
/// fixed for the terrain's lifetime; changing `max_depth` requires
/// recreating the terrain entity.
#[derive(Clone, Debug, Component)]
pub struct TerrainConfig {
    /// Depth ceiling of the subdivision tree, bounding the triangle count
    /// at `2^max_depth`.
    pub max_depth: u32,
    /// Floor below which leaves never merge.
    pub min_depth: u32,
    /// Uniform subdivision level the tree is seeded with.
    pub init_depth: u32,
    /// Side length of the terrain in world units.
    pub side_length: f32,
    pub height_scale: f32,
    pub geometry_mode: GeometryMode,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            max_depth: 20,
            min_depth: 6,
            init_depth: 6,
            side_length: 1024.0,
            height_scale: 100.0,
            geometry_mode: GeometryMode::Direct,
        }
    }
}

impl TerrainConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            (BitHeap::MIN_MAX_DEPTH..=BitHeap::MAX_MAX_DEPTH).contains(&self.max_depth),
            "max_depth {} outside the supported range {}..={}",
            self.max_depth,
            BitHeap::MIN_MAX_DEPTH,
            BitHeap::MAX_MAX_DEPTH,
        );
        anyhow::ensure!(
            self.min_depth <= self.max_depth && self.init_depth <= self.max_depth,
            "min_depth and init_depth must not exceed max_depth"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_bounds() {
        assert!(TerrainConfig::default().validate().is_ok());

        let too_deep = TerrainConfig {
            max_depth: 29,
            ..default()
        };
        assert!(too_deep.validate().is_err());

        let inverted = TerrainConfig {
            max_depth: 10,
            init_depth: 12,
            ..default()
        };
        assert!(inverted.validate().is_err());
    }
}
