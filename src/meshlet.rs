//! Fixed triangle-grid patch instanced once per leaf in meshlet mode.
//!
//! The patch is a right triangle in barycentric space, uniformly subdivided
//! into `4^s` sub-triangles. The vertex shader maps the barycentric
//! coordinates onto the corners of the leaf triangle it instances.

use bevy::math::Vec2;

pub struct MeshletGeometry {
    /// Barycentric positions, `(u, v)` with `u + v <= 1`.
    pub vertices: Vec<Vec2>,
    pub indices: Vec<u32>,
}

pub fn index_count(subdivision: u32) -> u32 {
    3 << (2 * subdivision)
}

pub fn vertex_count(subdivision: u32) -> u32 {
    let n = 1 << subdivision;
    (n + 1) * (n + 2) / 2
}

pub fn build(subdivision: u32) -> MeshletGeometry {
    let n = 1u32 << subdivision;

    // Row j holds n + 1 - j vertices.
    let row_offset = |j: u32| j * (n + 1) - j.saturating_sub(1) * j / 2;
    let vertex = |i: u32, j: u32| row_offset(j) + i;

    let mut vertices = Vec::with_capacity(vertex_count(subdivision) as usize);
    for j in 0..=n {
        for i in 0..=n - j {
            vertices.push(Vec2::new(i as f32 / n as f32, j as f32 / n as f32));
        }
    }

    let mut indices = Vec::with_capacity(index_count(subdivision) as usize);
    for j in 0..n {
        for i in 0..n - j {
            indices.extend([vertex(i, j), vertex(i + 1, j), vertex(i, j + 1)]);

            if i + 1 < n - j {
                indices.extend([vertex(i + 1, j), vertex(i + 1, j + 1), vertex(i, j + 1)]);
            }
        }
    }

    MeshletGeometry { vertices, indices }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_match_the_subdivision() {
        for subdivision in 0..4 {
            let geometry = build(subdivision);
            assert_eq!(geometry.indices.len() as u32, index_count(subdivision));
            assert_eq!(geometry.vertices.len() as u32, vertex_count(subdivision));
        }
    }

    #[test]
    fn indices_stay_in_bounds_and_cover_the_patch() {
        let geometry = build(3);
        let vertex_count = geometry.vertices.len() as u32;

        for &index in &geometry.indices {
            assert!(index < vertex_count);
        }

        for vertex in &geometry.vertices {
            assert!(vertex.x + vertex.y <= 1.0 + f32::EPSILON);
        }

        // Every sub-triangle has the same area, summing to one half.
        let area: f32 = geometry
            .indices
            .chunks(3)
            .map(|tri| {
                let [a, b, c] = [
                    geometry.vertices[tri[0] as usize],
                    geometry.vertices[tri[1] as usize],
                    geometry.vertices[tri[2] as usize],
                ];
                ((b - a).perp_dot(c - a) / 2.0).abs()
            })
            .sum();
        assert!((area - 0.5).abs() < 1.0e-5);
    }
}
