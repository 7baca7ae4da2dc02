use nalgebra::Vector3;
use rayon::prelude::*;
use tracing::debug;

use super::tables::{CUBE_CORNERS, CUBE_EDGES, TRIANGLE_TABLE};
use super::VoxelField;
use crate::geometry::{Mesh, MeshBuilder, VertexAttribute};

#[derive(Clone, Copy, Debug)]
struct SurfaceVertex {
    position: Vector3<f32>,
    normal: Vector3<f32>,
    colour: [f32; 4],
}

/// Where the zero crossing lies between two corner values, as a fraction of the edge.
fn crossing(a: f32, b: f32) -> f32 {
    if a == b {
        0.5
    } else {
        -a / (b - a)
    }
}

fn colour_to_f32(colour: [u8; 4]) -> [f32; 4] {
    colour.map(|c| c as f32 / 255.0)
}

/// Field gradient by central differences, one-sided at the grid bounds. Unfused
/// neighbours are replaced by the cell's own value.
fn gradient(field: &VoxelField, cell: [usize; 3]) -> Vector3<f32> {
    let center = field.distance(cell);
    let sample = |c: [usize; 3]| {
        let value = field.distance(c);
        if value.is_finite() {
            value
        } else {
            center
        }
    };

    let mut gradient = Vector3::zeros();
    for axis in 0..3 {
        let (mut lo, mut hi) = (cell, cell);
        lo[axis] = cell[axis].saturating_sub(1);
        hi[axis] = (cell[axis] + 1).min(field.size() - 1);
        if lo[axis] == hi[axis] {
            continue;
        }
        gradient[axis] =
            (sample(hi) - sample(lo)) / ((hi[axis] - lo[axis]) as f32 * field.resolution());
    }
    gradient
}

fn normalized_or_zero(v: Vector3<f32>) -> Vector3<f32> {
    v.try_normalize(0.0).unwrap_or_else(Vector3::zeros)
}

/// Vertex on the edge joining two corners. The endpoints are taken in cell order so
/// neighbouring cubes compute bit identical vertices for their shared edges.
fn edge_vertex(field: &VoxelField, mut start: [usize; 3], mut end: [usize; 3]) -> SurfaceVertex {
    if end < start {
        std::mem::swap(&mut start, &mut end);
    }
    let t = crossing(field.distance(start), field.distance(end));

    let (p0, p1) = (field.world_of(start), field.world_of(end));
    let (n0, n1) = (gradient(field, start), gradient(field, end));
    let (c0, c1) = (
        colour_to_f32(field.colour(start)),
        colour_to_f32(field.colour(end)),
    );

    let mut colour = [0.0; 4];
    for k in 0..4 {
        colour[k] = c0[k] + (c1[k] - c0[k]) * t;
    }
    SurfaceVertex {
        position: p0 + (p1 - p0) * t,
        normal: normalized_or_zero(n0 + (n1 - n0) * t),
        colour,
    }
}

/// Triangles of the cube whose lowest corner is `cell`.
fn polygonize(field: &VoxelField, cell: [usize; 3]) -> Vec<[SurfaceVertex; 3]> {
    if cell.iter().any(|k| k + 1 >= field.size()) {
        return Vec::new();
    }

    let corners = CUBE_CORNERS.map(|offset| {
        [
            cell[0] + offset[0],
            cell[1] + offset[1],
            cell[2] + offset[2],
        ]
    });
    let values = corners.map(|corner| field.distance(corner));
    if values.iter().any(|v| !v.is_finite()) {
        return Vec::new();
    }

    let case = values
        .iter()
        .enumerate()
        .filter(|(_, v)| **v < 0.0)
        .fold(0usize, |case, (i, _)| case | (1 << i));

    TRIANGLE_TABLE[case]
        .chunks_exact(3)
        .take_while(|edges| edges[0] >= 0)
        .map(|edges| {
            let [a, b, c] = [edges[0], edges[1], edges[2]].map(|edge| {
                let [start, end] = CUBE_EDGES[edge as usize];
                edge_vertex(field, corners[start], corners[end])
            });
            // The table winds triangles facing the negative side.
            [a, c, b]
        })
        .collect()
}

/// Extracts the zero level set of a voxel field.
pub struct MarchingCubes;

impl MarchingCubes {
    /// Polygonizes the cube starting at every seen cell. Cubes that leave the grid or
    /// touch an unfused corner are skipped.
    ///
    /// # Returns
    ///
    /// A mesh with gradient normals and per vertex RGBA colours in `[0, 1]`. Identical
    /// vertices are shared.
    pub fn extract(field: &VoxelField) -> Mesh {
        let cells = field.seen_cells().collect::<Vec<_>>();
        let triangles = cells
            .par_iter()
            .flat_map_iter(|cell| polygonize(field, *cell))
            .collect::<Vec<_>>();

        let mut builder = MeshBuilder::new(VertexAttribute::Colours);
        for triangle in triangles.iter() {
            let ids = triangle.map(|v| builder.add_vertex(&v.position, &v.normal, &v.colour));
            // Collapsed when the surface passes exactly through a corner.
            if ids[0] != ids[1] && ids[1] != ids[2] && ids[0] != ids[2] {
                builder.add_triangle(ids);
            }
        }

        let mesh = builder.build();
        debug!(
            cubes = cells.len(),
            vertices = mesh.len_vertices(),
            triangles = mesh.len_triangles(),
            "extracted surface"
        );
        mesh
    }
}
