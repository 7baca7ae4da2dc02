use std::collections::HashSet;
use std::ops::{AddAssign, RangeInclusive};

use image::RgbaImage;
use itertools::iproduct;
use nalgebra::Vector3;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use tracing::debug;

use super::field::DEFAULT_COLOUR;
use super::grid::VoxelGrid;
use super::VoxelField;
use crate::bounds::Box3Df;
use crate::bvh::{Bvh, Ray, RayHit};
use crate::geometry::{Mesh, VertexAttribute};
use crate::transform::Transform;

/// A camera's world space mesh ready to be fused: the triangles, their hierarchy and
/// optionally the colour image the texture coordinates refer to.
#[derive(Clone, Debug)]
pub struct CameraSurface {
    pub mesh: Mesh,
    pub bvh: Option<Bvh>,
    pub colour: Option<RgbaImage>,
}

impl CameraSurface {
    pub fn new(mesh: Mesh) -> Self {
        Self {
            mesh,
            bvh: None,
            colour: None,
        }
    }

    /// Builds the hierarchy over the mesh triangles.
    pub fn with_bvh(mut self) -> Self {
        self.bvh = Some(Bvh::build(&self.mesh.positions, &self.mesh.indices));
        self
    }

    pub fn with_colour(mut self, image: RgbaImage) -> Self {
        self.colour = Some(image);
        self
    }

    /// Every triangle hit by the ray, tested one by one.
    pub fn for_each_hit_brute_force(&self, ray: &Ray, visit: &mut dyn FnMut(RayHit)) {
        for obj_id in 0..self.mesh.len_triangles() {
            if let Some((t, point)) = ray.intersect_triangle(&self.mesh.triangle(obj_id)) {
                visit(RayHit { t, point, obj_id });
            }
        }
    }

    /// Colour of the camera image under a hit, looked up with the texture coordinates
    /// interpolated at the hit point.
    pub fn colour_at(&self, hit: &RayHit) -> [u8; 4] {
        let image = match &self.colour {
            Some(image) if self.mesh.attribute == VertexAttribute::TextureCoordinates => image,
            _ => return DEFAULT_COLOUR,
        };
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return DEFAULT_COLOUR;
        }

        let weights = self.mesh.triangle(hit.obj_id).barycentric(&hit.point);
        let mut uv = [0.0f32; 2];
        for (vertex, weight) in self
            .mesh
            .triangle_indices(hit.obj_id)
            .iter()
            .zip(weights.iter())
        {
            let attr = self.mesh.attribute_of(*vertex);
            uv[0] += attr[0] * weight;
            uv[1] += attr[1] * weight;
        }

        let x = (uv[0] * width as f32).floor().clamp(0.0, (width - 1) as f32) as u32;
        let y = (uv[1] * height as f32).floor().clamp(0.0, (height - 1) as f32) as u32;
        image.get_pixel(x, y).0
    }
}

/// Counters of one fusion pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FusionSummary {
    /// Cells close enough to a triangle to be ray cast.
    pub candidates: usize,
    /// Candidates whose ray hit the surface and were written.
    pub fused: usize,
}

impl AddAssign for FusionSummary {
    fn add_assign(&mut self, other: Self) {
        self.candidates += other.candidates;
        self.fused += other.fused;
    }
}

/// Range of cells covered by `[min, max]` on one axis, snapped outward and extended by
/// one cell so the cubes starting inside the box are complete.
fn axis_range(field: &VoxelField, min: f32, max: f32, axis: usize) -> Option<RangeInclusive<usize>> {
    let start = field.start()[axis];
    let last = (field.size() - 1) as f32;
    let lo = ((min - start) / field.resolution()).floor();
    let hi = ((max - start) / field.resolution()).ceil() + 1.0;
    if !(lo <= last && hi >= 0.0) {
        return None;
    }
    Some(lo.max(0.0) as usize..=hi.min(last) as usize)
}

fn cells_around(field: &VoxelField, bounds: &Box3Df) -> Option<[RangeInclusive<usize>; 3]> {
    Some([
        axis_range(field, bounds.min[0], bounds.max[0], 0)?,
        axis_range(field, bounds.min[1], bounds.max[1], 1)?,
        axis_range(field, bounds.min[2], bounds.max[2], 2)?,
    ])
}

/// Cells near the mesh: for every triangle, the cells inside its bounding box snapped
/// outward to the grid plus their `+1` neighbours, clamped to the grid. Sorted by cell.
pub fn candidate_cells(field: &VoxelField, mesh: &Mesh) -> Vec<[usize; 3]> {
    let mut cells = (0..mesh.len_triangles())
        .into_par_iter()
        .fold(HashSet::new, |mut cells, tri_id| {
            if let Some([xs, ys, zs]) = cells_around(field, &mesh.triangle(tri_id).bounds()) {
                cells.extend(iproduct!(xs, ys, zs).map(|(x, y, z)| [x, y, z]));
            }
            cells
        })
        .reduce(HashSet::new, |mut a, b| {
            a.extend(b);
            a
        })
        .into_iter()
        .collect::<Vec<_>>();
    cells.sort_unstable();
    cells
}

/// Signed distance from `voxel` to the nearest surface hit along the ray cast from the
/// camera through it. Negative when the voxel lies behind the surface.
pub fn signed_distance<G>(
    grid: &G,
    surface: &CameraSurface,
    camera: &Vector3<f32>,
    voxel: &Vector3<f32>,
) -> Option<(f32, RayHit)>
where
    G: VoxelGrid + ?Sized,
{
    let ray = Ray::towards(*camera, voxel)?;
    let mut nearest: Option<(OrderedFloat<f32>, RayHit)> = None;
    grid.cast(surface, &ray, &mut |hit| {
        let distance = OrderedFloat((voxel - hit.point).norm());
        if nearest.map_or(true, |(best, _)| distance < best) {
            nearest = Some((distance, hit));
        }
    });

    nearest.map(|(distance, hit)| {
        let behind = (voxel - camera).norm() > (hit.point - camera).norm();
        let value = if behind { -distance.0 } else { distance.0 };
        (value, hit)
    })
}

/// Fuses one camera surface into the grid. Samples are computed in parallel and written
/// afterwards, so each candidate cell is written at most once per pass.
pub(crate) fn fuse<G>(grid: &mut G, surface: &CameraSurface, camera_to_world: &Transform) -> FusionSummary
where
    G: VoxelGrid + ?Sized,
{
    if surface.mesh.is_empty() {
        return FusionSummary::default();
    }
    let camera = camera_to_world.translation();

    let (num_candidates, samples) = {
        let grid = &*grid;
        let field = grid.field();
        let candidates = candidate_cells(field, &surface.mesh);
        let samples = candidates
            .par_iter()
            .filter_map(|cell| {
                let voxel = field.world_of(*cell);
                signed_distance(grid, surface, &camera, &voxel)
                    .map(|(value, hit)| (field.flat_index(*cell), value, surface.colour_at(&hit)))
            })
            .collect::<Vec<_>>();
        (candidates.len(), samples)
    };

    let field = grid.field_mut();
    for (index, value, colour) in samples.iter() {
        field.write(*index, *value, Some(*colour));
    }

    let summary = FusionSummary {
        candidates: num_candidates,
        fused: samples.len(),
    };
    debug!(
        candidates = summary.candidates,
        fused = summary.fused,
        seen = field.num_seen(),
        "fused camera surface"
    );
    summary
}
