use nalgebra::Vector3;
use serde_derive::Deserialize;

use super::fusion::{self, CameraSurface, FusionSummary};
use super::VoxelField;
use crate::bvh::{Ray, RayHit};
use crate::transform::Transform;

/// Signed distance grid that camera surfaces can be fused into.
///
/// Implementors own a [`VoxelField`] and decide how rays find the surface triangles.
pub trait VoxelGrid: Send + Sync {
    fn field(&self) -> &VoxelField;

    fn field_mut(&mut self) -> &mut VoxelField;

    /// Calls `visit` for every triangle of the surface hit by `ray`.
    fn cast(&self, surface: &CameraSurface, ray: &Ray, visit: &mut dyn FnMut(RayHit));

    /// Writes the signed distance to `surface` into every nearby cell whose ray from the
    /// camera hits the surface.
    fn fuse_mesh(&mut self, surface: &CameraSurface, camera_to_world: &Transform) -> FusionSummary {
        fusion::fuse(self, surface, camera_to_world)
    }

    fn resolution(&self) -> f32 {
        self.field().resolution()
    }

    fn size(&self) -> usize {
        self.field().size()
    }

    fn start(&self) -> Vector3<f32> {
        self.field().start()
    }

    fn get(&self, world: &Vector3<f32>) -> Option<f32> {
        self.field().get(world)
    }

    fn set(&mut self, world: &Vector3<f32>, value: f32) -> bool {
        self.field_mut().set(world, value)
    }

    fn seen_voxels(&self) -> Vec<Vector3<f32>> {
        self.field().seen_voxels().collect()
    }
}

/// Tests every triangle for every ray.
pub struct BruteForceGrid {
    field: VoxelField,
}

impl BruteForceGrid {
    pub fn new(field: VoxelField) -> Self {
        Self { field }
    }
}

impl VoxelGrid for BruteForceGrid {
    fn field(&self) -> &VoxelField {
        &self.field
    }

    fn field_mut(&mut self) -> &mut VoxelField {
        &mut self.field
    }

    fn cast(&self, surface: &CameraSurface, ray: &Ray, visit: &mut dyn FnMut(RayHit)) {
        surface.for_each_hit_brute_force(ray, visit);
    }
}

/// Traverses the surface hierarchy. Surfaces without one, or with fewer than two
/// triangles, are tested directly.
pub struct BvhGrid {
    field: VoxelField,
}

impl BvhGrid {
    pub fn new(field: VoxelField) -> Self {
        Self { field }
    }
}

impl VoxelGrid for BvhGrid {
    fn field(&self) -> &VoxelField {
        &self.field
    }

    fn field_mut(&mut self) -> &mut VoxelField {
        &mut self.field
    }

    fn cast(&self, surface: &CameraSurface, ray: &Ray, visit: &mut dyn FnMut(RayHit)) {
        match &surface.bvh {
            Some(bvh) if bvh.num_leaves() >= 2 => bvh.for_each_hit(&surface.mesh, ray, visit),
            _ => surface.for_each_hit_brute_force(ray, visit),
        }
    }
}

/// How rays find the surface during fusion.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FusionStrategy {
    BruteForce,
    #[default]
    Bvh,
}

impl FusionStrategy {
    pub fn create(self, field: VoxelField) -> Box<dyn VoxelGrid> {
        match self {
            FusionStrategy::BruteForce => Box::new(BruteForceGrid::new(field)),
            FusionStrategy::Bvh => Box::new(BvhGrid::new(field)),
        }
    }

    /// Whether surfaces should carry a hierarchy before being fused.
    pub fn uses_bvh(&self) -> bool {
        matches!(self, FusionStrategy::Bvh)
    }
}
