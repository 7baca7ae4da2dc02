use std::path::Path;

use rayon::prelude::*;
use serde_derive::Deserialize;
use tracing::{debug, info, warn};

use crate::bounds::Box3Df;
use crate::camera::{CameraIntrinsics, PinholeCamera};
use crate::error::{Fuse3dError, Result};
use crate::geometry::{Mesh, VertexAttribute};
use crate::pipeline::{MultiViewFrame, PipelineParams};
use crate::tessellation::DepthTessellator;
use crate::transform::Transform;
use crate::voxel::{
    CameraSurface, FusionStrategy, FusionSummary, MarchingCubes, VoxelField, VoxelGrid,
};

/// Parameters of [`DepthTessellator`].
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct TessellationParams {
    pub block_size: usize,
    pub max_edge_length: f32,
}

impl Default for TessellationParams {
    fn default() -> Self {
        Self {
            block_size: 4,
            max_edge_length: 0.1,
        }
    }
}

impl From<&TessellationParams> for DepthTessellator {
    fn from(params: &TessellationParams) -> Self {
        DepthTessellator::default()
            .block_size(params.block_size)
            .max_edge_length(params.max_edge_length)
    }
}

fn default_intrinsics() -> CameraIntrinsics {
    CameraIntrinsics::from_fov(60.0, 640, 480)
}

/// Everything a reconstruction session needs besides the camera poses.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ReconstructionParams {
    /// Distance between neighbouring voxels.
    pub voxel_resolution: f32,
    /// Cells added around the first frame's extents on every side.
    pub padding: usize,
    pub strategy: FusionStrategy,
    pub tessellation: TessellationParams,
    /// Shared by every camera of the rig.
    pub intrinsics: CameraIntrinsics,
    pub pipeline: PipelineParams,
}

impl Default for ReconstructionParams {
    fn default() -> Self {
        Self {
            voxel_resolution: 0.02,
            padding: 2,
            strategy: FusionStrategy::default(),
            tessellation: TessellationParams::default(),
            intrinsics: default_intrinsics(),
            pipeline: PipelineParams::default(),
        }
    }
}

impl ReconstructionParams {
    /// Loads the parameters from a JSON file. Missing fields take their default.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    pub fn voxel_resolution(mut self, value: f32) -> Self {
        self.voxel_resolution = value;
        self
    }

    pub fn padding(mut self, value: usize) -> Self {
        self.padding = value;
        self
    }

    pub fn strategy(mut self, value: FusionStrategy) -> Self {
        self.strategy = value;
        self
    }

    pub fn tessellation(mut self, value: TessellationParams) -> Self {
        self.tessellation = value;
        self
    }

    pub fn intrinsics(mut self, value: CameraIntrinsics) -> Self {
        self.intrinsics = value;
        self
    }
}

/// Fuses the multi-view frames of a camera rig into coloured meshes.
///
/// The voxel grid is allocated by the first frame that yields any surface and is kept,
/// with its bounds, for the rest of the session. Later frames overwrite the cells they
/// reach.
pub struct Reconstructor {
    cameras: Vec<PinholeCamera>,
    tessellator: DepthTessellator,
    params: ReconstructionParams,
    grid: Option<Box<dyn VoxelGrid>>,
}

impl Reconstructor {
    /// # Arguments
    ///
    /// * `params` - Session parameters.
    /// * `camera_to_world` - One pose per camera, in rig order.
    pub fn new(params: ReconstructionParams, camera_to_world: Vec<Transform>) -> Self {
        let cameras = camera_to_world
            .into_iter()
            .map(|pose| PinholeCamera::new(params.intrinsics.clone(), pose))
            .collect();
        Self {
            cameras,
            tessellator: DepthTessellator::from(&params.tessellation),
            params,
            grid: None,
        }
    }

    pub fn cameras(&self) -> &[PinholeCamera] {
        &self.cameras
    }

    pub fn params(&self) -> &ReconstructionParams {
        &self.params
    }

    /// The session grid, `None` until a frame produced some surface.
    pub fn grid(&self) -> Option<&dyn VoxelGrid> {
        self.grid.as_deref()
    }

    fn camera_surfaces(&self, frame: MultiViewFrame) -> Vec<(CameraSurface, Box3Df)> {
        let uses_bvh = self.params.strategy.uses_bvh();
        frame
            .cameras
            .into_par_iter()
            .zip(self.cameras.par_iter())
            .map(|(views, camera)| {
                let world = self
                    .tessellator
                    .tessellate(&views.depth.view(), &camera.intrinsics)
                    .transformed(&camera.camera_to_world);
                let mut surface = CameraSurface::new(world.mesh).with_colour(views.rgb);
                if uses_bvh {
                    surface = surface.with_bvh();
                }
                (surface, world.extents)
            })
            .collect()
    }

    fn allocate_grid(&self, extents: &Box3Df) -> Result<Box<dyn VoxelGrid>> {
        let field =
            VoxelField::enclosing(extents, self.params.voxel_resolution, self.params.padding)?;
        info!(
            size = field.size(),
            resolution = field.resolution(),
            start = ?field.start(),
            strategy = ?self.params.strategy,
            "allocated voxel grid"
        );
        Ok(self.params.strategy.create(field))
    }

    /// Fuses every camera of the frame, in camera order, and extracts the surface.
    ///
    /// # Returns
    ///
    /// The coloured mesh of the session grid after this frame. Empty while no frame has
    /// produced any surface.
    pub fn reconstruct(&mut self, frame: MultiViewFrame) -> Result<Mesh> {
        if frame.cameras.len() != self.cameras.len() {
            return Err(Fuse3dError::invalid_parameter(format!(
                "frame {} has {} cameras, the rig has {}",
                frame.index,
                frame.cameras.len(),
                self.cameras.len()
            )));
        }
        let index = frame.index;
        let surfaces = self.camera_surfaces(frame);

        if self.grid.is_none() {
            let extents = surfaces
                .iter()
                .fold(Box3Df::empty(), |acc, (_, extents)| acc.union(extents));
            if extents.is_empty() {
                warn!(frame = index, "no surface to allocate the voxel grid from");
                return Ok(Mesh::new(VertexAttribute::Colours));
            }
            self.grid = Some(self.allocate_grid(&extents)?);
        }
        let grid = match self.grid.as_mut() {
            Some(grid) => grid,
            None => return Ok(Mesh::new(VertexAttribute::Colours)),
        };

        let mut total = FusionSummary::default();
        let cameras = surfaces.iter().zip(self.cameras.iter());
        for (camera_id, ((surface, _), camera)) in cameras.enumerate() {
            let summary = grid.fuse_mesh(surface, &camera.camera_to_world);
            debug!(
                frame = index,
                camera = camera_id,
                triangles = surface.mesh.len_triangles(),
                fused = summary.fused,
                "fused camera"
            );
            total += summary;
        }

        let mesh = MarchingCubes::extract(grid.field());
        info!(
            frame = index,
            candidates = total.candidates,
            fused = total.fused,
            triangles = mesh.len_triangles(),
            "reconstructed frame"
        );
        Ok(mesh)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use image::{Rgba, RgbaImage};
    use ndarray::Array2;

    use super::*;
    use crate::pipeline::CameraFrame;
    use crate::unit_test::plane_depth;

    fn params() -> ReconstructionParams {
        ReconstructionParams::default()
            .voxel_resolution(0.1)
            .padding(1)
            .intrinsics(CameraIntrinsics::from_simple_intrinsic(10.0, 10.0, 4.0, 4.0))
            .tessellation(TessellationParams {
                block_size: 4,
                max_edge_length: 1.0,
            })
    }

    /// Plane tilted along x so it crosses the voxel layers between grid points.
    fn tilted_frame(index: usize) -> MultiViewFrame {
        let depth = Array2::from_shape_fn((9, 9), |(_, x)| 1.0 + 0.02 * x as f32);
        MultiViewFrame {
            index,
            cameras: vec![CameraFrame {
                rgb: RgbaImage::from_pixel(9, 9, Rgba([255, 0, 0, 255])),
                depth,
            }],
        }
    }

    #[test]
    fn should_reconstruct_coloured_surface() {
        for strategy in [FusionStrategy::Bvh, FusionStrategy::BruteForce] {
            let mut reconstructor =
                Reconstructor::new(params().strategy(strategy), vec![Transform::eye()]);
            assert!(reconstructor.grid().is_none());

            let mesh = reconstructor.reconstruct(tilted_frame(0)).unwrap();
            assert!(!mesh.is_empty());
            assert!(mesh.is_consistent());
            assert_eq!(mesh.attribute, VertexAttribute::Colours);
            for i in 0..mesh.len_vertices() {
                let z = mesh.position(i)[2];
                assert!((0.85..=1.35).contains(&z), "vertex at z = {z}");
                let colour = mesh.attribute_of(i);
                assert_relative_eq!(colour[0], 1.0);
                assert_relative_eq!(colour[1], 0.0);
                assert_relative_eq!(colour[3], 1.0);
            }
            assert!(!reconstructor.grid().unwrap().seen_voxels().is_empty());
        }
    }

    #[test]
    fn grid_is_allocated_once() {
        let mut reconstructor = Reconstructor::new(params(), vec![Transform::eye()]);
        reconstructor.reconstruct(tilted_frame(0)).unwrap();
        let (start, size) = {
            let grid = reconstructor.grid().unwrap();
            (grid.start(), grid.size())
        };

        let far = MultiViewFrame {
            index: 1,
            cameras: vec![CameraFrame {
                rgb: RgbaImage::from_pixel(9, 9, Rgba([0, 0, 255, 255])),
                depth: plane_depth(9, 9, 3.0),
            }],
        };
        reconstructor.reconstruct(far).unwrap();
        let grid = reconstructor.grid().unwrap();
        assert_eq!(grid.start(), start);
        assert_eq!(grid.size(), size);
    }

    #[test]
    fn empty_frames_do_not_allocate() {
        let mut reconstructor = Reconstructor::new(params(), vec![Transform::eye()]);
        let frame = MultiViewFrame {
            index: 0,
            cameras: vec![CameraFrame {
                rgb: RgbaImage::new(9, 9),
                depth: plane_depth(9, 9, 0.0),
            }],
        };
        assert!(reconstructor.reconstruct(frame).unwrap().is_empty());
        assert!(reconstructor.grid().is_none());
    }

    #[test]
    fn should_reject_camera_mismatch() {
        let mut reconstructor =
            Reconstructor::new(params(), vec![Transform::eye(), Transform::eye()]);
        assert!(matches!(
            reconstructor.reconstruct(tilted_frame(0)),
            Err(Fuse3dError::InvalidParameter(_))
        ));
    }

    #[test]
    fn should_load_params_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        std::fs::write(
            &path,
            r#"{
                "voxel_resolution": 0.05,
                "strategy": "brute_force",
                "tessellation": {"block_size": 2},
                "intrinsics": {"fx": 500.0, "fy": 500.0, "cx": 320.0, "cy": 240.0},
                "pipeline": {"max_backlog": 4}
            }"#,
        )
        .unwrap();

        let params = ReconstructionParams::from_json_file(&path).unwrap();
        assert_eq!(params.voxel_resolution, 0.05);
        assert_eq!(params.padding, 2);
        assert_eq!(params.strategy, FusionStrategy::BruteForce);
        assert_eq!(params.tessellation.block_size, 2);
        assert_eq!(params.tessellation.max_edge_length, 0.1);
        assert_eq!(params.intrinsics.fx, 500.0);
        assert_eq!(params.pipeline.max_backlog, 4);
        assert_eq!(params.pipeline.warm_up_frames, 2);

        assert!(matches!(
            ReconstructionParams::from_json_file(dir.path().join("missing.json")),
            Err(Fuse3dError::Io(_))
        ));
    }
}
