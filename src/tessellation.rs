use nalgebra::Vector3;
use ndarray::ArrayView2;

use crate::bounds::Box3Df;
use crate::camera::CameraIntrinsics;
use crate::geometry::{Mesh, MeshBuilder, Triangle, VertexAttribute};
use crate::transform::Transform;

/// Depth map decoded from a single channel float image, shape is (height, width).
pub type DepthMap = ndarray::Array2<f32>;

/// A tessellated depth image and the extents of its vertices.
#[derive(Clone, Debug)]
pub struct TessellatedMesh {
    pub mesh: Mesh,
    pub extents: Box3Df,
}

impl TessellatedMesh {
    /// Moves the mesh into another frame (usually camera to world) and recomputes extents.
    pub fn transformed(&self, transform: &Transform) -> Self {
        let mesh = self.mesh.transformed(transform);
        let extents = mesh.bounds();
        Self { mesh, extents }
    }
}

#[derive(Debug, Clone)]
/// Turns depth images into triangle meshes, two triangles per pixel block.
pub struct DepthTessellator {
    block_size: usize,
    max_edge_length: f32,
}

impl Default for DepthTessellator {
    fn default() -> Self {
        Self {
            block_size: 4,
            max_edge_length: 0.1,
        }
    }
}

impl DepthTessellator {
    /// Side in pixels of the blocks that become a quad. Clamped to at least one pixel.
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    /// Triangles with an edge at least this long are dropped. They usually bridge a depth
    /// discontinuity between foreground and background.
    pub fn max_edge_length(mut self, length: f32) -> Self {
        self.max_edge_length = length;
        self
    }

    /// Tessellates a depth image in camera space.
    ///
    /// # Arguments
    ///
    /// * `depth` - Depth map in metric units, zero or non finite for missing measurements.
    /// * `intrinsics` - Pinhole parameters of the camera that produced the image.
    ///
    /// # Returns
    ///
    /// The deduplicated mesh, with texture coordinates, and its extents.
    pub fn tessellate(
        &self,
        depth: &ArrayView2<f32>,
        intrinsics: &CameraIntrinsics,
    ) -> TessellatedMesh {
        let (height, width) = depth.dim();
        let mut builder = MeshBuilder::new(VertexAttribute::TextureCoordinates);
        let mut extents = Box3Df::empty();
        let step = self.block_size;

        let corner = |x: usize, y: usize| -> Option<Vector3<f32>> {
            if x >= width || y >= height {
                return None;
            }
            let z = depth[[y, x]];
            if z.is_finite() && z > 0.0 {
                Some(intrinsics.backproject(x as f32, y as f32, z))
            } else {
                None
            }
        };

        for y in (0..height).step_by(step) {
            for x in (0..width).step_by(step) {
                let top_left = corner(x, y);
                let top_right = corner(x + step, y);
                let bottom_left = corner(x, y + step);
                let bottom_right = corner(x + step, y + step);

                // Wound so that normals face the camera.
                for face in [
                    [top_left, bottom_left, top_right],
                    [top_right, bottom_left, bottom_right],
                ] {
                    if let [Some(v0), Some(v1), Some(v2)] = face {
                        let triangle = Triangle::new(v0, v1, v2);
                        if triangle.has_edge_longer_than(self.max_edge_length) {
                            continue;
                        }
                        let normal = triangle.normal();
                        let ids = [v0, v1, v2].map(|v| {
                            extents.add_point(&v);
                            let uv = texture_coordinate(&v, intrinsics, width, height);
                            builder.add_vertex(&v, &normal, &uv)
                        });
                        builder.add_triangle(ids);
                    }
                }
            }
        }

        TessellatedMesh {
            mesh: builder.build(),
            extents,
        }
    }
}

/// Planar projection of a camera space point onto the image, normalized by the image size.
fn texture_coordinate(
    point: &Vector3<f32>,
    intrinsics: &CameraIntrinsics,
    width: usize,
    height: usize,
) -> [f32; 2] {
    let (u, v) = intrinsics.project(point);
    [u / width as f32, v / height as f32]
}
