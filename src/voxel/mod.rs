//! Signed distance voxel grid: fusion of camera surfaces into the grid and extraction of
//! the zero level set as a coloured mesh.
mod field;
mod fusion;
mod grid;
mod marching_cubes;
pub mod tables;

pub use field::{VoxelField, DEFAULT_COLOUR};
pub use fusion::{candidate_cells, signed_distance, CameraSurface, FusionSummary};
pub use grid::{BruteForceGrid, BvhGrid, FusionStrategy, VoxelGrid};
pub use marching_cubes::MarchingCubes;
