pub mod bounds;
pub mod bvh;
pub mod camera;
pub mod error;
pub mod geometry;
pub mod io;
pub mod pipeline;
pub mod reconstruction;
pub mod tessellation;
pub mod transform;
pub mod voxel;

#[cfg(test)]
mod unit_test;
