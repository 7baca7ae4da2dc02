//! Mesh primitives shared by tessellation, the BVH and marching cubes.
mod triangle;
pub use triangle::Triangle;

pub mod layout;
pub use layout::{LayoutAttribute, MeshLayout};

mod mesh;
pub use mesh::{Mesh, MeshBuilder, VertexAttribute, VertexKey};
