use std::collections::HashMap;

use nalgebra::Vector3;

use super::layout::{self, MeshLayout};
use super::Triangle;
use crate::bounds::Box3Df;
use crate::transform::Transform;

/// The third per-vertex attribute carried by a mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertexAttribute {
    /// UV coordinates into the camera image, used by tessellated depth meshes.
    TextureCoordinates,
    /// RGBA colour in `[0, 1]`, used by the fused output mesh.
    Colours,
}

impl VertexAttribute {
    pub fn num_components(&self) -> usize {
        match self {
            VertexAttribute::TextureCoordinates => 2,
            VertexAttribute::Colours => 4,
        }
    }

    pub fn layout_name(&self) -> &'static str {
        match self {
            VertexAttribute::TextureCoordinates => layout::TEXTURE_COORDINATES,
            VertexAttribute::Colours => layout::COLOURS,
        }
    }
}

/// Indexed triangle mesh stored as flat float arrays.
#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    /// xyz per vertex.
    pub positions: Vec<f32>,
    /// xyz per vertex.
    pub normals: Vec<f32>,
    /// `attribute.num_components()` floats per vertex.
    pub attributes: Vec<f32>,
    pub attribute: VertexAttribute,
    /// Three indices per triangle, in draw order.
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new(attribute: VertexAttribute) -> Self {
        Self {
            positions: Vec::new(),
            normals: Vec::new(),
            attributes: Vec::new(),
            attribute,
            indices: Vec::new(),
        }
    }

    pub fn len_vertices(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn len_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn position(&self, index: usize) -> Vector3<f32> {
        Vector3::new(
            self.positions[index * 3],
            self.positions[index * 3 + 1],
            self.positions[index * 3 + 2],
        )
    }

    pub fn normal(&self, index: usize) -> Vector3<f32> {
        Vector3::new(
            self.normals[index * 3],
            self.normals[index * 3 + 1],
            self.normals[index * 3 + 2],
        )
    }

    /// The per-vertex attribute slice of a vertex.
    pub fn attribute_of(&self, index: usize) -> &[f32] {
        let n = self.attribute.num_components();
        &self.attributes[index * n..(index + 1) * n]
    }

    pub fn triangle(&self, tri_id: usize) -> Triangle {
        Triangle::from_indexed(&self.positions, &self.indices, tri_id)
    }

    pub fn triangle_indices(&self, tri_id: usize) -> [usize; 3] {
        [
            self.indices[tri_id * 3] as usize,
            self.indices[tri_id * 3 + 1] as usize,
            self.indices[tri_id * 3 + 2] as usize,
        ]
    }

    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        (0..self.len_triangles()).map(|tri_id| self.triangle(tri_id))
    }

    /// Axis-aligned extents of the vertices.
    pub fn bounds(&self) -> Box3Df {
        self.positions
            .chunks_exact(3)
            .fold(Box3Df::empty(), |mut bounds, p| {
                bounds.add_point(&Vector3::new(p[0], p[1], p[2]));
                bounds
            })
    }

    /// Checks that every per-vertex array describes the same number of vertices and that
    /// the indices reference existing vertices.
    pub fn is_consistent(&self) -> bool {
        let n = self.len_vertices();
        self.positions.len() % 3 == 0
            && self.normals.len() == n * 3
            && self.attributes.len() == n * self.attribute.num_components()
            && self.indices.len() % 3 == 0
            && self.indices.iter().all(|i| (*i as usize) < n)
    }

    /// Layout of the buffer returned by [`Mesh::interleaved`].
    pub fn layout(&self) -> MeshLayout {
        MeshLayout::new()
            .with_attribute(layout::POSITIONS, 3)
            .with_attribute(layout::NORMALS, 3)
            .with_attribute(
                self.attribute.layout_name(),
                self.attribute.num_components(),
            )
    }

    /// Flat buffer with positions, normals and the attribute interleaved per vertex.
    pub fn interleaved(&self) -> Vec<f32> {
        let n_attr = self.attribute.num_components();
        let mut buffer = Vec::with_capacity(self.len_vertices() * (6 + n_attr));
        for ((position, normal), attr) in self
            .positions
            .chunks_exact(3)
            .zip(self.normals.chunks_exact(3))
            .zip(self.attributes.chunks_exact(n_attr))
        {
            buffer.extend_from_slice(position);
            buffer.extend_from_slice(normal);
            buffer.extend_from_slice(attr);
        }
        buffer
    }

    /// Copy of the mesh with positions moved by `transform` and normals rotated.
    pub fn transformed(&self, transform: &Transform) -> Mesh {
        let mut mesh = self.clone();
        for (position, normal) in mesh
            .positions
            .chunks_exact_mut(3)
            .zip(mesh.normals.chunks_exact_mut(3))
        {
            let p = transform.transform_point(&Vector3::new(position[0], position[1], position[2]));
            let n = transform.rotate_vector(&Vector3::new(normal[0], normal[1], normal[2]));
            position.copy_from_slice(p.as_slice());
            normal.copy_from_slice(n.as_slice());
        }
        mesh
    }
}

/// Hash key identifying a vertex by the exact bit patterns of its floats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexKey([u32; 10]);

impl VertexKey {
    pub fn new(position: &Vector3<f32>, normal: &Vector3<f32>, attribute: &[f32]) -> Self {
        let mut key = [0u32; 10];
        for i in 0..3 {
            key[i] = position[i].to_bits();
            key[3 + i] = normal[i].to_bits();
        }
        for (slot, value) in key[6..].iter_mut().zip(attribute) {
            *slot = value.to_bits();
        }
        Self(key)
    }
}

/// Incremental mesh construction that collapses identical vertices into one index.
pub struct MeshBuilder {
    mesh: Mesh,
    lookup: HashMap<VertexKey, u32>,
}

impl MeshBuilder {
    pub fn new(attribute: VertexAttribute) -> Self {
        Self {
            mesh: Mesh::new(attribute),
            lookup: HashMap::new(),
        }
    }

    /// Returns the index of the vertex, appending it when no identical vertex exists yet.
    pub fn add_vertex(
        &mut self,
        position: &Vector3<f32>,
        normal: &Vector3<f32>,
        attribute: &[f32],
    ) -> u32 {
        debug_assert_eq!(attribute.len(), self.mesh.attribute.num_components());
        let key = VertexKey::new(position, normal, attribute);
        let mesh = &mut self.mesh;
        *self.lookup.entry(key).or_insert_with(|| {
            let index = mesh.len_vertices() as u32;
            mesh.positions.extend_from_slice(position.as_slice());
            mesh.normals.extend_from_slice(normal.as_slice());
            mesh.attributes.extend_from_slice(attribute);
            index
        })
    }

    pub fn add_triangle(&mut self, indices: [u32; 3]) {
        self.mesh.indices.extend_from_slice(&indices);
    }

    pub fn len_vertices(&self) -> usize {
        self.mesh.len_vertices()
    }

    pub fn build(self) -> Mesh {
        self.mesh
    }
}
