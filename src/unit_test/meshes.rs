use nalgebra::Vector3;
use ndarray::Array2;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rstest::fixture;

use crate::camera::CameraIntrinsics;
use crate::geometry::{Mesh, MeshBuilder, Triangle, VertexAttribute};

#[fixture]
pub fn sample_intrinsics() -> CameraIntrinsics {
    CameraIntrinsics::from_simple_intrinsic(100.0, 100.0, 4.0, 4.0)
}

/// Depth map of a fronto-parallel plane, shape is (height, width).
pub fn plane_depth(width: usize, height: usize, z: f32) -> Array2<f32> {
    Array2::from_elem((height, width), z)
}

/// `num_triangles` small unconnected triangles scattered in a 10m cube.
pub fn random_triangle_soup(num_triangles: usize, seed: u64) -> Mesh {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut mesh = Mesh::new(VertexAttribute::TextureCoordinates);
    for tri_id in 0..num_triangles as u32 {
        let base = Vector3::new(
            rng.gen_range(0.0..10.0),
            rng.gen_range(0.0..10.0),
            rng.gen_range(0.0..10.0),
        );
        let mut corner = || {
            base + Vector3::new(
                rng.gen_range(-0.5..0.5),
                rng.gen_range(-0.5..0.5),
                rng.gen_range(-0.5..0.5),
            )
        };
        let triangle = Triangle::new(base, corner(), corner());
        for v in [triangle.v0, triangle.v1, triangle.v2] {
            mesh.positions.extend_from_slice(v.as_slice());
            mesh.normals.extend_from_slice(triangle.normal().as_slice());
            mesh.attributes.extend_from_slice(&[0.0, 0.0]);
        }
        mesh.indices
            .extend_from_slice(&[3 * tri_id, 3 * tri_id + 1, 3 * tri_id + 2]);
    }
    mesh
}

/// Latitude/longitude sphere centered at the origin with outward normals.
pub fn sphere_mesh(radius: f32, segments: usize) -> Mesh {
    let stacks = segments.max(2);
    let slices = segments.max(3);
    let mut builder = MeshBuilder::new(VertexAttribute::TextureCoordinates);

    let mut vertex = |i: usize, j: usize| -> u32 {
        let normal = if i == 0 {
            Vector3::z()
        } else if i == stacks {
            -Vector3::z()
        } else {
            let theta = std::f32::consts::PI * i as f32 / stacks as f32;
            let phi = 2.0 * std::f32::consts::PI * (j % slices) as f32 / slices as f32;
            Vector3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos())
        };
        builder.add_vertex(&(normal * radius), &normal, &[0.0, 0.0])
    };

    let mut faces = Vec::new();
    for i in 0..stacks {
        for j in 0..slices {
            let a = vertex(i, j);
            let b = vertex(i + 1, j);
            let c = vertex(i + 1, j + 1);
            let d = vertex(i, j + 1);
            faces.push([a, b, c]);
            faces.push([a, c, d]);
        }
    }
    for face in faces {
        // Quads touching the poles collapse into a single triangle.
        if face[0] != face[1] && face[1] != face[2] && face[0] != face[2] {
            builder.add_triangle(face);
        }
    }
    builder.build()
}
