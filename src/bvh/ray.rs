use nalgebra::Vector3;

use super::{Bvh, BvhNode};
use crate::geometry::{Mesh, Triangle};

/// Rays closer than this to parallel with a plane are ignored.
const PARALLEL_EPSILON: f32 = 1e-6;

/// Slack for the in-face test of the box slabs, so flat boxes of axis aligned triangles
/// are still hit.
const BOX_EPSILON: f32 = 1e-5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Vector3<f32>,
    /// Unit direction.
    pub direction: Vector3<f32>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    /// Distance along the ray.
    pub t: f32,
    pub point: Vector3<f32>,
    /// Index of the triangle in the source mesh.
    pub obj_id: usize,
}

impl Ray {
    /// Ray starting at `origin` and passing through `target`. `None` when both coincide.
    pub fn towards(origin: Vector3<f32>, target: &Vector3<f32>) -> Option<Self> {
        let direction = target - origin;
        let norm = direction.norm();
        if norm > 0.0 {
            Some(Self {
                origin,
                direction: direction / norm,
            })
        } else {
            None
        }
    }

    pub fn at(&self, t: f32) -> Vector3<f32> {
        self.origin + self.direction * t
    }

    /// Slab test against the six faces of the box. A face is hit when the ray reaches its
    /// plane at `t >= 0` inside the bounds of the two other axes.
    pub fn intersects_box(&self, min: &[f32; 3], max: &[f32; 3]) -> bool {
        for axis in 0..3 {
            let dir = self.direction[axis];
            if dir.abs() < PARALLEL_EPSILON {
                continue;
            }
            let (a1, a2) = ((axis + 1) % 3, (axis + 2) % 3);
            for plane in [min[axis], max[axis]] {
                let t = (plane - self.origin[axis]) / dir;
                if t < 0.0 {
                    continue;
                }
                let p = self.at(t);
                if p[a1] >= min[a1] - BOX_EPSILON
                    && p[a1] <= max[a1] + BOX_EPSILON
                    && p[a2] >= min[a2] - BOX_EPSILON
                    && p[a2] <= max[a2] + BOX_EPSILON
                {
                    return true;
                }
            }
        }
        false
    }

    /// Ray/triangle intersection by solving the plane equation and checking that the point
    /// lies inside the triangle.
    ///
    /// # Returns
    ///
    /// The distance along the ray and the intersection point.
    pub fn intersect_triangle(&self, triangle: &Triangle) -> Option<(f32, Vector3<f32>)> {
        let normal = triangle.normal();
        let denom = normal.dot(&self.direction);
        if denom.abs() < PARALLEL_EPSILON {
            return None;
        }

        let t = normal.dot(&(triangle.v0 - self.origin)) / denom;
        if t < 0.0 {
            return None;
        }

        let point = self.at(t);
        if triangle.contains_point(&point) {
            Some((t, point))
        } else {
            None
        }
    }
}

impl Bvh {
    /// Visits every triangle of `mesh` hit by `ray`. The mesh must be the one the tree
    /// was built from.
    pub fn for_each_hit<F>(&self, mesh: &Mesh, ray: &Ray, mut visit: F)
    where
        F: FnMut(RayHit),
    {
        if self.nodes.is_empty() {
            return;
        }

        let mut test_leaf = |node: &BvhNode| {
            let obj_id = node.obj_id as usize;
            if let Some((t, point)) = ray.intersect_triangle(&mesh.triangle(obj_id)) {
                visit(RayHit { t, point, obj_id });
            }
        };

        let mut stack = Vec::with_capacity(64);
        stack.push(0usize);
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if self.is_leaf(index) {
                test_leaf(node);
                continue;
            }
            for child in [node.left as usize, node.right as usize] {
                let child_node = &self.nodes[child];
                if ray.intersects_box(&child_node.min, &child_node.max) {
                    stack.push(child);
                }
            }
        }
    }

    /// All hits of the ray, in traversal order.
    pub fn intersect(&self, mesh: &Mesh, ray: &Ray) -> Vec<RayHit> {
        let mut hits = Vec::new();
        self.for_each_hit(mesh, ray, |hit| hits.push(hit));
        hits
    }
}
