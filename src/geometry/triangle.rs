use std::cell::OnceCell;

use nalgebra::Vector3;

use crate::bounds::Box3Df;

/// A triangle given by its three corners. The unit normal is computed on first use and cached.
#[derive(Clone, Debug)]
pub struct Triangle {
    pub v0: Vector3<f32>,
    pub v1: Vector3<f32>,
    pub v2: Vector3<f32>,
    normal: OnceCell<Vector3<f32>>,
}

impl Triangle {
    pub fn new(v0: Vector3<f32>, v1: Vector3<f32>, v2: Vector3<f32>) -> Self {
        Self {
            v0,
            v1,
            v2,
            normal: OnceCell::new(),
        }
    }

    /// Gathers the triangle `tri_id` from flat position (xyz per vertex) and index arrays.
    pub fn from_indexed(positions: &[f32], indices: &[u32], tri_id: usize) -> Self {
        let corner = |k: usize| {
            let v = indices[3 * tri_id + k] as usize * 3;
            Vector3::new(positions[v], positions[v + 1], positions[v + 2])
        };
        Self::new(corner(0), corner(1), corner(2))
    }

    /// Edge vectors `v1 - v0`, `v2 - v1` and `v0 - v2`.
    pub fn edges(&self) -> [Vector3<f32>; 3] {
        [self.v1 - self.v0, self.v2 - self.v1, self.v0 - self.v2]
    }

    /// Unit normal following the `v0, v1, v2` winding. Zero for degenerate triangles.
    pub fn normal(&self) -> Vector3<f32> {
        *self.normal.get_or_init(|| {
            let normal = (self.v1 - self.v0).cross(&(self.v2 - self.v0));
            let mag = normal.norm();
            if mag > 0.0 {
                normal / mag
            } else {
                Vector3::zeros()
            }
        })
    }

    pub fn centroid(&self) -> Vector3<f32> {
        (self.v0 + self.v1 + self.v2) / 3.0
    }

    /// Distance from the centroid to the farthest corner.
    pub fn radius(&self) -> f32 {
        let centroid = self.centroid();
        [self.v0, self.v1, self.v2]
            .iter()
            .map(|v| (v - centroid).norm())
            .fold(0.0, f32::max)
    }

    /// True if any edge is at least `threshold` long.
    pub fn has_edge_longer_than(&self, threshold: f32) -> bool {
        self.edges().iter().any(|edge| edge.norm() >= threshold)
    }

    pub fn bounds(&self) -> Box3Df {
        Box3Df::new(
            self.v0.inf(&self.v1).inf(&self.v2),
            self.v0.sup(&self.v1).sup(&self.v2),
        )
    }

    /// Inside test for a point on the triangle's plane. The point is inside when the three
    /// edge cross products agree in sign along the normal.
    pub fn contains_point(&self, point: &Vector3<f32>) -> bool {
        let normal = self.normal();
        let [e0, e1, e2] = self.edges();
        let c0 = e0.cross(&(point - self.v0)).dot(&normal);
        let c1 = e1.cross(&(point - self.v1)).dot(&normal);
        let c2 = e2.cross(&(point - self.v2)).dot(&normal);

        (c0 >= 0.0 && c1 >= 0.0 && c2 >= 0.0) || (c0 <= 0.0 && c1 <= 0.0 && c2 <= 0.0)
    }

    /// Barycentric weights of a point on the triangle's plane, in `v0, v1, v2` order.
    pub fn barycentric(&self, point: &Vector3<f32>) -> Vector3<f32> {
        let normal = (self.v1 - self.v0).cross(&(self.v2 - self.v0));
        let area = normal.norm_squared();
        if area <= 0.0 {
            return Vector3::new(1.0, 0.0, 0.0);
        }
        let w0 = (self.v2 - self.v1).cross(&(point - self.v1)).dot(&normal) / area;
        let w1 = (self.v0 - self.v2).cross(&(point - self.v2)).dot(&normal) / area;
        Vector3::new(w0, w1, 1.0 - w0 - w1)
    }
}
