//! Linear bounding volume hierarchy over the triangles of a mesh.
//!
//! The tree is stored as a flat array of `2N - 1` nodes for `N` triangles: the `N - 1` internal
//! nodes come first (the root at index 0) and the `N` leaves follow. Children are integer
//! indices into the same array, so the layout can be copied verbatim to a GPU buffer.
mod build;
mod morton;
mod ray;

pub use morton::{morton3d, MortonEncoder};
pub use ray::{Ray, RayHit};

use crate::bounds::Box3Df;

/// Marker for missing links (parent of the root, children of leaves, id of internal nodes).
pub const NO_NODE: i32 = -1;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BvhNode {
    pub min: [f32; 3],
    pub max: [f32; 3],
    pub left: i32,
    pub right: i32,
    pub parent: i32,
    /// Triangle index in the source mesh for leaves, [`NO_NODE`] for internal nodes.
    pub obj_id: i32,
}

impl Default for BvhNode {
    fn default() -> Self {
        Self {
            min: [f32::INFINITY; 3],
            max: [f32::NEG_INFINITY; 3],
            left: NO_NODE,
            right: NO_NODE,
            parent: NO_NODE,
            obj_id: NO_NODE,
        }
    }
}

impl BvhNode {
    pub fn bounds(&self) -> Box3Df {
        Box3Df::new(self.min.into(), self.max.into())
    }

    fn set_bounds(&mut self, bounds: &Box3Df) {
        self.min = bounds.min.into();
        self.max = bounds.max.into();
    }
}

#[derive(Clone, Debug, Default)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    num_leaves: usize,
}

impl Bvh {
    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn num_leaves(&self) -> usize {
        self.num_leaves
    }

    /// Leaves occupy the tail of the array, starting at `N - 1`.
    pub fn is_leaf(&self, index: usize) -> bool {
        index + 1 >= self.num_leaves
    }

    /// Bounds of the whole tree, empty for an empty tree.
    pub fn bounds(&self) -> Box3Df {
        self.nodes
            .first()
            .map(BvhNode::bounds)
            .unwrap_or_else(Box3Df::empty)
    }
}
