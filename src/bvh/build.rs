use rayon::prelude::*;

use super::morton::MortonEncoder;
use super::{Bvh, BvhNode};
use crate::bounds::Box3Df;
use crate::geometry::Triangle;

/// Length of the common prefix between the sorted keys `i` and `j`. Equal codes are made
/// unique by falling back to the positions, and out of range `j` gives -1.
fn delta(codes: &[u32], i: i64, j: i64) -> i32 {
    if j < 0 || j >= codes.len() as i64 {
        return -1;
    }
    let (a, b) = (codes[i as usize], codes[j as usize]);
    if a == b {
        32 + ((i as u32) ^ (j as u32)).leading_zeros() as i32
    } else {
        (a ^ b).leading_zeros() as i32
    }
}

/// Children of internal node `i` in the radix tree over the sorted `codes`, as flat node
/// indices (leaves offset by `N - 1`).
fn internal_children(codes: &[u32], i: i64) -> (usize, usize) {
    let n = codes.len() as i64;

    // Direction of the range covered by the node.
    let d: i64 = if delta(codes, i, i + 1) - delta(codes, i, i - 1) >= 0 {
        1
    } else {
        -1
    };

    // Upper bound for the range length, then binary search of the other end.
    let delta_min = delta(codes, i, i - d);
    let mut l_max: i64 = 2;
    while delta(codes, i, i + l_max * d) > delta_min {
        l_max *= 2;
    }
    let mut l = 0;
    let mut t = l_max / 2;
    while t >= 1 {
        if delta(codes, i, i + (l + t) * d) > delta_min {
            l += t;
        }
        t /= 2;
    }
    let j = i + l * d;

    // Split position: the last key sharing more than `delta_node` bits with `i`.
    let delta_node = delta(codes, i, j);
    let mut s = 0;
    let mut t = l;
    loop {
        t = (t + 1) / 2;
        if delta(codes, i, i + (s + t) * d) > delta_node {
            s += t;
        }
        if t <= 1 {
            break;
        }
    }
    let gamma = i + s * d + d.min(0);

    let leaf_offset = n - 1;
    let left = if i.min(j) == gamma {
        leaf_offset + gamma
    } else {
        gamma
    };
    let right = if i.max(j) == gamma + 1 {
        leaf_offset + gamma + 1
    } else {
        gamma + 1
    };
    (left as usize, right as usize)
}

impl Bvh {
    /// Builds the hierarchy over the triangles given by flat positions (xyz per vertex) and
    /// indices (three per triangle).
    ///
    /// Zero triangles produce an empty tree, a single triangle produces a lone leaf which
    /// is also the root.
    pub fn build(positions: &[f32], indices: &[u32]) -> Self {
        let num_triangles = indices.len() / 3;
        if num_triangles == 0 {
            return Self::default();
        }

        let (triangle_bounds, centroids): (Vec<Box3Df>, Vec<_>) = (0..num_triangles)
            .into_par_iter()
            .map(|tri_id| {
                let triangle = Triangle::from_indexed(positions, indices, tri_id);
                (triangle.bounds(), triangle.centroid())
            })
            .unzip();

        let encoder = MortonEncoder::new(&Box3Df::from_points(centroids.iter()));
        let mut keys = centroids
            .par_iter()
            .enumerate()
            .map(|(tri_id, centroid)| (encoder.encode(centroid), tri_id as u32))
            .collect::<Vec<_>>();
        // Ties on the code fall back to the triangle index, giving a total order.
        keys.par_sort_unstable();
        let codes = keys.iter().map(|(code, _)| *code).collect::<Vec<_>>();

        let leaf_offset = num_triangles - 1;
        let mut nodes = vec![BvhNode::default(); 2 * num_triangles - 1];
        for (k, (_, tri_id)) in keys.iter().enumerate() {
            let leaf = &mut nodes[leaf_offset + k];
            leaf.obj_id = *tri_id as i32;
            leaf.set_bounds(&triangle_bounds[*tri_id as usize]);
        }

        let children = (0..leaf_offset as i64)
            .into_par_iter()
            .map(|i| internal_children(&codes, i))
            .collect::<Vec<_>>();
        for (parent, (left, right)) in children.into_iter().enumerate() {
            nodes[parent].left = left as i32;
            nodes[parent].right = right as i32;
            nodes[left].parent = parent as i32;
            nodes[right].parent = parent as i32;
        }

        let mut bvh = Self {
            nodes,
            num_leaves: num_triangles,
        };
        bvh.refit();
        bvh
    }

    /// Recomputes internal bounds as the union of their children, bottom-up.
    fn refit(&mut self) {
        if self.num_leaves < 2 {
            return;
        }
        // Breadth-first order puts every parent before its children.
        let mut order = Vec::with_capacity(self.num_leaves - 1);
        order.push(0usize);
        let mut head = 0;
        while head < order.len() {
            let node = self.nodes[order[head]];
            head += 1;
            for child in [node.left as usize, node.right as usize] {
                if !self.is_leaf(child) {
                    order.push(child);
                }
            }
        }

        for &index in order.iter().rev() {
            let node = self.nodes[index];
            let bounds = self.nodes[node.left as usize]
                .bounds()
                .union(&self.nodes[node.right as usize].bounds());
            self.nodes[index].set_bounds(&bounds);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use rstest::rstest;

    use super::*;
    use crate::bvh::NO_NODE;
    use crate::geometry::Mesh;
    use crate::unit_test::{random_triangle_soup, sphere_mesh};

    fn assert_structure(bvh: &Bvh, num_triangles: usize) {
        assert_eq!(bvh.len(), 2 * num_triangles - 1);
        let nodes = bvh.nodes();

        let leaf_ids = nodes[num_triangles - 1..]
            .iter()
            .map(|node| node.obj_id)
            .collect::<HashSet<_>>();
        assert_eq!(leaf_ids, (0..num_triangles as i32).collect::<HashSet<_>>());

        assert_eq!(nodes[0].parent, NO_NODE);
        for (index, node) in nodes.iter().enumerate().take(num_triangles - 1) {
            assert!(!bvh.is_leaf(index));
            assert_eq!(node.obj_id, NO_NODE);
            for child in [node.left, node.right] {
                let child_node = &nodes[child as usize];
                assert_eq!(child_node.parent, index as i32);
                assert!(node.bounds().contains(&child_node.bounds()));
            }
        }

        // Every node is reached exactly once from the root.
        let mut visited = vec![0; nodes.len()];
        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            visited[index] += 1;
            if !bvh.is_leaf(index) {
                stack.push(nodes[index].left as usize);
                stack.push(nodes[index].right as usize);
            }
        }
        assert!(visited.iter().all(|count| *count == 1));
    }

    #[rstest]
    #[case(2)]
    #[case(3)]
    #[case(17)]
    #[case(500)]
    fn should_build_valid_tree(#[case] num_triangles: usize) {
        let mesh = random_triangle_soup(num_triangles, 42);
        let bvh = Bvh::build(&mesh.positions, &mesh.indices);
        assert_structure(&bvh, num_triangles);
    }

    #[test]
    fn should_build_with_duplicated_codes() {
        // Identical triangles share the same Morton code.
        let mesh = random_triangle_soup(1, 7);
        let mut positions = Vec::new();
        let mut indices = Vec::new();
        for copy in 0..8u32 {
            positions.extend_from_slice(&mesh.positions);
            indices.extend([0, 1, 2].map(|k| k + copy * 3));
        }
        let bvh = Bvh::build(&positions, &indices);
        assert_structure(&bvh, 8);
    }

    #[test]
    fn should_build_over_sphere() {
        let mesh = sphere_mesh(1.0, 24);
        let bvh = Bvh::build(&mesh.positions, &mesh.indices);
        assert_structure(&bvh, mesh.len_triangles());
        let bounds = bvh.bounds();
        assert!(bounds.contains(&mesh.bounds()));
        assert!(mesh.bounds().contains(&bounds));
    }

    #[test]
    fn degenerate_inputs() {
        let empty = Bvh::build(&[], &[]);
        assert!(empty.is_empty());
        assert!(empty.bounds().is_empty());

        let single = random_triangle_soup(1, 3);
        let bvh = Bvh::build(&single.positions, &single.indices);
        assert_eq!(bvh.len(), 1);
        assert!(bvh.is_leaf(0));
        assert_eq!(bvh.nodes()[0].obj_id, 0);
        assert_eq!(bvh.bounds(), single.triangle(0).bounds());
    }

    #[test]
    fn leaves_are_sorted_by_morton_code() {
        let mut rng = SmallRng::seed_from_u64(11);
        let num_triangles = 64;
        let mut mesh = Mesh::new(crate::geometry::VertexAttribute::TextureCoordinates);
        for i in 0..num_triangles as u32 {
            let base: [f32; 3] = [rng.gen(), rng.gen(), rng.gen()];
            for k in 0..3 {
                mesh.positions
                    .extend_from_slice(&[base[0] + k as f32 * 1e-3, base[1], base[2]]);
            }
            mesh.indices.extend_from_slice(&[3 * i, 3 * i + 1, 3 * i + 2]);
        }
        let bvh = Bvh::build(&mesh.positions, &mesh.indices);

        let centroids = mesh.triangles().map(|t| t.centroid()).collect::<Vec<_>>();
        let encoder = MortonEncoder::new(&Box3Df::from_points(centroids.iter()));
        let codes = bvh.nodes()[num_triangles - 1..]
            .iter()
            .map(|leaf| encoder.encode(&centroids[leaf.obj_id as usize]))
            .collect::<Vec<_>>();
        assert!(codes.windows(2).all(|w| w[0] <= w[1]));
    }
}
