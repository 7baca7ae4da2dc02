mod fields;
pub(crate) use fields::sphere_field;
mod meshes;
pub(crate) use meshes::{plane_depth, random_triangle_soup, sample_intrinsics, sphere_mesh};
