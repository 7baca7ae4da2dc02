use nalgebra::Vector3;

use crate::voxel::VoxelField;

/// Grid where every cell holds its signed distance to a sphere, negative inside.
pub fn sphere_field(center: Vector3<f32>, radius: f32, resolution: f32, size: usize) -> VoxelField {
    let mut field = VoxelField::new(Vector3::zeros(), size, resolution).unwrap();
    for index in 0..field.num_cells() {
        let cell = field.cell_from_index(index);
        let distance = (field.world_of(cell) - center).norm() - radius;
        field.set_cell(cell, distance);
    }
    field
}
