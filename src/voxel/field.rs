use std::collections::BTreeSet;

use nalgebra::Vector3;

use crate::bounds::Box3Df;
use crate::error::{Fuse3dError, Result};

/// Colour of cells that were never painted by a camera image.
pub const DEFAULT_COLOUR: [u8; 4] = [128, 128, 128, 255];

/// Dense cubic grid of signed distances with a colour per cell.
///
/// Cells start as NaN (never fused). A cell becomes *seen* the first time it receives a
/// finite distance and stays seen for the rest of the session. World coordinates map to
/// cells by rounding to the nearest multiple of the resolution on each axis.
#[derive(Clone, Debug)]
pub struct VoxelField {
    start: Vector3<f32>,
    size: usize,
    resolution: f32,
    distances: Vec<f32>,
    colours: Vec<[u8; 4]>,
    seen: BTreeSet<usize>,
}

impl VoxelField {
    /// Allocates a `size^3` grid whose first cell sits at `start`.
    pub fn new(start: Vector3<f32>, size: usize, resolution: f32) -> Result<Self> {
        if !(resolution > 0.0) || !resolution.is_finite() {
            return Err(Fuse3dError::invalid_parameter(format!(
                "voxel resolution must be positive, got {resolution}"
            )));
        }
        if size == 0 {
            return Err(Fuse3dError::invalid_parameter("voxel grid size must be positive"));
        }
        let num_cells = size
            .checked_mul(size)
            .and_then(|v| v.checked_mul(size))
            .ok_or_else(|| {
                Fuse3dError::invalid_parameter(format!("voxel grid of size {size} is too large"))
            })?;

        Ok(Self {
            start,
            size,
            resolution,
            distances: vec![f32::NAN; num_cells],
            colours: vec![DEFAULT_COLOUR; num_cells],
            seen: BTreeSet::new(),
        })
    }

    /// Smallest cubic grid covering `bounds`, with `padding` extra cells on every side.
    pub fn enclosing(bounds: &Box3Df, resolution: f32, padding: usize) -> Result<Self> {
        if bounds.is_empty() {
            return Err(Fuse3dError::invalid_parameter(
                "cannot allocate a voxel grid around empty bounds",
            ));
        }
        if !(resolution > 0.0) {
            return Err(Fuse3dError::invalid_parameter(format!(
                "voxel resolution must be positive, got {resolution}"
            )));
        }
        let span = (bounds.max_extent() / resolution).ceil() as usize + 1;
        let start = bounds.min - Vector3::repeat(padding as f32 * resolution);
        Self::new(start, span + 2 * padding, resolution)
    }

    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    /// Cells per axis.
    pub fn size(&self) -> usize {
        self.size
    }

    /// World position of cell `(0, 0, 0)`.
    pub fn start(&self) -> Vector3<f32> {
        self.start
    }

    /// World position of the last cell.
    pub fn end(&self) -> Vector3<f32> {
        self.start + Vector3::repeat((self.size - 1) as f32 * self.resolution)
    }

    pub fn num_cells(&self) -> usize {
        self.distances.len()
    }

    /// Cell coordinates of a world point, `None` outside the grid.
    pub fn cell_of(&self, world: &Vector3<f32>) -> Option<[usize; 3]> {
        let mut cell = [0usize; 3];
        for axis in 0..3 {
            let k = ((world[axis] - self.start[axis]) / self.resolution).round();
            if !(k >= 0.0 && k < self.size as f32) {
                return None;
            }
            cell[axis] = k as usize;
        }
        Some(cell)
    }

    /// Row-major flat index of a cell.
    pub fn flat_index(&self, cell: [usize; 3]) -> usize {
        (cell[0] * self.size + cell[1]) * self.size + cell[2]
    }

    pub fn cell_from_index(&self, index: usize) -> [usize; 3] {
        let size = self.size;
        [index / (size * size), (index / size) % size, index % size]
    }

    pub fn world_of(&self, cell: [usize; 3]) -> Vector3<f32> {
        self.start
            + Vector3::new(cell[0] as f32, cell[1] as f32, cell[2] as f32) * self.resolution
    }

    /// Distance stored at a world coordinate.
    pub fn get(&self, world: &Vector3<f32>) -> Option<f32> {
        self.cell_of(world)
            .map(|cell| self.distances[self.flat_index(cell)])
    }

    /// Stores a distance at a world coordinate, returns false when outside the grid.
    pub fn set(&mut self, world: &Vector3<f32>, value: f32) -> bool {
        match self.cell_of(world) {
            Some(cell) => {
                self.set_cell(cell, value);
                true
            }
            None => false,
        }
    }

    pub fn distance(&self, cell: [usize; 3]) -> f32 {
        self.distances[self.flat_index(cell)]
    }

    pub fn colour(&self, cell: [usize; 3]) -> [u8; 4] {
        self.colours[self.flat_index(cell)]
    }

    pub fn set_cell(&mut self, cell: [usize; 3], value: f32) {
        let index = self.flat_index(cell);
        self.write(index, value, None);
    }

    /// Stores a fused sample. Finite values mark the cell as seen.
    pub(crate) fn write(&mut self, index: usize, value: f32, colour: Option<[u8; 4]>) {
        self.distances[index] = value;
        if let Some(colour) = colour {
            self.colours[index] = colour;
        }
        if value.is_finite() {
            self.seen.insert(index);
        }
    }

    pub fn is_seen(&self, cell: [usize; 3]) -> bool {
        self.seen.contains(&self.flat_index(cell))
    }

    pub fn num_seen(&self) -> usize {
        self.seen.len()
    }

    /// Seen cells in flat index order.
    pub fn seen_cells(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        self.seen.iter().map(|index| self.cell_from_index(*index))
    }

    /// World coordinates of the seen cells.
    pub fn seen_voxels(&self) -> impl Iterator<Item = Vector3<f32>> + '_ {
        self.seen_cells().map(|cell| self.world_of(cell))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    use super::*;

    #[test]
    fn index_round_trip() {
        let field = VoxelField::new(Vector3::new(-1.0, 0.5, 2.0), 7, 0.25).unwrap();
        for index in 0..field.num_cells() {
            let cell = field.cell_from_index(index);
            let world = field.world_of(cell);
            assert_eq!(field.cell_of(&world), Some(cell));
            assert_eq!(field.flat_index(cell), index);

            // Anything within half a cell snaps to the same voxel.
            let jitter = Vector3::new(0.1, -0.1, 0.12);
            assert_eq!(field.cell_of(&(world + jitter)), Some(cell));
            let back = field.world_of(field.cell_of(&(world + jitter)).unwrap());
            assert!((back - world).amax() <= field.resolution() / 2.0);
        }
    }

    #[test]
    fn should_get_and_set_by_world_coordinate() {
        let mut field = VoxelField::new(Vector3::zeros(), 4, 0.5).unwrap();
        let p = Vector3::new(1.0, 0.5, 1.5);
        assert!(field.get(&p).unwrap().is_nan());
        assert_eq!(field.num_seen(), 0);

        assert!(field.set(&p, -0.25));
        assert_relative_eq!(field.get(&p).unwrap(), -0.25);
        assert!(field.is_seen([2, 1, 3]));
        assert_eq!(field.seen_voxels().collect::<Vec<_>>(), vec![p]);

        assert!(!field.set(&Vector3::new(2.0, 0.0, 0.0), 1.0));
        assert!(field.get(&Vector3::new(-0.3, 0.0, 0.0)).is_none());
    }

    #[test]
    fn non_finite_values_are_not_seen() {
        let mut field = VoxelField::new(Vector3::zeros(), 2, 1.0).unwrap();
        field.set_cell([1, 1, 1], f32::NAN);
        assert_eq!(field.num_seen(), 0);
    }

    #[test]
    fn should_enclose_bounds() {
        let bounds = Box3Df::new(Vector3::new(-1.0, 0.0, 0.0), Vector3::new(1.0, 0.5, 0.25));
        let field = VoxelField::enclosing(&bounds, 0.1, 2).unwrap();
        assert_relative_eq!(field.start(), Vector3::new(-1.2, -0.2, -0.2), epsilon = 1e-6);
        assert_eq!(field.size(), 21 + 4);
        assert!(field.end()[0] >= bounds.max[0]);
        assert!(field.cell_of(&bounds.max).is_some());
        assert!(field.cell_of(&bounds.min).is_some());
    }

    #[test]
    fn should_reject_invalid_parameters() {
        assert!(VoxelField::new(Vector3::zeros(), 0, 1.0).is_err());
        assert!(VoxelField::new(Vector3::zeros(), 3, 0.0).is_err());
        assert!(VoxelField::enclosing(&Box3Df::empty(), 1.0, 0).is_err());
    }
}
