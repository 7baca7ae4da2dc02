use nalgebra::Vector3;

use crate::bounds::Box3Df;

/// Spreads the lower 10 bits of `v` so that there are two zero bits between each of them.
fn expand_bits(v: u32) -> u32 {
    let mut v = v & 0x3ff;
    v = (v | (v << 16)) & 0x030000ff;
    v = (v | (v << 8)) & 0x0300f00f;
    v = (v | (v << 4)) & 0x030c30c3;
    v = (v | (v << 2)) & 0x09249249;
    v
}

/// 30 bit Morton code of a point with coordinates in `[0, 1]`.
pub fn morton3d(point: &Vector3<f32>) -> u32 {
    let quantize = |v: f32| (v * 1024.0).clamp(0.0, 1023.0) as u32;
    let x = expand_bits(quantize(point[0]));
    let y = expand_bits(quantize(point[1]));
    let z = expand_bits(quantize(point[2]));
    (x << 2) | (y << 1) | z
}

/// Maps points into the unit cube sharing `bounds.min` as origin and the largest side of
/// `bounds` as edge, so the code preserves aspect ratio.
pub struct MortonEncoder {
    origin: Vector3<f32>,
    inv_extent: f32,
}

impl MortonEncoder {
    pub fn new(bounds: &Box3Df) -> Self {
        let extent = bounds.max_extent();
        Self {
            origin: bounds.min,
            inv_extent: if extent > 0.0 { 1.0 / extent } else { 0.0 },
        }
    }

    pub fn encode(&self, point: &Vector3<f32>) -> u32 {
        morton3d(&((point - self.origin) * self.inv_extent))
    }
}
