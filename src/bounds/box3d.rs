use nalgebra::Vector3;

/// Axis-aligned box. The empty box has inverted infinite bounds so that unions start from it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Box3Df {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

impl Box3Df {
    pub fn new(min: Vector3<f32>, max: Vector3<f32>) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: Vector3::repeat(f32::INFINITY),
            max: Vector3::repeat(f32::NEG_INFINITY),
        }
    }

    pub fn from_points<'a, I>(points: I) -> Self
    where
        I: IntoIterator<Item = &'a Vector3<f32>>,
    {
        points.into_iter().fold(Self::empty(), |mut bounds, point| {
            bounds.add_point(point);
            bounds
        })
    }

    pub fn is_empty(&self) -> bool {
        self.min[0] > self.max[0] || self.min[1] > self.max[1] || self.min[2] > self.max[2]
    }

    pub fn add_point(&mut self, point: &Vector3<f32>) {
        self.min = self.min.inf(point);
        self.max = self.max.sup(point);
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }

    pub fn center(&self) -> Vector3<f32> {
        (self.min + self.max) * 0.5
    }

    /// Largest side length.
    pub fn max_extent(&self) -> f32 {
        self.size().max()
    }

    pub fn contains_point(&self, point: &Vector3<f32>) -> bool {
        (0..3).all(|i| point[i] >= self.min[i] && point[i] <= self.max[i])
    }

    pub fn contains(&self, other: &Self) -> bool {
        other.is_empty() || (self.contains_point(&other.min) && self.contains_point(&other.max))
    }
}

impl Default for Box3Df {
    fn default() -> Self {
        Self::empty()
    }
}
