use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};

/// Rigid transform (rotation + translation). Camera poses are stored as camera-to-world.
#[derive(Clone, Debug, PartialEq)]
pub struct Transform(Isometry3<f32>);

impl Transform {
    pub fn eye() -> Self {
        Self(Isometry3::<f32>::identity())
    }

    pub fn from_parts(translation: Vector3<f32>, rotation: UnitQuaternion<f32>) -> Self {
        Self(Isometry3::<f32>::from_parts(
            Translation3::from(translation),
            rotation,
        ))
    }

    /// Applies rotation and translation to a point.
    pub fn transform_point(&self, point: &Vector3<f32>) -> Vector3<f32> {
        (self.0 * Point3::from(*point)).coords
    }

    /// Applies only the rotation, used for directions and normals.
    pub fn rotate_vector(&self, vector: &Vector3<f32>) -> Vector3<f32> {
        self.0.rotation * vector
    }

    pub fn translation(&self) -> Vector3<f32> {
        self.0.translation.vector
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::eye()
    }
}

#[cfg(test)]
mod tests {
    use super::Transform;
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector3};

    #[test]
    fn test_transform_point() {
        let transform = Transform::from_parts(
            Vector3::new(0., 0., 3.),
            UnitQuaternion::<f32>::from_scaled_axis(Vector3::y() * std::f32::consts::PI),
        );

        let point = transform.transform_point(&Vector3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(point, Vector3::new(-1.0, 2.0, 0.0), epsilon = 1e-5);

        let direction = transform.rotate_vector(&Vector3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(direction, Vector3::new(-1.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_translation_is_camera_center() {
        let transform = Transform::from_parts(
            Vector3::new(1., -2., 0.5),
            UnitQuaternion::<f32>::from_euler_angles(0.1, 0.2, 0.3),
        );
        assert_eq!(transform.translation(), Vector3::new(1., -2., 0.5));
        assert_relative_eq!(
            transform.transform_point(&Vector3::zeros()),
            transform.translation()
        );
        assert_eq!(Transform::default(), Transform::eye());
    }
}
