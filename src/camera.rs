use nalgebra::Vector3;
use serde_derive::Deserialize;

use super::transform::Transform;

/// Camera intrinsic parameters.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CameraIntrinsics {
    /// Focal length and pixel scale in the X-axis.
    pub fx: f64,
    /// Focal length and pixel scale in the Y-axis.
    pub fy: f64,
    /// Camera X-center.
    pub cx: f64,
    /// Camera Y-center.
    pub cy: f64,
    #[serde(default)]
    pub width: Option<usize>,
    #[serde(default)]
    pub height: Option<usize>,
}

impl CameraIntrinsics {
    pub fn from_simple_intrinsic(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            width: None,
            height: None,
        }
    }

    /// Intrinsics of an ideal camera with the principal point at the image center.
    ///
    /// # Arguments
    ///
    /// * fov_y: Vertical field of view in degrees.
    /// * width, height: Image size in pixels.
    pub fn from_fov(fov_y: f64, width: usize, height: usize) -> Self {
        let f = (height as f64 * 0.5) / (fov_y.to_radians() * 0.5).tan();
        Self {
            fx: f,
            fy: f,
            cx: width as f64 * 0.5,
            cy: height as f64 * 0.5,
            width: Some(width),
            height: Some(height),
        }
    }

    /// Project a 3D point into image space.
    ///
    /// # Arguments
    ///
    /// * point: The 3D point.
    ///
    /// # Returns
    ///
    /// * (x and y) coordinates.
    pub fn project(&self, point: &Vector3<f32>) -> (f32, f32) {
        (
            point[0] * self.fx as f32 / point[2] + self.cx as f32,
            point[1] * self.fy as f32 / point[2] + self.cy as f32,
        )
    }

    /// Pinhole back-projection of pixel `(x, y)` with depth `z`.
    pub fn backproject(&self, x: f32, y: f32, z: f32) -> Vector3<f32> {
        Vector3::new(
            (x - self.cx as f32) * z / self.fx as f32,
            (y - self.cy as f32) * z / self.fy as f32,
            z,
        )
    }
}

/// A posed camera of the rig: intrinsics plus its fixed camera-to-world transform.
#[derive(Clone, Debug)]
pub struct PinholeCamera {
    pub intrinsics: CameraIntrinsics,
    pub camera_to_world: Transform,
}

impl PinholeCamera {
    pub fn new(intrinsics: CameraIntrinsics, camera_to_world: Transform) -> Self {
        Self {
            intrinsics,
            camera_to_world,
        }
    }
}
