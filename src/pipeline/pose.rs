use std::path::Path;

use nalgebra::{UnitQuaternion, Vector3};

use crate::error::{Fuse3dError, Result};
use crate::transform::Transform;

#[derive(Default)]
struct PoseEntry {
    position: [Option<f32>; 3],
    rotation: [Option<f32>; 3],
}

impl PoseEntry {
    /// Rotations are in degrees and compose as `Rz * Ry * Rx`. The exporter's cameras look
    /// down `-z` with `y` up, so the result is flipped around `x` into the pinhole frame.
    fn into_transform(self) -> std::result::Result<Transform, String> {
        let mut values = [0.0f32; 6];
        for (k, (value, key)) in self
            .position
            .iter()
            .chain(self.rotation.iter())
            .zip(KEYS.iter())
            .enumerate()
        {
            values[k] = value.ok_or_else(|| format!("camera is missing `{key}`"))?;
        }
        let [px, py, pz, rx, ry, rz] = values;

        let rotation = UnitQuaternion::from_euler_angles(
            rx.to_radians(),
            ry.to_radians(),
            rz.to_radians(),
        ) * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), std::f32::consts::PI);
        Ok(Transform::from_parts(Vector3::new(px, py, pz), rotation))
    }
}

const KEYS: [&str; 6] = ["px", "py", "pz", "rx", "ry", "rz"];

/// Parses the camera rig description.
///
/// The first line is a header and is ignored. Each camera is a block of `key value` lines
/// with the keys `px py pz rx ry rz`, closed by a line holding only `e`.
///
/// # Arguments
///
/// * `text` - File contents.
/// * `origin` - Name used in error messages, usually the file path.
///
/// # Returns
///
/// The camera-to-world transforms, one per `e` marker.
pub fn parse_camera_poses(text: &str, origin: &str) -> Result<Vec<Transform>> {
    let mut poses = Vec::new();
    let mut current = PoseEntry::default();

    for (line_no, line) in text.lines().enumerate().skip(1) {
        let error = |msg: String| Fuse3dError::Parser(format!("{origin}:{}: {msg}", line_no + 1));
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "e" {
            let entry = std::mem::take(&mut current);
            poses.push(entry.into_transform().map_err(error)?);
            continue;
        }

        let mut tokens = line.split_whitespace();
        let (key, value) = match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(key), Some(value), None) => (key, value),
            _ => return Err(error(format!("expected `key value`, got `{line}`"))),
        };
        let value = value
            .parse::<f32>()
            .map_err(|err| error(format!("invalid value for `{key}`: {err}")))?;
        let slot = match key {
            "px" => &mut current.position[0],
            "py" => &mut current.position[1],
            "pz" => &mut current.position[2],
            "rx" => &mut current.rotation[0],
            "ry" => &mut current.rotation[1],
            "rz" => &mut current.rotation[2],
            _ => return Err(error(format!("unknown key `{key}`"))),
        };
        *slot = Some(value);
    }

    Ok(poses)
}

/// Reads and parses a camera rig file, see [`parse_camera_poses`].
pub fn read_camera_poses<P: AsRef<Path>>(path: P) -> Result<Vec<Transform>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    parse_camera_poses(&text, &path.display().to_string())
}
