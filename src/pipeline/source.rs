use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use image::{ImageError, RgbaImage};
use ndarray::Array2;

use crate::tessellation::DepthMap;

/// Outcome of decoding one frame of one camera.
#[derive(Debug)]
pub enum Decoded<T> {
    Frame(T),
    /// The frame does not exist, no later frame will be requested.
    EndOfStream,
    /// The frame exists but could not be read this time, it may be retried.
    TransientError(String),
}

impl<T> Decoded<T> {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Decoded::EndOfStream)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Modality {
    Rgb,
    Depth,
}

impl Modality {
    pub fn name(&self) -> &'static str {
        match self {
            Modality::Rgb => "rgb",
            Modality::Depth => "depth",
        }
    }
}

/// Provides the images of a camera rig, frame by frame.
///
/// Frames and cameras are indexed from zero. Methods are called from blocking worker
/// threads, possibly for several frames at once.
pub trait FrameSource: Send + Sync + 'static {
    fn decode_rgb(&self, frame: usize, camera: usize) -> Decoded<RgbaImage>;

    fn decode_depth(&self, frame: usize, camera: usize) -> Decoded<DepthMap>;
}

/// Reads `<root>/rgb/frame_<frame>_cam_<camera>.png` and
/// `<root>/depth/frame_<frame>_cam_<camera>.exr`, with 1-based, zero padded numbers
/// (four digits for frames, three for cameras).
#[derive(Clone, Debug)]
pub struct DirectoryFrameSource {
    root: PathBuf,
}

impl DirectoryFrameSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn file_name(frame: usize, camera: usize, extension: &str) -> String {
        format!("frame_{:04}_cam_{:03}.{extension}", frame + 1, camera + 1)
    }

    pub fn rgb_path(&self, frame: usize, camera: usize) -> PathBuf {
        self.root
            .join("rgb")
            .join(Self::file_name(frame, camera, "png"))
    }

    pub fn depth_path(&self, frame: usize, camera: usize) -> PathBuf {
        self.root
            .join("depth")
            .join(Self::file_name(frame, camera, "exr"))
    }
}

fn decode_failure<T>(path: &Path, err: ImageError) -> Decoded<T> {
    match err {
        ImageError::IoError(err) if err.kind() == ErrorKind::NotFound => Decoded::EndOfStream,
        err => Decoded::TransientError(format!("{}: {err}", path.display())),
    }
}

impl FrameSource for DirectoryFrameSource {
    fn decode_rgb(&self, frame: usize, camera: usize) -> Decoded<RgbaImage> {
        let path = self.rgb_path(frame, camera);
        match image::open(&path) {
            Ok(image) => Decoded::Frame(image.into_rgba8()),
            Err(err) => decode_failure(&path, err),
        }
    }

    /// The first channel of the image holds the depth.
    fn decode_depth(&self, frame: usize, camera: usize) -> Decoded<DepthMap> {
        let path = self.depth_path(frame, camera);
        let image = match image::open(&path) {
            Ok(image) => image.into_rgb32f(),
            Err(err) => return decode_failure(&path, err),
        };
        let (width, height) = image.dimensions();
        let depth = image.pixels().map(|pixel| pixel.0[0]).collect::<Vec<_>>();
        match Array2::from_shape_vec((height as usize, width as usize), depth) {
            Ok(depth) => Decoded::Frame(depth),
            Err(err) => Decoded::TransientError(format!("{}: {err}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use image::{ImageBuffer, Rgb, Rgba};

    use super::*;

    #[test]
    fn should_name_files_from_one() {
        let source = DirectoryFrameSource::new("/data/scene");
        assert_eq!(
            source.rgb_path(0, 0),
            PathBuf::from("/data/scene/rgb/frame_0001_cam_001.png")
        );
        assert_eq!(
            source.depth_path(41, 11),
            PathBuf::from("/data/scene/depth/frame_0042_cam_012.exr")
        );
    }

    #[test]
    fn missing_files_end_the_stream() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectoryFrameSource::new(dir.path());
        assert!(source.decode_rgb(0, 0).is_end_of_stream());
        assert!(source.decode_depth(3, 1).is_end_of_stream());
    }

    #[test]
    fn corrupt_files_are_transient() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("rgb")).unwrap();
        let source = DirectoryFrameSource::new(dir.path());
        std::fs::write(source.rgb_path(0, 0), b"not a png").unwrap();
        assert!(matches!(source.decode_rgb(0, 0), Decoded::TransientError(_)));
    }

    #[test]
    fn should_decode_images() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("rgb")).unwrap();
        std::fs::create_dir(dir.path().join("depth")).unwrap();
        let source = DirectoryFrameSource::new(dir.path());

        let rgb = RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 255]));
        rgb.save(source.rgb_path(0, 1)).unwrap();
        let depth = ImageBuffer::from_fn(4, 3, |x, y| Rgb([1.0 + x as f32 + 10.0 * y as f32; 3]));
        image::DynamicImage::ImageRgb32F(depth)
            .save(source.depth_path(0, 1))
            .unwrap();

        match source.decode_rgb(0, 1) {
            Decoded::Frame(image) => assert_eq!(image, rgb),
            other => panic!("unexpected {other:?}"),
        }
        match source.decode_depth(0, 1) {
            Decoded::Frame(depth) => {
                assert_eq!(depth.dim(), (3, 4));
                assert_eq!(depth[[2, 3]], 24.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
