//! Multi-camera frame acquisition: the rig description and the concurrent decoding of the
//! RGB and depth streams into ordered multi-view frames.
mod multiview;
mod pose;
mod queue;
mod source;

pub use multiview::{CameraFrame, MultiViewFrame, MultiViewPipeline, PipelineParams};
pub use pose::{parse_camera_poses, read_camera_poses};
pub use queue::FrameQueue;
pub use source::{Decoded, DirectoryFrameSource, FrameSource, Modality};
