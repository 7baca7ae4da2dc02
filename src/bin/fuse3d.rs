use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use fuse3d::{
    error::Result,
    io::write_ply,
    pipeline::{read_camera_poses, DirectoryFrameSource, MultiViewPipeline},
    reconstruction::{ReconstructionParams, Reconstructor},
    voxel::FusionStrategy,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    BruteForce,
    Bvh,
}

impl From<Strategy> for FusionStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::BruteForce => FusionStrategy::BruteForce,
            Strategy::Bvh => FusionStrategy::Bvh,
        }
    }
}

#[derive(Parser)]
struct Args {
    /// Directory with the `rgb/` and `depth/` frame folders
    dataset: PathBuf,
    /// Camera rig description, one `px py pz rx ry rz` block per camera
    poses: PathBuf,
    /// JSON file with the reconstruction parameters
    #[clap(long, short)]
    params: Option<PathBuf>,
    /// Where the `frame_<index>.ply` meshes are written
    #[clap(long, short, default_value = "output")]
    output: PathBuf,
    /// Overrides the fusion strategy of the parameters file
    #[clap(long, value_enum)]
    strategy: Option<Strategy>,
    /// Maximum number of frames to process
    #[clap(long)]
    max_frames: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().compact())
        .init();

    let args = Args::parse();
    let mut params = match &args.params {
        Some(path) => ReconstructionParams::from_json_file(path)?,
        None => ReconstructionParams::default(),
    };
    if let Some(strategy) = args.strategy {
        params = params.strategy(strategy.into());
    }

    let poses = read_camera_poses(&args.poses)?;
    info!(cameras = poses.len(), dataset = %args.dataset.display(), "starting session");
    std::fs::create_dir_all(&args.output)?;

    let pipeline = MultiViewPipeline::start(
        DirectoryFrameSource::new(&args.dataset),
        poses.len(),
        params.pipeline.clone(),
    );
    let mut reconstructor = Reconstructor::new(params, poses);

    let max_frames = args.max_frames.unwrap_or(usize::MAX);
    let mut num_frames = 0;
    while num_frames < max_frames {
        let frame = match pipeline.next_frame().await {
            Some(frame) => frame,
            None => break,
        };
        let index = frame.index;
        let mesh = tokio::task::block_in_place(|| reconstructor.reconstruct(frame))?;

        let path = args.output.join(format!("frame_{:04}.ply", index + 1));
        write_ply(&path, &mesh)?;
        info!(
            frame = index,
            triangles = mesh.len_triangles(),
            path = %path.display(),
            "wrote mesh"
        );
        num_frames += 1;
    }

    info!(frames = num_frames, "session finished");
    Ok(())
}
