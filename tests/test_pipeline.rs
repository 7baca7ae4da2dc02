use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fuse3d::pipeline::{
    Decoded, FrameSource, Modality, MultiViewFrame, MultiViewPipeline, PipelineParams,
};
use fuse3d::tessellation::DepthMap;
use image::{Rgba, RgbaImage};
use ndarray::Array2;
use rand::Rng;

/// In-memory rig whose decodes take a random time and can fail on demand.
struct SyntheticSource {
    num_rgb: usize,
    num_depth: usize,
    max_delay_ms: u64,
    /// Remaining transient failures per (modality, frame, camera).
    failures: Mutex<HashMap<(Modality, usize, usize), usize>>,
}

impl SyntheticSource {
    fn new(num_frames: usize) -> Self {
        Self {
            num_rgb: num_frames,
            num_depth: num_frames,
            max_delay_ms: 3,
            failures: Mutex::new(HashMap::new()),
        }
    }

    fn failing(self, modality: Modality, frame: usize, camera: usize, times: usize) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert((modality, frame, camera), times);
        self
    }

    fn decode<T>(
        &self,
        modality: Modality,
        frame: usize,
        camera: usize,
        make: impl FnOnce() -> T,
    ) -> Decoded<T> {
        let available = match modality {
            Modality::Rgb => self.num_rgb,
            Modality::Depth => self.num_depth,
        };
        if frame >= available {
            return Decoded::EndOfStream;
        }
        let delay = rand::thread_rng().gen_range(0..=self.max_delay_ms);
        std::thread::sleep(Duration::from_millis(delay));

        if let Some(remaining) = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&(modality, frame, camera))
        {
            if *remaining > 0 {
                *remaining -= 1;
                return Decoded::TransientError("busy".to_string());
            }
        }
        Decoded::Frame(make())
    }
}

impl FrameSource for SyntheticSource {
    fn decode_rgb(&self, frame: usize, camera: usize) -> Decoded<RgbaImage> {
        self.decode(Modality::Rgb, frame, camera, || {
            RgbaImage::from_pixel(1, 1, Rgba([frame as u8, camera as u8, 0, 255]))
        })
    }

    fn decode_depth(&self, frame: usize, camera: usize) -> Decoded<DepthMap> {
        self.decode(Modality::Depth, frame, camera, || {
            Array2::from_elem((2, 2), frame as f32 + camera as f32 / 10.0)
        })
    }
}

/// Rig that records how far ahead of the consumer it has been asked to decode.
#[derive(Clone, Default)]
struct CountingSource {
    num_frames: usize,
    /// Every frame after the first takes this long to decode.
    delay_ms: u64,
    rgb_decoded: Arc<AtomicUsize>,
    depth_decoded: Arc<AtomicUsize>,
    highest_rgb: Arc<AtomicUsize>,
}

impl CountingSource {
    fn new(num_frames: usize, delay_ms: u64) -> Self {
        Self {
            num_frames,
            delay_ms,
            ..Default::default()
        }
    }

    fn decode<T>(
        &self,
        frame: usize,
        counter: &AtomicUsize,
        make: impl FnOnce() -> T,
    ) -> Decoded<T> {
        if frame >= self.num_frames {
            return Decoded::EndOfStream;
        }
        if frame > 0 {
            std::thread::sleep(Duration::from_millis(self.delay_ms));
        }
        counter.fetch_add(1, Ordering::SeqCst);
        Decoded::Frame(make())
    }
}

impl FrameSource for CountingSource {
    fn decode_rgb(&self, frame: usize, camera: usize) -> Decoded<RgbaImage> {
        self.highest_rgb.fetch_max(frame, Ordering::SeqCst);
        self.decode(frame, &self.rgb_decoded, || {
            RgbaImage::from_pixel(1, 1, Rgba([frame as u8, camera as u8, 0, 255]))
        })
    }

    fn decode_depth(&self, frame: usize, _camera: usize) -> Decoded<DepthMap> {
        self.decode(frame, &self.depth_decoded, || {
            Array2::from_elem((2, 2), frame as f32)
        })
    }
}

fn params() -> PipelineParams {
    PipelineParams::default()
        .max_backlog(3)
        .warm_up_frames(2)
        .max_decode_retries(3)
        .permits(4)
}

async fn drain<S: FrameSource>(pipeline: &MultiViewPipeline<S>) -> Vec<MultiViewFrame> {
    let mut frames = Vec::new();
    let collect = async {
        while let Some(frame) = pipeline.next_frame().await {
            frames.push(frame);
        }
    };
    tokio::time::timeout(Duration::from_secs(30), collect)
        .await
        .expect("pipeline did not finish");
    frames
}

fn assert_frames(frames: &[MultiViewFrame], num_frames: usize, num_cameras: usize) {
    assert_eq!(
        frames.iter().map(|f| f.index).collect::<Vec<_>>(),
        (0..num_frames).collect::<Vec<_>>()
    );
    for frame in frames {
        assert_eq!(frame.cameras.len(), num_cameras);
        for (camera, views) in frame.cameras.iter().enumerate() {
            assert_eq!(views.rgb.get_pixel(0, 0).0[0] as usize, frame.index);
            assert_eq!(views.rgb.get_pixel(0, 0).0[1] as usize, camera);
            assert_eq!(
                views.depth[[0, 0]],
                frame.index as f32 + camera as f32 / 10.0
            );
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn frames_are_released_in_order_under_random_delays() {
    let pipeline = MultiViewPipeline::start(SyntheticSource::new(25), 3, params());
    assert_eq!(pipeline.num_cameras(), 3);

    let frames = drain(&pipeline).await;
    assert_frames(&frames, 25, 3);
    assert!(pipeline.is_exhausted());
    assert!(pipeline.try_next_frame().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transient_errors_are_retried() {
    let source = SyntheticSource::new(10)
        .failing(Modality::Rgb, 5, 1, 2)
        .failing(Modality::Depth, 0, 0, 3);
    let pipeline = MultiViewPipeline::start(source, 2, params());

    let frames = drain(&pipeline).await;
    assert_frames(&frames, 10, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn persistent_errors_end_the_stream() {
    let source = SyntheticSource::new(10).failing(Modality::Depth, 4, 1, usize::MAX);
    let pipeline = MultiViewPipeline::start(source, 2, params());

    let frames = drain(&pipeline).await;
    assert_frames(&frames, 4, 2);
    assert!(pipeline.is_exhausted());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shorter_modality_ends_the_stream() {
    let mut source = SyntheticSource::new(12);
    source.num_rgb = 6;
    let pipeline = MultiViewPipeline::start(source, 2, params());

    let frames = drain(&pipeline).await;
    assert_frames(&frames, 6, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_stream_is_exhausted() {
    let pipeline = MultiViewPipeline::start(SyntheticSource::new(0), 2, params());
    let frames = drain(&pipeline).await;
    assert!(frames.is_empty());
    assert!(pipeline.is_exhausted());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn consumer_never_blocks() {
    let mut source = SyntheticSource::new(3);
    source.max_delay_ms = 200;
    let pipeline = MultiViewPipeline::start(source, 1, params());

    let start = std::time::Instant::now();
    let _ = pipeline.try_next_frame();
    assert!(start.elapsed() < Duration::from_millis(100));

    let frames = drain(&pipeline).await;
    assert_eq!(frames.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn first_frame_waits_for_warm_up() {
    let source = CountingSource::new(20, 10);
    let pipeline = MultiViewPipeline::start(source.clone(), 2, params().warm_up_frames(3));

    let first = tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            if let Some(frame) = pipeline.try_next_frame() {
                // Snapshot before the consumer frees room in the queues.
                let rgb = source.rgb_decoded.load(Ordering::SeqCst);
                let depth = source.depth_decoded.load(Ordering::SeqCst);
                return (frame, rgb, depth);
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("no frame released");

    let (frame, rgb, depth) = first;
    assert_eq!(frame.index, 0);
    assert!(rgb >= 3 * 2, "released after {rgb} rgb decodes");
    assert!(depth >= 3 * 2, "released after {depth} depth decodes");

    let rest = drain(&pipeline).await;
    assert_eq!(rest.len(), 19);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn warm_up_is_cut_short_by_the_end_of_stream() {
    let source = CountingSource::new(1, 0);
    let pipeline = MultiViewPipeline::start(source, 2, params().warm_up_frames(3));

    let frames = drain(&pipeline).await;
    assert_eq!(frames.iter().map(|f| f.index).collect::<Vec<_>>(), vec![0]);
    assert!(pipeline.is_exhausted());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stalled_consumer_bounds_decoding() {
    let source = CountingSource::new(50, 1);
    let params = params().warm_up_frames(3);
    let bound = params.max_backlog + params.permits;
    let pipeline = MultiViewPipeline::start(source.clone(), 2, params);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let highest = source.highest_rgb.load(Ordering::SeqCst);
    assert!(highest <= bound, "decoded up to frame {highest} while stalled");

    // Producers resume once frames are consumed.
    let frames = drain(&pipeline).await;
    assert_eq!(frames.len(), 50);
    assert_eq!(source.rgb_decoded.load(Ordering::SeqCst), 50 * 2);
}
