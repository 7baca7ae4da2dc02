use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use image::RgbaImage;
use serde_derive::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, trace, warn};

use super::queue::FrameQueue;
use super::source::{Decoded, FrameSource, Modality};
use crate::tessellation::DepthMap;

/// Scheduling parameters of [`MultiViewPipeline`].
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineParams {
    /// Producers pause while any queue of their modality holds more frames than this.
    pub max_backlog: usize,
    /// Frames every queue must hold before the first frame is released.
    pub warm_up_frames: usize,
    /// Retries of a transient decode error before the frame is taken as the end.
    pub max_decode_retries: usize,
    /// Concurrent decodes, shared by both modalities.
    pub permits: usize,
    /// Sleep between polls, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            max_backlog: 8,
            warm_up_frames: 2,
            max_decode_retries: 3,
            permits: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            poll_interval_ms: 2,
        }
    }
}

impl PipelineParams {
    pub fn max_backlog(mut self, value: usize) -> Self {
        self.max_backlog = value;
        self
    }

    pub fn warm_up_frames(mut self, value: usize) -> Self {
        self.warm_up_frames = value;
        self
    }

    pub fn max_decode_retries(mut self, value: usize) -> Self {
        self.max_decode_retries = value;
        self
    }

    pub fn permits(mut self, value: usize) -> Self {
        self.permits = value.max(1);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// The RGB and depth images of one camera.
#[derive(Clone, Debug)]
pub struct CameraFrame {
    pub rgb: RgbaImage,
    pub depth: DepthMap,
}

/// All cameras of one frame, in camera order.
#[derive(Clone, Debug)]
pub struct MultiViewFrame {
    pub index: usize,
    pub cameras: Vec<CameraFrame>,
}

struct Queues {
    rgb: Vec<FrameQueue<RgbaImage>>,
    depth: Vec<FrameQueue<DepthMap>>,
    next_index: usize,
    warmed_up: bool,
}

impl Queues {
    fn new(num_cameras: usize) -> Self {
        Self {
            rgb: (0..num_cameras).map(|_| FrameQueue::default()).collect(),
            depth: (0..num_cameras).map(|_| FrameQueue::default()).collect(),
            next_index: 0,
            warmed_up: false,
        }
    }

    fn longest(&self, modality: Modality) -> usize {
        match modality {
            Modality::Rgb => self.rgb.iter().map(FrameQueue::len).max(),
            Modality::Depth => self.depth.iter().map(FrameQueue::len).max(),
        }
        .unwrap_or(0)
    }

    fn head_ready(&self, modality: Modality) -> bool {
        let expected = Some(self.next_index);
        if self.rgb.is_empty() {
            return false;
        }
        match modality {
            Modality::Rgb => self.rgb.iter().all(|queue| queue.head() == expected),
            Modality::Depth => self.depth.iter().all(|queue| queue.head() == expected),
        }
    }

    fn warm(&self, modality: Modality, warm_up: usize) -> bool {
        match modality {
            Modality::Rgb => self.rgb.iter().all(|queue| queue.len() >= warm_up),
            Modality::Depth => self.depth.iter().all(|queue| queue.len() >= warm_up),
        }
    }
}

struct ModalityState {
    end_of_stream: AtomicBool,
    in_flight: AtomicUsize,
}

impl ModalityState {
    fn new() -> Self {
        Self {
            end_of_stream: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
        }
    }

    fn is_finished(&self) -> bool {
        self.end_of_stream.load(Ordering::SeqCst) && self.in_flight.load(Ordering::SeqCst) == 0
    }
}

struct Shared<S> {
    source: S,
    num_cameras: usize,
    params: PipelineParams,
    queues: Mutex<Queues>,
    rgb: ModalityState,
    depth: ModalityState,
    closed: AtomicBool,
}

impl<S: FrameSource> Shared<S> {
    fn queues(&self) -> MutexGuard<'_, Queues> {
        self.queues
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state(&self, modality: Modality) -> &ModalityState {
        match modality {
            Modality::Rgb => &self.rgb,
            Modality::Depth => &self.depth,
        }
    }

    /// Decodes one camera, retrying transient errors.
    fn decode_with_retries<T>(
        &self,
        modality: Modality,
        frame: usize,
        camera: usize,
        decode: impl Fn(&S, usize, usize) -> Decoded<T>,
    ) -> Option<T> {
        for attempt in 0..=self.params.max_decode_retries {
            match decode(&self.source, frame, camera) {
                Decoded::Frame(payload) => return Some(payload),
                Decoded::EndOfStream => return None,
                Decoded::TransientError(reason) => warn!(
                    modality = modality.name(),
                    frame,
                    camera,
                    attempt,
                    %reason,
                    "transient decode error"
                ),
            }
        }
        None
    }

    /// Decodes a frame for every camera and queues it, or flags the end of the stream.
    /// Runs on a blocking thread.
    fn decode_frame(&self, modality: Modality, frame: usize) {
        let complete = match modality {
            Modality::Rgb => (0..self.num_cameras)
                .map(|camera| {
                    self.decode_with_retries(modality, frame, camera, |source, f, c| {
                        source.decode_rgb(f, c)
                    })
                })
                .collect::<Option<Vec<_>>>()
                .map(|images| {
                    let mut queues = self.queues();
                    for (queue, image) in queues.rgb.iter_mut().zip(images) {
                        queue.push(frame, image);
                    }
                }),
            Modality::Depth => (0..self.num_cameras)
                .map(|camera| {
                    self.decode_with_retries(modality, frame, camera, |source, f, c| {
                        source.decode_depth(f, c)
                    })
                })
                .collect::<Option<Vec<_>>>()
                .map(|depths| {
                    let mut queues = self.queues();
                    for (queue, depth) in queues.depth.iter_mut().zip(depths) {
                        queue.push(frame, depth);
                    }
                }),
        };

        if complete.is_none() {
            trace!(modality = modality.name(), frame, "end of stream");
            self.state(modality)
                .end_of_stream
                .store(true, Ordering::SeqCst);
        }
    }

    /// True once no new frame can be released: a modality reached its end with nothing
    /// in flight and its queues do not hold the expected frame.
    fn is_exhausted(&self) -> bool {
        let queues = self.queues();
        [Modality::Rgb, Modality::Depth]
            .into_iter()
            .any(|modality| self.state(modality).is_finished() && !queues.head_ready(modality))
    }

    fn try_next_frame(&self) -> Option<MultiViewFrame> {
        let mut queues = self.queues();
        if !(queues.head_ready(Modality::Rgb) && queues.head_ready(Modality::Depth)) {
            return None;
        }
        if !queues.warmed_up {
            // Producers stop filling a queue past the backlog.
            let warm_up = self.params.warm_up_frames.min(self.params.max_backlog + 1);
            let warm = |modality| {
                queues.warm(modality, warm_up)
                    || self.state(modality).end_of_stream.load(Ordering::SeqCst)
            };
            if !(warm(Modality::Rgb) && warm(Modality::Depth)) {
                return None;
            }
            queues.warmed_up = true;
        }

        let index = queues.next_index;
        let mut cameras = Vec::with_capacity(self.num_cameras);
        for camera in 0..self.num_cameras {
            let rgb = queues.rgb[camera].pop().map(|(_, image)| image);
            let depth = queues.depth[camera].pop().map(|(_, depth)| depth);
            if let (Some(rgb), Some(depth)) = (rgb, depth) {
                cameras.push(CameraFrame { rgb, depth });
            }
        }
        queues.next_index += 1;
        Some(MultiViewFrame { index, cameras })
    }
}

/// Decodes the RGB and depth streams of a camera rig concurrently and releases them as
/// complete multi-view frames, strictly in frame order.
///
/// Each modality has a producer task that schedules frame indices in order. A decode
/// needs a permit of a shared semaphore and runs on a blocking thread, so frames may
/// complete out of order; per camera priority queues restore the order. Producers back
/// off while their queues are longer than `max_backlog`.
pub struct MultiViewPipeline<S: FrameSource> {
    shared: Arc<Shared<S>>,
    producers: Vec<JoinHandle<()>>,
}

impl<S: FrameSource> MultiViewPipeline<S> {
    /// Starts the producers. Must be called from within a tokio runtime.
    pub fn start(source: S, num_cameras: usize, params: PipelineParams) -> Self {
        let semaphore = Arc::new(Semaphore::new(params.permits.max(1)));
        info!(
            num_cameras,
            permits = params.permits,
            max_backlog = params.max_backlog,
            "starting frame pipeline"
        );
        let shared = Arc::new(Shared {
            source,
            num_cameras,
            params,
            queues: Mutex::new(Queues::new(num_cameras)),
            rgb: ModalityState::new(),
            depth: ModalityState::new(),
            closed: AtomicBool::new(false),
        });
        if num_cameras == 0 {
            warn!("frame pipeline started without cameras");
            for modality in [Modality::Rgb, Modality::Depth] {
                shared
                    .state(modality)
                    .end_of_stream
                    .store(true, Ordering::SeqCst);
            }
        }

        let producers = [Modality::Rgb, Modality::Depth]
            .into_iter()
            .map(|modality| tokio::spawn(produce(shared.clone(), semaphore.clone(), modality)))
            .collect();
        Self { shared, producers }
    }

    pub fn num_cameras(&self) -> usize {
        self.shared.num_cameras
    }

    /// The next frame if every camera has it decoded in both modalities, without waiting.
    pub fn try_next_frame(&self) -> Option<MultiViewFrame> {
        self.shared.try_next_frame()
    }

    /// True when the stream ended and no further frame will be released.
    pub fn is_exhausted(&self) -> bool {
        self.shared.is_exhausted()
    }

    /// Waits for the next frame, `None` once the pipeline is exhausted.
    pub async fn next_frame(&self) -> Option<MultiViewFrame> {
        loop {
            if let Some(frame) = self.try_next_frame() {
                return Some(frame);
            }
            if self.is_exhausted() {
                return None;
            }
            tokio::time::sleep(self.shared.params.poll_interval()).await;
        }
    }
}

impl<S: FrameSource> Drop for MultiViewPipeline<S> {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        for producer in self.producers.iter() {
            producer.abort();
        }
    }
}

async fn produce<S: FrameSource>(
    shared: Arc<Shared<S>>,
    semaphore: Arc<Semaphore>,
    modality: Modality,
) {
    let interval = shared.params.poll_interval();
    let state = shared.state(modality);
    let mut next_frame = 0usize;

    loop {
        loop {
            let backlog = shared.queues().longest(modality);
            if backlog <= shared.params.max_backlog {
                break;
            }
            if shared.closed.load(Ordering::SeqCst) || shared.is_exhausted() {
                return;
            }
            trace!(modality = modality.name(), backlog, "backlog full");
            tokio::time::sleep(interval).await;
        }

        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        // Counted before the end flag is checked so consumers never see a finished
        // modality while a decode is being scheduled.
        state.in_flight.fetch_add(1, Ordering::SeqCst);
        if state.end_of_stream.load(Ordering::SeqCst)
            || shared.closed.load(Ordering::SeqCst)
            || shared.is_exhausted()
        {
            state.in_flight.fetch_sub(1, Ordering::SeqCst);
            return;
        }

        let frame = next_frame;
        next_frame += 1;
        trace!(modality = modality.name(), frame, "scheduling decode");

        let worker = shared.clone();
        tokio::spawn(async move {
            let decoder = worker.clone();
            let result =
                tokio::task::spawn_blocking(move || decoder.decode_frame(modality, frame)).await;
            if let Err(err) = result {
                warn!(modality = modality.name(), frame, %err, "decode task failed");
                worker
                    .state(modality)
                    .end_of_stream
                    .store(true, Ordering::SeqCst);
            }
            worker.state(modality).in_flight.fetch_sub(1, Ordering::SeqCst);
            drop(permit);
        });
    }
}
