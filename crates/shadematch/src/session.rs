//! Live try-on session: camera, landmark detector and overlay surface
//! driven by one render task.
//!
//! The task owns the video source and the detector. Callers talk to it
//! through a [`SessionHandle`]; shade state is shared behind a lock so a
//! recommendation swap is never observed half-done by the render loop.

use crate::config::Config;
use shadematch_core::classifier::{ClassifierError, ImageData, ShadeRecommender, TaggedProduct};
use shadematch_core::shades::select_recommendations;
use shadematch_core::{
    Compositor, DetectorError, FaceLandmarks, FaceMeshDetector, LandmarkDetector, Product, Shade, ShadeBook,
    ShadeCategory, Surface,
};
use shadematch_hw::{CameraError, Frame, FrameError, VideoSource};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Shortest render tick, whatever frame rate is asked for.
const MIN_FRAME_PERIOD: Duration = Duration::from_millis(1);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("snapshot failed: {0}")]
    Frame(#[from] FrameError),
    #[error("recommendation failed: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("shade not in the current list: {0}")]
    UnknownShade(String),
    #[error("no camera frame captured yet")]
    NoFrame,
    #[error("{0}")]
    NoRecommendations(String),
    #[error("session worker failed: {0}")]
    Worker(String),
    #[error("session task exited")]
    Closed,
}

/// Camera/detector state of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Waiting for the camera to open and report frame dimensions.
    AwaitingCamera,
    Running,
    /// Terminal until the session is recreated.
    Error(String),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub frame_rate: u32,
    pub snapshot_quality: u8,
    /// Products offered to the recommender.
    pub catalog: Vec<Product>,
}

impl SessionOptions {
    pub fn from_config(config: &Config, catalog: &[Product]) -> Self {
        Self {
            frame_rate: config.frame_rate,
            snapshot_quality: config.snapshot_quality,
            catalog: catalog.to_vec(),
        }
    }
}

struct SessionState {
    book: ShadeBook,
    selected: Shade,
}

enum SessionCommand {
    Snapshot {
        reply: oneshot::Sender<Result<Frame, SessionError>>,
    },
}

/// Controller for a running session. Dropping it cancels the session.
pub struct SessionHandle {
    state: Arc<RwLock<SessionState>>,
    status: watch::Receiver<SessionStatus>,
    cancel: watch::Sender<bool>,
    commands: mpsc::Sender<SessionCommand>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    frames: Arc<AtomicU64>,
    final_frame: Arc<Mutex<Option<Frame>>>,
    tagged: Vec<TaggedProduct>,
    snapshot_quality: u8,
}

impl SessionHandle {
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Wait until the status satisfies `pred`.
    pub async fn wait_for_status(
        &self,
        mut pred: impl FnMut(&SessionStatus) -> bool,
    ) -> Result<SessionStatus, SessionError> {
        let mut rx = self.status.clone();
        let status = rx.wait_for(|s| pred(s)).await.map_err(|_| SessionError::Closed)?;
        Ok(status.clone())
    }

    /// Frames composed since the session started.
    pub fn frames_rendered(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn shades(&self) -> Vec<Shade> {
        self.read_state().book.shades().to_vec()
    }

    pub fn selected(&self) -> Shade {
        self.read_state().selected.clone()
    }

    /// Make `name` the active shade. Takes effect on the next frame.
    pub fn select_shade(&self, name: &str) -> Result<Shade, SessionError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let shade = state
            .book
            .find(name)
            .cloned()
            .ok_or_else(|| SessionError::UnknownShade(name.to_string()))?;
        tracing::debug!(shade = %shade.name, color = %shade.color, "shade selected");
        state.selected = shade.clone();
        Ok(shade)
    }

    /// The latest camera frame, mirrored as the user sees it.
    pub async fn snapshot(&self) -> Result<Frame, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Snapshot { reply: reply_tx })
            .await
            .map_err(|_| SessionError::Closed)?;
        reply_rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Send a mirrored snapshot to `recommender` and swap in the result as
    /// the Recommended category. Returns the new shades; the first becomes
    /// the selected shade.
    pub async fn request_recommendations<R: ShadeRecommender>(
        &self,
        recommender: &R,
    ) -> Result<Vec<Shade>, SessionError> {
        let frame = self.snapshot().await?;
        let image = ImageData {
            mime_type: "image/jpeg".to_string(),
            bytes: frame.encode_jpeg(self.snapshot_quality)?,
        };

        let response = recommender.recommend(&image, &self.tagged).await?;
        if let Some(message) = response.error {
            tracing::info!(%message, "recommender declined");
            return Err(SessionError::NoRecommendations(message));
        }

        let fresh = select_recommendations(&response.recommendations);
        if fresh.is_empty() {
            return Err(SessionError::NoRecommendations(
                "Couldn't find recommendations. Try a photo with different lighting.".to_string(),
            ));
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.book.replace_recommended(fresh);
        let added: Vec<Shade> = state
            .book
            .shades()
            .iter()
            .take_while(|s| s.category == ShadeCategory::Recommended)
            .cloned()
            .collect();
        if let Some(first) = added.first() {
            state.selected = first.clone();
        }
        tracing::info!(count = added.len(), "recommended shades replaced");
        Ok(added)
    }

    /// Stop the camera and the render loop. Safe to call repeatedly.
    pub async fn cancel(&self) {
        self.cancel.send_replace(true);
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "session task ended abnormally");
            }
        }
    }

    /// The last composed frame, mirrored, once the session has ended.
    ///
    /// It pairs with the final state of the overlay surface.
    pub fn last_frame(&self) -> Option<Frame> {
        self.final_frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(Frame::mirrored)
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
    }
}

/// Load the face-mesh detector from `config` on the blocking pool.
pub async fn load_detector(config: &Config) -> Result<FaceMeshDetector, DetectorError> {
    let path = config.facemesh_model_path();
    let threshold = config.landmark_score_threshold;
    tokio::task::spawn_blocking(move || FaceMeshDetector::load(&path, threshold))
        .await
        .map_err(|e| DetectorError::Unavailable(format!("detector loader panicked: {e}")))?
}

/// Start a session on the current tokio runtime.
///
/// `open_video` runs inside the session task, so a camera that cannot be
/// opened moves the session from `AwaitingCamera` to `Error` instead of
/// failing here.
pub fn spawn_session<F, V, D, S>(
    open_video: F,
    detector: D,
    surface: Arc<Mutex<S>>,
    options: SessionOptions,
) -> SessionHandle
where
    F: FnOnce() -> Result<V, CameraError> + Send + 'static,
    V: VideoSource + 'static,
    D: LandmarkDetector + 'static,
    S: Surface + Send + 'static,
{
    let book = ShadeBook::new();
    let selected = book.default_shade();
    let state = Arc::new(RwLock::new(SessionState { book, selected }));
    let (status_tx, status_rx) = watch::channel(SessionStatus::AwaitingCamera);
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let (cmd_tx, cmd_rx) = mpsc::channel(4);
    let frames = Arc::new(AtomicU64::new(0));
    let final_frame = Arc::new(Mutex::new(None));

    let task = RenderTask {
        state: Arc::clone(&state),
        status: status_tx,
        cancel: cancel_rx,
        commands: cmd_rx,
        surface,
        frames: Arc::clone(&frames),
        compositor: Compositor::new(),
        period: frame_period(options.frame_rate),
        last_frame: None,
        final_frame: Arc::clone(&final_frame),
    };
    let join = tokio::spawn(task.run(open_video, detector));

    SessionHandle {
        state,
        status: status_rx,
        cancel: cancel_tx,
        commands: cmd_tx,
        task: tokio::sync::Mutex::new(Some(join)),
        frames,
        final_frame,
        tagged: TaggedProduct::tag_all(&options.catalog),
        snapshot_quality: options.snapshot_quality,
    }
}

/// Tick period for `frame_rate`, never shorter than [`MIN_FRAME_PERIOD`].
fn frame_period(frame_rate: u32) -> Duration {
    (Duration::from_secs(1) / frame_rate.max(1)).max(MIN_FRAME_PERIOD)
}

/// Owns the video source and stops it exactly once.
struct ActiveCamera<V: VideoSource> {
    source: V,
    stopped: bool,
}

impl<V: VideoSource> ActiveCamera<V> {
    fn new(source: V) -> Self {
        Self { source, stopped: false }
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.source.stop();
            tracing::info!("camera stopped");
        }
    }
}

impl<V: VideoSource> Drop for ActiveCamera<V> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Camera plus detector, moved onto the blocking pool for each cycle.
struct Pipeline<V: VideoSource, D> {
    camera: ActiveCamera<V>,
    detector: D,
}

enum Step {
    /// No decodable frame this tick.
    Skipped,
    Detected { frame: Frame, faces: Vec<FaceLandmarks> },
}

impl<V: VideoSource, D: LandmarkDetector> Pipeline<V, D> {
    /// Grab one frame and run detection on it, unmirrored.
    fn step(&mut self) -> Result<Step, SessionError> {
        let Some(frame) = self.camera.source.grab()? else {
            return Ok(Step::Skipped);
        };
        match self.detector.detect(&frame.data, frame.width, frame.height) {
            Ok(faces) => Ok(Step::Detected { frame, faces }),
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                tracing::debug!(error = %e, sequence = frame.sequence, "detection failed; skipping frame");
                Ok(Step::Skipped)
            }
        }
    }
}

struct RenderTask<S> {
    state: Arc<RwLock<SessionState>>,
    status: watch::Sender<SessionStatus>,
    cancel: watch::Receiver<bool>,
    commands: mpsc::Receiver<SessionCommand>,
    surface: Arc<Mutex<S>>,
    frames: Arc<AtomicU64>,
    compositor: Compositor,
    period: Duration,
    last_frame: Option<Frame>,
    final_frame: Arc<Mutex<Option<Frame>>>,
}

impl<S: Surface + Send + 'static> RenderTask<S> {
    async fn run<F, V, D>(mut self, open_video: F, detector: D)
    where
        F: FnOnce() -> Result<V, CameraError> + Send + 'static,
        V: VideoSource + 'static,
        D: LandmarkDetector + 'static,
    {
        let source = match tokio::task::spawn_blocking(open_video).await {
            Ok(Ok(source)) => source,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "camera unavailable");
                self.fail(e.to_string());
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "camera open panicked");
                self.fail(e.to_string());
                return;
            }
        };

        let mut pipeline = Some(Pipeline {
            camera: ActiveCamera::new(source),
            detector,
        });

        let mut ticks = tokio::time::interval(self.period);
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        while let Some(mut current) = pipeline.take() {
            if *self.cancel.borrow() {
                pipeline = Some(current);
                break;
            }

            tokio::select! {
                biased;
                _ = self.cancel.changed() => {
                    pipeline = Some(current);
                    break;
                }
                cmd = self.commands.recv() => {
                    pipeline = Some(current);
                    match cmd {
                        Some(cmd) => self.serve(cmd),
                        None => break,
                    }
                }
                _ = ticks.tick() => {
                    if !self.await_dimensions(&current) {
                        pipeline = Some(current);
                        continue;
                    }
                    match run_blocking(current, Pipeline::step).await {
                        Ok((p, Ok(step))) => {
                            self.draw(step);
                            pipeline = Some(p);
                        }
                        Ok((mut p, Err(e))) => {
                            tracing::error!(error = %e, "session failed");
                            p.camera.stop();
                            self.fail(e.to_string());
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "render cycle panicked");
                            self.fail(e.to_string());
                        }
                    }
                }
            }
        }

        // Camera first, then the pending tick.
        if let Some(mut p) = pipeline {
            p.camera.stop();
        }
        drop(ticks);
        *self.final_frame.lock().unwrap_or_else(PoisonError::into_inner) = self.last_frame.take();
        tracing::info!(frames = self.frames.load(Ordering::Relaxed), "session ended");
    }

    /// Promote `AwaitingCamera` to `Running` once the source has dimensions.
    fn await_dimensions<V: VideoSource, D>(&self, pipeline: &Pipeline<V, D>) -> bool {
        let Some((width, height)) = pipeline.camera.source.dimensions() else {
            return false;
        };
        if *self.status.borrow() == SessionStatus::AwaitingCamera {
            tracing::info!(width, height, "camera running");
            self.status.send_replace(SessionStatus::Running);
        }
        true
    }

    fn draw(&mut self, step: Step) {
        let Step::Detected { frame, faces } = step else {
            return;
        };
        let color = self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .selected
            .color;

        {
            let mut surface = self.surface.lock().unwrap_or_else(PoisonError::into_inner);
            self.compositor.fit_surface(&mut *surface, frame.width, frame.height);
            let drawn = self.compositor.compose(&mut *surface, &faces, color);
            tracing::trace!(sequence = frame.sequence, faces = faces.len(), drawn, "frame composed");
        }

        self.frames.fetch_add(1, Ordering::Relaxed);
        self.last_frame = Some(frame);
    }

    fn serve(&self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Snapshot { reply } => {
                let result = self
                    .last_frame
                    .as_ref()
                    .map(Frame::mirrored)
                    .ok_or(SessionError::NoFrame);
                let _ = reply.send(result);
            }
        }
    }

    fn fail(&self, reason: String) {
        self.status.send_replace(SessionStatus::Error(reason));
    }
}

/// Run `f` on the blocking pool with `value` moved in, handing it back.
async fn run_blocking<T, R>(mut value: T, f: fn(&mut T) -> R) -> Result<(T, R), SessionError>
where
    T: Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let out = f(&mut value);
        (value, out)
    })
    .await
    .map_err(|e| SessionError::Worker(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadematch_core::classifier::RecommendationResponse;
    use shadematch_core::landmarks::{FACE_MESH_POINTS, LIPS_OUTER_CONTOUR};
    use shadematch_core::shades::RecommendedShade;
    use shadematch_core::{Canvas, Catalog, Point, ToneCategory};
    use std::sync::atomic::AtomicUsize;

    /// Solid gray frames; counts every stop() call it receives.
    struct CountingSource {
        width: u32,
        height: u32,
        stops: Arc<AtomicUsize>,
    }

    impl VideoSource for CountingSource {
        fn dimensions(&self) -> Option<(u32, u32)> {
            Some((self.width, self.height))
        }

        fn grab(&mut self) -> Result<Option<Frame>, CameraError> {
            let data = vec![128u8; self.width as usize * self.height as usize * 3];
            Ok(Some(Frame::from_rgb(data, self.width, self.height, 0).unwrap()))
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// One face whose outer lip forms a box at [10, 20] x [10, 20].
    struct BoxLips;

    impl LandmarkDetector for BoxLips {
        fn detect(&mut self, _rgb: &[u8], _w: u32, _h: u32) -> Result<Vec<FaceLandmarks>, DetectorError> {
            let mut points = vec![Point::new(15.0, 15.0); FACE_MESH_POINTS];
            let corners = [(10.0, 10.0), (20.0, 10.0), (20.0, 20.0), (10.0, 20.0)];
            for (i, &idx) in LIPS_OUTER_CONTOUR.iter().enumerate() {
                let (x, y) = corners[(i * corners.len()) / LIPS_OUTER_CONTOUR.len()];
                points[idx] = Point::new(x, y);
            }
            Ok(vec![FaceLandmarks::new(points, 1.0)])
        }
    }

    struct DeadDetector;

    impl LandmarkDetector for DeadDetector {
        fn detect(&mut self, _rgb: &[u8], _w: u32, _h: u32) -> Result<Vec<FaceLandmarks>, DetectorError> {
            Err(DetectorError::Unavailable("model unloaded".into()))
        }
    }

    /// Fails every odd-numbered call with a per-frame error.
    struct FlakyDetector {
        calls: Arc<AtomicUsize>,
    }

    impl LandmarkDetector for FlakyDetector {
        fn detect(&mut self, rgb: &[u8], w: u32, h: u32) -> Result<Vec<FaceLandmarks>, DetectorError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call % 2 == 1 {
                return Err(DetectorError::InferenceFailed("blurry frame".into()));
            }
            BoxLips.detect(rgb, w, h)
        }
    }

    /// Frame sizes cycle through `sizes`; every odd grab yields no frame
    /// when `gaps` is set.
    struct FlakySource {
        sizes: Vec<(u32, u32)>,
        gaps: bool,
        grabs: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
    }

    impl VideoSource for FlakySource {
        fn dimensions(&self) -> Option<(u32, u32)> {
            self.sizes.first().copied()
        }

        fn grab(&mut self) -> Result<Option<Frame>, CameraError> {
            let grab = self.grabs.fetch_add(1, Ordering::SeqCst) + 1;
            if self.gaps && grab % 2 == 1 {
                return Ok(None);
            }
            let (width, height) = self.sizes[grab % self.sizes.len()];
            let data = vec![90u8; width as usize * height as usize * 3];
            Ok(Some(Frame::from_rgb(data, width, height, grab as u32).unwrap()))
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FixedRecommender(RecommendationResponse);

    impl ShadeRecommender for FixedRecommender {
        async fn recommend(
            &self,
            image: &ImageData,
            catalog: &[TaggedProduct],
        ) -> Result<RecommendationResponse, ClassifierError> {
            assert_eq!(image.mime_type, "image/jpeg");
            assert_eq!(&image.bytes[..2], &[0xFF, 0xD8]);
            assert!(!catalog.is_empty());
            Ok(self.0.clone())
        }
    }

    fn options() -> SessionOptions {
        SessionOptions {
            frame_rate: 200,
            snapshot_quality: 95,
            catalog: Catalog::builtin().products().to_vec(),
        }
    }

    fn start(stops: &Arc<AtomicUsize>) -> (SessionHandle, Arc<Mutex<Canvas>>) {
        let canvas = Arc::new(Mutex::new(Canvas::new(0, 0)));
        let source = CountingSource {
            width: 32,
            height: 24,
            stops: Arc::clone(stops),
        };
        let handle = spawn_session(move || Ok(source), BoxLips, Arc::clone(&canvas), options());
        (handle, canvas)
    }

    fn spawn_with<V, D>(source: V, detector: D, frame_rate: u32) -> (SessionHandle, Arc<Mutex<Canvas>>)
    where
        V: VideoSource + 'static,
        D: LandmarkDetector + 'static,
    {
        let canvas = Arc::new(Mutex::new(Canvas::new(0, 0)));
        let options = SessionOptions { frame_rate, ..options() };
        let handle = spawn_session(move || Ok(source), detector, Arc::clone(&canvas), options);
        (handle, canvas)
    }

    fn flaky(sizes: Vec<(u32, u32)>, gaps: bool) -> (FlakySource, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let grabs = Arc::new(AtomicUsize::new(0));
        let stops = Arc::new(AtomicUsize::new(0));
        let source = FlakySource {
            sizes,
            gaps,
            grabs: Arc::clone(&grabs),
            stops: Arc::clone(&stops),
        };
        (source, grabs, stops)
    }

    async fn wait_frames(handle: &SessionHandle, n: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while handle.frames_rendered() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("session never rendered");
    }

    fn recs(tag: &str) -> RecommendationResponse {
        let entry = |category: ToneCategory, hex: &str| RecommendedShade {
            category,
            hex_color: hex.into(),
            product_name: format!("{tag} {category:?}"),
            brand: "Acme".into(),
        };
        RecommendationResponse {
            recommendations: vec![
                entry(ToneCategory::Red, "#B01020"),
                entry(ToneCategory::Pink, "#E090A0"),
                entry(ToneCategory::Nude, "#C09080"),
            ],
            error: None,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_runs_and_draws_mirrored_overlay() {
        let stops = Arc::new(AtomicUsize::new(0));
        let (handle, canvas) = start(&stops);

        let status = handle
            .wait_for_status(|s| *s != SessionStatus::AwaitingCamera)
            .await
            .unwrap();
        assert_eq!(status, SessionStatus::Running);
        wait_frames(&handle, 2).await;

        {
            let canvas = canvas.lock().unwrap();
            let image = canvas.image();
            assert_eq!((image.width(), image.height()), (32, 24));
            // Lip box spans raw x 10..20, drawn at 32 - x.
            assert!(image.get_pixel(17, 15).0[3] > 0);
            assert_eq!(image.get_pixel(2, 15).0[3], 0);
        }

        handle.cancel().await;
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_twice_stops_camera_once() {
        let stops = Arc::new(AtomicUsize::new(0));
        let (handle, _canvas) = start(&stops);
        wait_frames(&handle, 1).await;

        handle.cancel().await;
        handle.cancel().await;
        drop(handle);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drop_releases_camera() {
        let stops = Arc::new(AtomicUsize::new(0));
        let (handle, _canvas) = start(&stops);
        wait_frames(&handle, 1).await;
        drop(handle);

        tokio::time::timeout(Duration::from_secs(5), async {
            while stops.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_camera_denied_is_error() {
        let canvas = Arc::new(Mutex::new(Canvas::new(0, 0)));
        let handle = spawn_session(
            || -> Result<CountingSource, CameraError> {
                Err(CameraError::PermissionDenied("/dev/video0".into()))
            },
            BoxLips,
            canvas,
            options(),
        );
        let status = handle
            .wait_for_status(|s| matches!(s, SessionStatus::Error(_)))
            .await
            .unwrap();
        assert!(matches!(status, SessionStatus::Error(msg) if msg.contains("denied")));
        assert!(matches!(handle.snapshot().await, Err(SessionError::Closed)));
        handle.cancel().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unavailable_detector_is_error() {
        let stops = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            width: 8,
            height: 8,
            stops: Arc::clone(&stops),
        };
        let canvas = Arc::new(Mutex::new(Canvas::new(0, 0)));
        let handle = spawn_session(move || Ok(source), DeadDetector, canvas, options());

        handle
            .wait_for_status(|s| matches!(s, SessionStatus::Error(_)))
            .await
            .unwrap();
        handle.cancel().await;
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(handle.frames_rendered(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_select_shade() {
        let stops = Arc::new(AtomicUsize::new(0));
        let (handle, _canvas) = start(&stops);

        assert_eq!(handle.selected().name, "Classic Red");
        let shade = handle.select_shade("Dusty Rose").unwrap();
        assert_eq!(handle.selected(), shade);
        assert!(matches!(
            handle.select_shade("Invisible Ink"),
            Err(SessionError::UnknownShade(_))
        ));
        assert_eq!(handle.selected().name, "Dusty Rose");
        handle.cancel().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_recommendations_replace_previous_set() {
        let stops = Arc::new(AtomicUsize::new(0));
        let (handle, _canvas) = start(&stops);
        wait_frames(&handle, 1).await;
        let statics: Vec<Shade> = handle
            .shades()
            .into_iter()
            .filter(|s| s.category != ShadeCategory::Recommended)
            .collect();

        let first = handle
            .request_recommendations(&FixedRecommender(recs("Old")))
            .await
            .unwrap();
        assert_eq!(first.len(), 3);

        let second = handle
            .request_recommendations(&FixedRecommender(recs("New")))
            .await
            .unwrap();
        assert_eq!(handle.selected(), second[0]);

        let shades = handle.shades();
        let recommended: Vec<&Shade> = shades
            .iter()
            .filter(|s| s.category == ShadeCategory::Recommended)
            .collect();
        assert_eq!(recommended.len(), 3);
        assert!(recommended.iter().all(|s| s.name.starts_with("Acme - New")));
        let rest: Vec<Shade> = shades
            .into_iter()
            .filter(|s| s.category != ShadeCategory::Recommended)
            .collect();
        assert_eq!(rest, statics);

        handle.cancel().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_recommender_refusal_keeps_shades() {
        let stops = Arc::new(AtomicUsize::new(0));
        let (handle, _canvas) = start(&stops);
        wait_frames(&handle, 1).await;
        let before = handle.shades();

        let refusal = RecommendationResponse {
            recommendations: Vec::new(),
            error: Some("Could not analyze the face in the photo.".into()),
        };
        let err = handle
            .request_recommendations(&FixedRecommender(refusal))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NoRecommendations(ref m) if m.contains("analyze")));

        let empty = RecommendationResponse::default();
        assert!(matches!(
            handle.request_recommendations(&FixedRecommender(empty)).await,
            Err(SessionError::NoRecommendations(_))
        ));
        assert_eq!(handle.shades(), before);
        handle.cancel().await;
    }

    #[test]
    fn test_frame_period_bounds() {
        assert_eq!(frame_period(0), Duration::from_secs(1));
        assert_eq!(frame_period(50), Duration::from_millis(20));
        assert_eq!(frame_period(2_000_000_000), MIN_FRAME_PERIOD);
        assert_eq!(frame_period(u32::MAX), MIN_FRAME_PERIOD);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_huge_frame_rate_still_renders() {
        let stops = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            width: 32,
            height: 24,
            stops: Arc::clone(&stops),
        };
        let (handle, _canvas) = spawn_with(source, BoxLips, 2_000_000_000);

        wait_frames(&handle, 3).await;
        handle.cancel().await;
        assert_eq!(handle.status(), SessionStatus::Running);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_missing_frames_are_skipped() {
        let (source, grabs, stops) = flaky(vec![(32, 24)], true);
        let (handle, _canvas) = spawn_with(source, BoxLips, 200);

        wait_frames(&handle, 3).await;
        handle.cancel().await;

        assert_eq!(handle.status(), SessionStatus::Running);
        assert_eq!(handle.frames_rendered(), grabs.load(Ordering::SeqCst) as u64 / 2);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_no_dimensions_keeps_awaiting_camera() {
        let (source, grabs, stops) = flaky(Vec::new(), false);
        let (handle, _canvas) = spawn_with(source, BoxLips, 200);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.status(), SessionStatus::AwaitingCamera);
        handle.cancel().await;

        assert_eq!(handle.status(), SessionStatus::AwaitingCamera);
        assert_eq!(grabs.load(Ordering::SeqCst), 0);
        assert_eq!(handle.frames_rendered(), 0);
        assert!(handle.last_frame().is_none());
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_transient_detector_failures_are_skipped() {
        let stops = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            width: 32,
            height: 24,
            stops: Arc::clone(&stops),
        };
        let detector = FlakyDetector { calls: Arc::clone(&calls) };
        let (handle, _canvas) = spawn_with(source, detector, 200);

        wait_frames(&handle, 3).await;
        handle.cancel().await;

        assert_eq!(handle.status(), SessionStatus::Running);
        assert_eq!(handle.frames_rendered(), calls.load(Ordering::SeqCst) as u64 / 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_last_frame_matches_final_overlay() {
        let (source, _grabs, _stops) = flaky(vec![(32, 24), (16, 12), (24, 18)], false);
        let (handle, canvas) = spawn_with(source, BoxLips, 200);

        wait_frames(&handle, 4).await;
        assert!(handle.last_frame().is_none());
        handle.cancel().await;

        let frame = handle.last_frame().unwrap();
        let canvas = canvas.lock().unwrap();
        assert_eq!((frame.width, frame.height), (canvas.image().width(), canvas.image().height()));
    }
}
