//! Capture session orchestration.
//!
//! [`CaptureSession`] owns every piece of mutable engine state (guide cache,
//! sampling throttle, alignment engine, status board) and is driven by
//! [`CaptureSession::tick`] once per display refresh. Inference and export run
//! as detached tokio tasks; their results come back over a channel and are
//! applied at the start of the next tick, so the session is the only writer of
//! its own state.

use crate::alignment::{AlignmentEngine, AlignmentPhase, Evaluation};
use crate::capture::CaptureDispatcher;
use crate::config::Config;
use crate::detector::{prepare_input, Detector};
use crate::export::ExportSink;
use crate::geometry::{Overlay, Rect};
use crate::guide::{GuideLayout, GuideRectCache};
use crate::sampler::{run_inference, SamplingThrottle};
use crate::status::{
    countdown_message, saved_message, StatusBoard, StatusKind, StatusNotifier, MSG_ALIGNING,
    MSG_CAPTURING_AUTO, MSG_CAPTURING_MANUAL, MSG_INFERENCE_FAILED, MSG_LOADING, MSG_SAVE_FAILED,
};
use crate::transform::{fit_overlay, OverlayLayout};
use crate::types::{
    CaptureError, CaptureRequest, CaptureSource, ClassId, Detection, DetectionError,
    ExportArtifact, ExportError, GuideMode, Viewport,
};
use crate::video::VideoSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace};

/// Capacity of the completion channel; at most three tasks are ever in flight
const COMPLETION_CHANNEL_CAPACITY: usize = 8;

/// A detection projected onto the overlay surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayDetection {
    pub bbox: Rect<Overlay>,
    pub score: f32,
    pub class_id: Option<ClassId>,
}

/// Draws the latest detections over the video
pub trait OverlayRenderer: Send {
    fn render(&mut self, detections: &[OverlayDetection], guide: Option<&Rect<Overlay>>);
}

/// External pieces a session is wired to
pub struct Collaborators {
    pub video: Arc<dyn VideoSource>,
    pub detector: Arc<dyn Detector>,
    pub sink: Arc<dyn ExportSink>,
    pub layout: Box<dyn GuideLayout>,
    pub notifier: Box<dyn StatusNotifier>,
    pub renderer: Option<Box<dyn OverlayRenderer>>,
}

/// Result of a background task
#[derive(Debug)]
enum Completion {
    Sample(Result<Vec<Detection>, DetectionError>),
    Capture {
        source: CaptureSource,
        result: Result<ExportArtifact, CaptureError>,
    },
}

/// Session counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Inference calls issued
    pub samples_started: u64,
    /// Inference calls that failed or timed out
    pub samples_failed: u64,
    /// Automatic captures triggered
    pub auto_captures: u64,
    /// Manual captures accepted
    pub manual_captures: u64,
    pub exports_succeeded: u64,
    pub exports_failed: u64,
}

/// Alignment-triggered capture session
pub struct CaptureSession {
    config: Config,
    video: Arc<dyn VideoSource>,
    detector: Arc<dyn Detector>,
    layout: Box<dyn GuideLayout>,
    renderer: Option<Box<dyn OverlayRenderer>>,
    dispatcher: CaptureDispatcher,
    status: StatusBoard<Box<dyn StatusNotifier>>,
    guide: GuideRectCache,
    sampler: SamplingThrottle,
    engine: AlignmentEngine,
    overlay: OverlayLayout,
    viewport: Viewport,
    mode: GuideMode,
    receipt_ratio: f32,
    /// Most recent successful batch, drawn every tick
    latest: Vec<Detection>,
    manual_in_flight: bool,
    model_ready: bool,
    paused: bool,
    completion_tx: mpsc::Sender<Completion>,
    completion_rx: mpsc::Receiver<Completion>,
    stats: SessionStats,
}

impl CaptureSession {
    /// Create a session laid out for `viewport`
    pub fn new(config: Config, collaborators: Collaborators, viewport: Viewport) -> Self {
        let Collaborators {
            video,
            detector,
            sink,
            layout,
            notifier,
            renderer,
        } = collaborators;

        let (completion_tx, completion_rx) = mpsc::channel(COMPLETION_CHANNEL_CAPACITY);
        let dispatcher = CaptureDispatcher::new(Arc::clone(&video), sink, config.inference.size);
        let receipt_ratio = config.receipt.clamp(config.receipt.default_ratio);

        let mut session = Self {
            sampler: SamplingThrottle::new(config.inference.min_interval()),
            engine: AlignmentEngine::new(config.auto_capture.settings()),
            overlay: fit_overlay(viewport, video.aspect()),
            config,
            video,
            detector,
            layout,
            renderer,
            dispatcher,
            status: StatusBoard::new(notifier),
            guide: GuideRectCache::new(),
            viewport,
            mode: GuideMode::default(),
            receipt_ratio,
            latest: Vec::new(),
            manual_in_flight: false,
            model_ready: false,
            paused: false,
            completion_tx,
            completion_rx,
            stats: SessionStats::default(),
        };

        session.relayout();
        info!(
            "Capture session ready: {}x{} viewport, {} guide, auto capture {}",
            viewport.width,
            viewport.height,
            session.mode,
            if session.config.auto_capture.enabled { "on" } else { "off" }
        );
        session
    }

    /// Switch the active guide
    ///
    /// A different mode ends the current alignment episode; an automatic
    /// capture already in flight is left alone.
    pub fn set_mode(&mut self, mode: GuideMode) {
        if mode != self.mode {
            info!("Guide mode: {} -> {}", self.mode, mode);
            self.engine.reset();
            self.status.hide_kind(StatusKind::Alignment);
        }
        self.mode = mode;
        self.relayout();
    }

    /// Change the receipt guide ratio, clamped to the configured range
    pub fn set_receipt_ratio(&mut self, ratio: f32) -> f32 {
        self.receipt_ratio = self.config.receipt.clamp(ratio);
        debug!("Receipt ratio set to {:.2}", self.receipt_ratio);
        self.relayout();
        self.receipt_ratio
    }

    pub fn on_resize(&mut self, viewport: Viewport) {
        debug!("Viewport resized to {}x{}", viewport.width, viewport.height);
        self.viewport = viewport;
        self.relayout();
    }

    /// Stop issuing inference calls; in-flight work still completes
    pub fn pause(&mut self) {
        info!("Session paused");
        self.paused = true;
    }

    pub fn resume(&mut self) {
        info!("Session resumed");
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Run one render tick at `now`
    pub fn tick(&mut self, now: Instant) {
        self.status.poll(now);

        while let Ok(completion) = self.completion_rx.try_recv() {
            self.handle_completion(completion, now);
        }

        if self.layout_is_stale() {
            self.relayout();
        }

        if !self.paused {
            self.maybe_sample(now);
        }

        self.render();
    }

    /// Request a full-frame capture from the shutter button
    ///
    /// Refused while an automatic capture or another manual capture is in
    /// flight. Returns whether an export was started.
    pub fn manual_capture(&mut self, now: Instant) -> bool {
        if self.engine.is_triggering() {
            debug!("Manual capture refused: automatic capture in flight");
            return false;
        }
        if self.manual_in_flight {
            debug!("Manual capture refused: previous manual capture in flight");
            return false;
        }

        let started = self.dispatch(CaptureRequest::manual(), now);
        if started {
            self.stats.manual_captures += 1;
        }
        started
    }

    /// Drive `tick` at the configured frame interval while `running` is set
    pub async fn run(&mut self, running: Arc<AtomicBool>) {
        let frame_interval = self.config.camera.frame_interval();
        let mut ticker = tokio::time::interval(frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Session running at {}ms per frame", frame_interval.as_millis());

        while running.load(Ordering::SeqCst) {
            ticker.tick().await;
            self.tick(tokio::time::Instant::now().into_std());
        }

        info!("Session stopped: {:?}", self.stats);
    }

    /// Wait for the next background result and apply it at `now`
    pub async fn next_completion(&mut self, now: Instant) -> bool {
        let next = self.completion_rx.recv().await;
        match next {
            Some(completion) => {
                self.handle_completion(completion, now);
                true
            }
            None => false,
        }
    }

    /// Apply background results until nothing is in flight
    pub async fn flush(&mut self, now: Instant) {
        while self.in_flight() > 0 {
            if !self.next_completion(now).await {
                break;
            }
        }
    }

    /// Number of background tasks not yet applied
    pub fn in_flight(&self) -> usize {
        usize::from(self.sampler.is_busy())
            + usize::from(self.engine.is_triggering())
            + usize::from(self.manual_in_flight)
    }

    pub fn is_sampling(&self) -> bool {
        self.sampler.is_busy()
    }

    pub fn phase(&self) -> AlignmentPhase {
        self.engine.phase()
    }

    pub fn mode(&self) -> GuideMode {
        self.mode
    }

    pub fn receipt_ratio(&self) -> f32 {
        self.receipt_ratio
    }

    pub fn guide(&self) -> Option<&Rect<Overlay>> {
        self.guide.get()
    }

    pub fn overlay(&self) -> &OverlayLayout {
        &self.overlay
    }

    pub fn latest_detections(&self) -> &[Detection] {
        &self.latest
    }

    /// Status text currently on screen
    pub fn status_text(&self) -> Option<&str> {
        self.status.text()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    fn layout_is_stale(&self) -> bool {
        let aspect = self.video.aspect().unwrap_or(1.0);
        (aspect - self.overlay.video_aspect).abs() > 1e-4
    }

    /// Refit the overlay and re-derive the guide from scratch
    fn relayout(&mut self) {
        self.overlay = fit_overlay(self.viewport, self.video.aspect());
        let elements = self.layout.guide_elements(self.viewport, self.receipt_ratio);
        self.guide
            .recompute(self.mode, &elements, Some(self.overlay.bounds()));
    }

    fn maybe_sample(&mut self, now: Instant) {
        if !self.video.has_current_frame() {
            return;
        }

        if !self.detector.is_ready() {
            self.status.show(StatusKind::Info, MSG_LOADING);
            return;
        }
        if !self.model_ready {
            self.model_ready = true;
            info!("✅ Detector ready");
            self.status.hide_kind(StatusKind::Info);
        }

        if !self.sampler.try_begin(now) {
            return;
        }

        let input = match prepare_input(&*self.video, self.config.inference.size) {
            Some(input) => input,
            None => {
                trace!("Frame vanished before sampling");
                self.sampler.complete();
                return;
            }
        };

        self.stats.samples_started += 1;
        let detector = Arc::clone(&self.detector);
        let timeout = self.config.inference.timeout();
        let tx = self.completion_tx.clone();

        // A panicking detector must still release the throttle
        let inference = tokio::spawn(run_inference(detector, input, timeout));
        tokio::spawn(async move {
            let result = inference.await.unwrap_or_else(|e| {
                error!("Inference task ended abnormally: {}", e);
                Err(DetectionError::InferenceFailed(e.to_string()))
            });
            if tx.send(Completion::Sample(result)).await.is_err() {
                trace!("Session gone; inference result dropped");
            }
        });
    }

    fn handle_completion(&mut self, completion: Completion, now: Instant) {
        match completion {
            Completion::Sample(result) => self.on_sample(result, now),
            Completion::Capture { source, result } => self.on_capture(source, result, now),
        }
    }

    fn on_sample(&mut self, result: Result<Vec<Detection>, DetectionError>, now: Instant) {
        self.sampler.complete();

        match result {
            Ok(batch) => {
                trace!("Batch of {} detections", batch.len());
                self.latest = batch;
                if self.config.auto_capture.enabled {
                    self.evaluate_latest(now);
                }
            }
            Err(e) => {
                self.stats.samples_failed += 1;
                error!("Inference failed: {}", e);
                self.latest.clear();
                self.status.show(StatusKind::Error, MSG_INFERENCE_FAILED);
                self.status
                    .hide_after(now + self.config.status.auto_hide_delay());
            }
        }
    }

    fn evaluate_latest(&mut self, now: Instant) {
        let to_overlay = self.overlay.to_overlay(self.config.inference.size);
        let evaluation = self
            .engine
            .evaluate(&self.latest, self.guide.get(), &to_overlay, now);

        match evaluation {
            Evaluation::NotAligned => self.status.hide_kind(StatusKind::Alignment),
            Evaluation::AlignmentStarted { .. } => {
                if !self.engine.is_triggering() {
                    self.status.show(StatusKind::Alignment, MSG_ALIGNING);
                }
            }
            Evaluation::Holding { remaining, .. } => {
                if !self.engine.is_triggering() {
                    self.status
                        .show(StatusKind::Alignment, &countdown_message(remaining.as_secs_f32()));
                }
            }
            Evaluation::Triggered { request, .. } => {
                self.stats.auto_captures += 1;
                self.dispatch(request, now);
            }
        }
    }

    /// Grab the frame now and export it in the background
    fn dispatch(&mut self, request: CaptureRequest, now: Instant) -> bool {
        let prepared = match self.dispatcher.prepare(&request) {
            Ok(Some(prepared)) => prepared,
            Ok(None) => {
                self.settle(request.source);
                return false;
            }
            Err(e) => {
                self.on_capture(request.source, Err(e), now);
                return false;
            }
        };

        let source = request.source;
        match source {
            CaptureSource::Auto => self.status.show(StatusKind::Capture, MSG_CAPTURING_AUTO),
            CaptureSource::Manual => {
                self.manual_in_flight = true;
                self.status.show(StatusKind::Capture, MSG_CAPTURING_MANUAL);
            }
        }

        let dispatcher = self.dispatcher.clone();
        let tx = self.completion_tx.clone();
        let export = tokio::spawn(async move { dispatcher.export(prepared).await });
        tokio::spawn(async move {
            let result = export.await.unwrap_or_else(|e| {
                error!("{} export task ended abnormally: {}", source, e);
                Err(CaptureError::Export(ExportError::Rejected(e.to_string())))
            });
            if tx.send(Completion::Capture { source, result }).await.is_err() {
                trace!("Session gone; {} capture result dropped", source);
            }
        });

        true
    }

    /// Release the guard held for `source`
    fn settle(&mut self, source: CaptureSource) {
        match source {
            CaptureSource::Auto => self.engine.capture_settled(),
            CaptureSource::Manual => self.manual_in_flight = false,
        }
    }

    fn on_capture(
        &mut self,
        source: CaptureSource,
        result: Result<ExportArtifact, CaptureError>,
        now: Instant,
    ) {
        self.settle(source);

        match result {
            Ok(artifact) => {
                self.stats.exports_succeeded += 1;
                info!(
                    "📸 {} capture exported: {} ({}x{})",
                    source,
                    artifact.path.display(),
                    artifact.width,
                    artifact.height
                );
                self.status.show(
                    StatusKind::Capture,
                    &saved_message(source, artifact.width, artifact.height),
                );
            }
            Err(e) => {
                self.stats.exports_failed += 1;
                error!("{} capture failed: {}", source, e);
                self.status.show(StatusKind::Error, MSG_SAVE_FAILED);
            }
        }

        self.status
            .hide_after(now + self.config.status.auto_hide_delay());
    }

    fn render(&mut self) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        let to_overlay = self.overlay.to_overlay(self.config.inference.size);
        let detections: Vec<OverlayDetection> = self
            .latest
            .iter()
            .map(|d| OverlayDetection {
                bbox: to_overlay.apply(&d.bbox),
                score: d.score,
                class_id: d.class_id,
            })
            .collect();

        renderer.render(&detections, self.guide.get());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guide::CenteredGuideLayout;
    use crate::status::LogNotifier;
    use crate::types::{FrameSize, ScreenBounds};
    use crate::video::StillFrameSource;
    use image::RgbaImage;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    /// Returns the same batch on every call
    struct Fixed {
        batch: Vec<Detection>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Detector for Fixed {
        async fn detect(&self, _frame: &RgbaImage) -> Result<Vec<Detection>, DetectionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.batch.clone())
        }
    }

    #[derive(Default)]
    struct Sink(Mutex<Vec<(u32, u32, CaptureSource)>>);

    #[async_trait::async_trait]
    impl ExportSink for Sink {
        async fn export_image(
            &self,
            image: RgbaImage,
            source: CaptureSource,
        ) -> Result<ExportArtifact, ExportError> {
            let (width, height) = image.dimensions();
            self.0.lock().unwrap().push((width, height, source));
            Ok(ExportArtifact {
                path: "mem".into(),
                width,
                height,
                source,
            })
        }
    }

    #[derive(Clone, Default)]
    struct Frames(Arc<Mutex<Vec<usize>>>);

    impl OverlayRenderer for Frames {
        fn render(&mut self, detections: &[OverlayDetection], _guide: Option<&Rect<Overlay>>) {
            self.0.lock().unwrap().push(detections.len());
        }
    }

    /// 384x384 frame, 384x384 viewport: overlay scale is 2 per inference pixel
    fn session(batch: Vec<Detection>, renderer: Option<Frames>) -> (CaptureSession, Arc<Fixed>, Arc<Sink>) {
        let detector = Arc::new(Fixed {
            batch,
            calls: AtomicUsize::new(0),
        });
        let sink = Arc::new(Sink::default());
        let layout = CenteredGuideLayout::default()
            .with_guide(GuideMode::Card, ScreenBounds::new(100.0, 100.0, 200.0, 100.0));

        let collaborators = Collaborators {
            video: Arc::new(StillFrameSource::new(RgbaImage::new(384, 384))),
            detector: detector.clone(),
            sink: sink.clone(),
            layout: Box::new(layout),
            notifier: Box::new(LogNotifier),
            renderer: renderer.map(|r| Box::new(r) as Box<dyn OverlayRenderer>),
        };

        let session = CaptureSession::new(Config::default(), collaborators, Viewport::new(384.0, 384.0));
        (session, detector, sink)
    }

    fn aligned() -> Detection {
        // Doubles to (105, 102, 190, 95) on the overlay
        Detection::new(Rect::new(52.5, 51.0, 95.0, 47.5), 0.9)
    }

    #[tokio::test]
    async fn test_guide_is_relative_to_overlay() {
        let (session, _, _) = session(vec![], None);
        assert_eq!(session.guide(), Some(&Rect::new(100.0, 100.0, 200.0, 100.0)));
        assert_eq!(session.overlay().width, 384.0);
    }

    #[tokio::test]
    async fn test_aligned_batch_starts_alignment() {
        let (mut session, detector, _) = session(vec![aligned()], None);
        let t0 = Instant::now();

        session.tick(t0);
        assert!(session.is_sampling());
        session.flush(t0).await;

        assert_eq!(detector.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.phase(), AlignmentPhase::Aligning);
        assert_eq!(session.status_text(), Some(MSG_ALIGNING));
    }

    #[tokio::test]
    async fn test_sustained_alignment_exports_once() {
        let (mut session, _, sink) = session(vec![aligned()], None);
        let t0 = Instant::now();

        for i in 0..40u64 {
            let now = t0 + ms(i * 50);
            session.tick(now);
            session.flush(now).await;
        }

        let exports = sink.0.lock().unwrap().clone();
        // Second episode starts at 1600ms and cannot complete by 1950ms
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0], (190, 95, CaptureSource::Auto));
        assert_eq!(session.stats().auto_captures, 1);
        assert_eq!(session.stats().exports_succeeded, 1);
    }

    #[tokio::test]
    async fn test_auto_capture_disabled() {
        let (mut session, _, sink) = session(vec![aligned()], None);
        session.config.auto_capture.enabled = false;
        let t0 = Instant::now();

        for i in 0..40u64 {
            let now = t0 + ms(i * 100);
            session.tick(now);
            session.flush(now).await;
        }

        assert!(sink.0.lock().unwrap().is_empty());
        assert_eq!(session.phase(), AlignmentPhase::Idle);
    }

    #[tokio::test]
    async fn test_manual_capture_exports_full_frame() {
        let (mut session, _, sink) = session(vec![], None);
        let t0 = Instant::now();

        assert!(session.manual_capture(t0));
        assert!(!session.manual_capture(t0));
        session.flush(t0).await;

        assert_eq!(sink.0.lock().unwrap().as_slice(), &[(384, 384, CaptureSource::Manual)]);
        assert_eq!(session.status_text(), Some("Saved (manual): 384x384"));

        session.tick(t0 + ms(2000));
        assert_eq!(session.status_text(), None);
    }

    #[tokio::test]
    async fn test_renderer_sees_latest_batch_every_tick() {
        let frames = Frames::default();
        let (mut session, _, _) = session(vec![aligned(), aligned()], Some(frames.clone()));
        let t0 = Instant::now();

        session.tick(t0);
        session.flush(t0).await;
        // Within the sampling interval: no new inference, still rendered
        session.tick(t0 + ms(16));
        session.tick(t0 + ms(32));

        assert_eq!(frames.0.lock().unwrap().as_slice(), &[0, 2, 2]);
    }

    #[tokio::test]
    async fn test_paused_session_does_not_sample() {
        let (mut session, detector, _) = session(vec![aligned()], None);
        session.pause();
        session.tick(Instant::now());
        assert!(!session.is_sampling());
        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);

        session.resume();
        session.tick(Instant::now());
        assert!(session.is_sampling());
    }

    /// Frame that can be swapped out mid-session
    #[derive(Clone)]
    struct Swappable(Arc<Mutex<RgbaImage>>);

    impl VideoSource for Swappable {
        fn frame_size(&self) -> Option<FrameSize> {
            let (width, height) = self.0.lock().unwrap().dimensions();
            Some(FrameSize::new(width, height))
        }

        fn has_current_frame(&self) -> bool {
            self.frame_size().is_some_and(|size| !size.is_empty())
        }

        fn current_frame(&self) -> Option<RgbaImage> {
            Some(self.0.lock().unwrap().clone())
        }
    }

    struct PanickingSink;

    #[async_trait::async_trait]
    impl ExportSink for PanickingSink {
        async fn export_image(
            &self,
            _image: RgbaImage,
            _source: CaptureSource,
        ) -> Result<ExportArtifact, ExportError> {
            panic!("encoder blew up");
        }
    }

    #[tokio::test]
    async fn test_resize_rederives_guide_for_next_evaluation() {
        // Lines up with the card guide only once the viewport is 800 wide
        let target = Detection::new(Rect::new(24.0, 308.0 * 192.0 / 800.0, 48.0, 24.0), 0.9);
        let (mut session, _, _) = session(vec![target], None);
        let t0 = Instant::now();

        session.tick(t0);
        session.flush(t0).await;
        assert_eq!(session.phase(), AlignmentPhase::Idle);

        // Overlay grows to 800x800 and shifts up by 208
        session.on_resize(Viewport::new(800.0, 384.0));
        assert_eq!(session.overlay().top, -208.0);
        assert_eq!(session.guide(), Some(&Rect::new(100.0, 308.0, 200.0, 100.0)));

        let now = t0 + ms(100);
        session.tick(now);
        session.flush(now).await;
        assert_eq!(session.phase(), AlignmentPhase::Aligning);
    }

    #[tokio::test]
    async fn test_receipt_ratio_reshapes_receipt_guide() {
        let (mut session, _, _) = session(vec![], None);
        session.set_mode(GuideMode::Receipt);
        // 384 viewport: receipt guide is 153.6 wide, height capped at 307.2
        let tall = *session.guide().unwrap();
        assert!((tall.h - 307.2).abs() < 1e-3);

        session.set_receipt_ratio(1.0);
        let square = *session.guide().unwrap();
        assert!((square.h - 153.6).abs() < 1e-3);
        assert_eq!(square.w, tall.w);
        assert!(square.y > tall.y);
    }

    #[tokio::test]
    async fn test_video_aspect_change_triggers_relayout() {
        let frame = Swappable(Arc::new(Mutex::new(RgbaImage::new(384, 384))));
        let layout = CenteredGuideLayout::default()
            .with_guide(GuideMode::Card, ScreenBounds::new(100.0, 100.0, 200.0, 100.0));
        let collaborators = Collaborators {
            video: Arc::new(frame.clone()),
            detector: Arc::new(Fixed {
                batch: vec![],
                calls: AtomicUsize::new(0),
            }),
            sink: Arc::new(Sink::default()),
            layout: Box::new(layout),
            notifier: Box::new(LogNotifier),
            renderer: None,
        };
        let mut session = CaptureSession::new(Config::default(), collaborators, Viewport::new(384.0, 384.0));
        assert_eq!(session.guide(), Some(&Rect::new(100.0, 100.0, 200.0, 100.0)));

        *frame.0.lock().unwrap() = RgbaImage::new(768, 384);
        session.tick(Instant::now());

        // 768x384 overlay centered in a 384 wide viewport starts at x = -192
        assert_eq!(session.overlay().video_aspect, 2.0);
        assert_eq!(session.overlay().left, -192.0);
        assert_eq!(session.guide(), Some(&Rect::new(292.0, 100.0, 200.0, 100.0)));
    }

    #[tokio::test]
    async fn test_panicking_sink_releases_manual_guard() {
        let collaborators = Collaborators {
            video: Arc::new(StillFrameSource::new(RgbaImage::new(64, 64))),
            detector: Arc::new(Fixed {
                batch: vec![],
                calls: AtomicUsize::new(0),
            }),
            sink: Arc::new(PanickingSink),
            layout: Box::new(CenteredGuideLayout::default()),
            notifier: Box::new(LogNotifier),
            renderer: None,
        };
        let mut session = CaptureSession::new(Config::default(), collaborators, Viewport::new(64.0, 64.0));
        let t0 = Instant::now();

        assert!(session.manual_capture(t0));
        session.flush(t0).await;

        assert_eq!(session.in_flight(), 0);
        assert_eq!(session.stats().exports_failed, 1);
        assert_eq!(session.status_text(), Some(MSG_SAVE_FAILED));
        assert!(session.manual_capture(t0));
    }

    #[tokio::test]
    async fn test_manual_capture_without_frame_is_not_counted() {
        let collaborators = Collaborators {
            video: Arc::new(StillFrameSource::new(RgbaImage::new(0, 0))),
            detector: Arc::new(Fixed {
                batch: vec![],
                calls: AtomicUsize::new(0),
            }),
            sink: Arc::new(Sink::default()),
            layout: Box::new(CenteredGuideLayout::default()),
            notifier: Box::new(LogNotifier),
            renderer: None,
        };
        let mut session = CaptureSession::new(Config::default(), collaborators, Viewport::new(64.0, 64.0));

        assert!(!session.manual_capture(Instant::now()));
        assert_eq!(session.stats().manual_captures, 0);
        assert_eq!(session.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_receipt_ratio_is_clamped() {
        let (mut session, _, _) = session(vec![], None);
        assert_eq!(session.receipt_ratio(), 2.0);
        assert_eq!(session.set_receipt_ratio(10.0), 4.0);
        assert_eq!(session.set_receipt_ratio(0.1), 1.0);
    }
}
