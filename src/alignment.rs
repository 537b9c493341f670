//! Alignment engine.
//!
//! Turns a stream of detection batches plus the cached guide rectangle into at
//! most one automatic capture per alignment episode. An episode starts with the
//! first batch whose best detection overlaps the guide by at least the IoU
//! threshold, and ends on the first batch that does not (or when the capture it
//! triggered settles).
//!
//! ```text
//! Idle --aligned--> Aligning --held >= required--> Triggering
//!  ^                   |                              |
//!  +---not aligned-----+            capture settled---+
//! ```

use crate::geometry::{intersection_over_union, Overlay, Rect};
use crate::transform::ToOverlay;
use crate::types::{CaptureRequest, Detection};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Thresholds that decide when a batch counts as aligned
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentSettings {
    /// Detections scoring below this are ignored
    pub min_score: f32,
    /// Minimum IoU between the best detection and the guide
    pub iou_threshold: f32,
    /// How long alignment must hold before an automatic capture
    pub required: Duration,
}

impl Default for AlignmentSettings {
    fn default() -> Self {
        Self {
            min_score: 0.7,
            iou_threshold: 0.9,
            required: Duration::from_millis(1500),
        }
    }
}

/// Raw engine state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlignmentState {
    /// When continuous alignment began; `None` when not aligned
    pub started_at: Option<Instant>,
    /// An automatic capture is in flight
    pub triggering: bool,
}

/// Coarse phase derived from [`AlignmentState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentPhase {
    Idle,
    Aligning,
    Triggering,
}

impl AlignmentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlignmentPhase::Idle => "idle",
            AlignmentPhase::Aligning => "aligning",
            AlignmentPhase::Triggering => "triggering",
        }
    }
}

/// Detection that overlaps the guide the most in one batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestMatch {
    pub detection: Detection,
    /// The detection's box projected onto the overlay
    pub overlay_bbox: Rect<Overlay>,
    pub iou: f32,
}

/// Result of evaluating one batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluation {
    /// Nothing qualifying overlaps the guide; any running timer was cleared
    NotAligned,
    /// First aligned batch of an episode; the timer starts now
    AlignmentStarted { best: BestMatch },
    /// Alignment continues; `remaining` is zero once the hold time is met
    Holding {
        elapsed: Duration,
        remaining: Duration,
        best: BestMatch,
    },
    /// Hold time reached: dispatch `request` and call
    /// [`AlignmentEngine::capture_settled`] once it finishes
    Triggered {
        request: CaptureRequest,
        best: BestMatch,
    },
}

/// Pick the qualifying detection with the highest IoU against `guide`
///
/// Detections below `min_score` are skipped. Ties keep the first detection in
/// batch order, and a detection with zero overlap is never selected.
pub fn select_best(
    batch: &[Detection],
    guide: &Rect<Overlay>,
    to_overlay: &ToOverlay,
    min_score: f32,
) -> Option<BestMatch> {
    let mut best: Option<BestMatch> = None;
    let mut best_iou = 0.0;

    for detection in batch {
        if detection.score.is_nan() || detection.score < min_score {
            continue;
        }

        let overlay_bbox = to_overlay.apply(&detection.bbox);
        let iou = intersection_over_union(&overlay_bbox, guide);
        if iou > best_iou {
            best_iou = iou;
            best = Some(BestMatch {
                detection: *detection,
                overlay_bbox,
                iou,
            });
        }
    }

    best
}

/// Hysteresis state machine for automatic capture
#[derive(Debug, Clone)]
pub struct AlignmentEngine {
    settings: AlignmentSettings,
    state: AlignmentState,
}

impl AlignmentEngine {
    pub fn new(settings: AlignmentSettings) -> Self {
        Self {
            settings,
            state: AlignmentState::default(),
        }
    }

    /// Evaluate one detection batch at `now`
    pub fn evaluate(
        &mut self,
        batch: &[Detection],
        guide: Option<&Rect<Overlay>>,
        to_overlay: &ToOverlay,
        now: Instant,
    ) -> Evaluation {
        let guide = match guide {
            Some(guide) if !batch.is_empty() => guide,
            _ => return self.not_aligned("empty batch or no guide"),
        };

        let best = match select_best(batch, guide, to_overlay, self.settings.min_score) {
            Some(best) => best,
            None => return self.not_aligned("no qualifying detection"),
        };

        if best.iou < self.settings.iou_threshold {
            trace!("Best IoU {:.3} below threshold", best.iou);
            return self.not_aligned("below IoU threshold");
        }

        let started_at = match self.state.started_at {
            Some(started_at) => started_at,
            None => {
                debug!("Alignment started (IoU {:.3})", best.iou);
                self.state.started_at = Some(now);
                return Evaluation::AlignmentStarted { best };
            }
        };

        let elapsed = now.saturating_duration_since(started_at);
        let remaining = self.settings.required.saturating_sub(elapsed);

        if elapsed >= self.settings.required && !self.state.triggering {
            self.state.triggering = true;
            info!(
                "🎯 Auto capture triggered after {}ms (IoU {:.3}, score {:.2})",
                elapsed.as_millis(),
                best.iou,
                best.detection.score
            );
            return Evaluation::Triggered {
                request: CaptureRequest::auto(best.detection.bbox),
                best,
            };
        }

        Evaluation::Holding {
            elapsed,
            remaining,
            best,
        }
    }

    /// The automatic capture finished, successfully or not; start over
    pub fn capture_settled(&mut self) {
        debug!("Auto capture settled; alignment reset");
        self.state = AlignmentState::default();
    }

    /// Clear the timer, leaving any in-flight trigger guard alone
    pub fn reset(&mut self) {
        self.state.started_at = None;
    }

    pub fn phase(&self) -> AlignmentPhase {
        if self.state.triggering {
            AlignmentPhase::Triggering
        } else if self.state.started_at.is_some() {
            AlignmentPhase::Aligning
        } else {
            AlignmentPhase::Idle
        }
    }

    pub fn state(&self) -> AlignmentState {
        self.state
    }

    pub fn is_triggering(&self) -> bool {
        self.state.triggering
    }

    pub fn settings(&self) -> &AlignmentSettings {
        &self.settings
    }

    fn not_aligned(&mut self, reason: &str) -> Evaluation {
        if self.state.started_at.is_some() {
            debug!("Alignment lost: {}", reason);
        }
        self.reset();
        Evaluation::NotAligned
    }
}

impl Default for AlignmentEngine {
    fn default() -> Self {
        Self::new(AlignmentSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Extent;
    use crate::types::CaptureSource;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    /// Identity projection: inference and overlay share a 192 grid
    fn identity() -> ToOverlay {
        ToOverlay::from_inference(192, Extent::new(192.0, 192.0))
    }

    fn guide() -> Rect<Overlay> {
        Rect::new(100.0, 100.0, 200.0, 100.0)
    }

    fn aligned() -> Detection {
        Detection::new(Rect::new(105.0, 102.0, 190.0, 95.0), 0.95)
    }

    #[test]
    fn test_guide_example_starts_alignment() {
        let mut engine = AlignmentEngine::default();
        let guide = guide();
        let eval = engine.evaluate(&[aligned()], Some(&guide), &identity(), Instant::now());

        match eval {
            Evaluation::AlignmentStarted { best } => assert!(best.iou >= 0.9),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(engine.phase(), AlignmentPhase::Aligning);
    }

    #[test]
    fn test_projection_applies_before_iou() {
        // Inference box at half scale lines up once doubled
        let to_overlay = ToOverlay::from_inference(192, Extent::new(384.0, 384.0));
        let det = Detection::new(Rect::new(52.5, 51.0, 95.0, 47.5), 0.9);

        let best = select_best(&[det], &guide(), &to_overlay, 0.7).unwrap();
        assert_eq!(best.overlay_bbox, Rect::new(105.0, 102.0, 190.0, 95.0));
    }

    #[test]
    fn test_low_score_never_selected() {
        let strong_overlap_low_score = Detection::new(Rect::new(100.0, 100.0, 200.0, 100.0), 0.5);
        let weak_overlap = Detection::new(Rect::new(100.0, 100.0, 100.0, 100.0), 0.8);

        let best = select_best(
            &[strong_overlap_low_score, weak_overlap],
            &guide(),
            &identity(),
            0.7,
        )
        .unwrap();
        assert_eq!(best.detection, weak_overlap);

        let mut engine = AlignmentEngine::default();
        let guide = guide();
        let eval = engine.evaluate(&[strong_overlap_low_score], Some(&guide), &identity(), Instant::now());
        assert_eq!(eval, Evaluation::NotAligned);
        assert_eq!(engine.phase(), AlignmentPhase::Idle);
    }

    #[test]
    fn test_ties_keep_first() {
        let a = aligned().with_class(1);
        let b = aligned().with_class(2);
        let best = select_best(&[a, b], &guide(), &identity(), 0.0).unwrap();
        assert_eq!(best.detection.class_id, Some(1));
    }

    #[test]
    fn test_zero_overlap_not_selected() {
        let far = Detection::new(Rect::new(0.0, 0.0, 10.0, 10.0), 0.99);
        assert!(select_best(&[far], &guide(), &identity(), 0.0).is_none());
    }

    #[test]
    fn test_sustained_alignment_triggers_once() {
        let mut engine = AlignmentEngine::default();
        let guide = guide();
        let t0 = Instant::now();

        let mut triggers = 0;
        // 16ms ticks for 1500ms + a bit, then keep going well past it
        for i in 0..200u64 {
            let eval = engine.evaluate(&[aligned()], Some(&guide), &identity(), t0 + ms(i * 16));
            if let Evaluation::Triggered { request, .. } = eval {
                triggers += 1;
                assert_eq!(request.source, CaptureSource::Auto);
                assert_eq!(request.crop_bbox, Some(aligned().bbox));
                assert!(i * 16 >= 1500);
            }
        }

        assert_eq!(triggers, 1);
        assert_eq!(engine.phase(), AlignmentPhase::Triggering);
    }

    #[test]
    fn test_settled_capture_allows_new_episode() {
        let mut engine = AlignmentEngine::default();
        let guide = guide();
        let t0 = Instant::now();

        engine.evaluate(&[aligned()], Some(&guide), &identity(), t0);
        let eval = engine.evaluate(&[aligned()], Some(&guide), &identity(), t0 + ms(1500));
        assert!(matches!(eval, Evaluation::Triggered { .. }));

        engine.capture_settled();
        assert_eq!(engine.state(), AlignmentState::default());

        // Object never moved: a fresh episode starts and triggers again
        let eval = engine.evaluate(&[aligned()], Some(&guide), &identity(), t0 + ms(1600));
        assert!(matches!(eval, Evaluation::AlignmentStarted { .. }));
        let eval = engine.evaluate(&[aligned()], Some(&guide), &identity(), t0 + ms(3100));
        assert!(matches!(eval, Evaluation::Triggered { .. }));
    }

    #[test]
    fn test_interrupted_alignment_restarts_timer() {
        let mut engine = AlignmentEngine::default();
        let guide = guide();
        let t0 = Instant::now();

        engine.evaluate(&[aligned()], Some(&guide), &identity(), t0);
        let eval = engine.evaluate(&[aligned()], Some(&guide), &identity(), t0 + ms(800));
        assert!(matches!(eval, Evaluation::Holding { elapsed, .. } if elapsed == ms(800)));

        assert_eq!(
            engine.evaluate(&[], Some(&guide), &identity(), t0 + ms(900)),
            Evaluation::NotAligned
        );

        let eval = engine.evaluate(&[aligned()], Some(&guide), &identity(), t0 + ms(1000));
        assert!(matches!(eval, Evaluation::AlignmentStarted { .. }));

        // 1500ms after the interruption-free restart, not after t0
        let eval = engine.evaluate(&[aligned()], Some(&guide), &identity(), t0 + ms(2000));
        match eval {
            Evaluation::Holding { elapsed, remaining, .. } => {
                assert_eq!(elapsed, ms(1000));
                assert_eq!(remaining, ms(500));
            }
            other => panic!("unexpected {:?}", other),
        }
        let eval = engine.evaluate(&[aligned()], Some(&guide), &identity(), t0 + ms(2500));
        assert!(matches!(eval, Evaluation::Triggered { .. }));
    }

    #[test]
    fn test_missing_guide_resets() {
        let mut engine = AlignmentEngine::default();
        let guide = guide();
        let t0 = Instant::now();

        engine.evaluate(&[aligned()], Some(&guide), &identity(), t0);
        assert_eq!(
            engine.evaluate(&[aligned()], None, &identity(), t0 + ms(100)),
            Evaluation::NotAligned
        );
        assert_eq!(engine.state().started_at, None);
    }

    #[test]
    fn test_below_threshold_resets() {
        let mut engine = AlignmentEngine::default();
        let guide = guide();
        let t0 = Instant::now();
        let half = Detection::new(Rect::new(100.0, 100.0, 100.0, 100.0), 0.9);

        engine.evaluate(&[aligned()], Some(&guide), &identity(), t0);
        assert_eq!(
            engine.evaluate(&[half], Some(&guide), &identity(), t0 + ms(100)),
            Evaluation::NotAligned
        );
        assert_eq!(engine.phase(), AlignmentPhase::Idle);
    }

    #[test]
    fn test_reset_keeps_trigger_guard() {
        let mut engine = AlignmentEngine::default();
        let guide = guide();
        let t0 = Instant::now();

        engine.evaluate(&[aligned()], Some(&guide), &identity(), t0);
        engine.evaluate(&[aligned()], Some(&guide), &identity(), t0 + ms(1500));
        assert!(engine.is_triggering());

        // Losing alignment mid-export does not release the guard
        engine.evaluate(&[], Some(&guide), &identity(), t0 + ms(1600));
        assert!(engine.is_triggering());

        // A new episode that reaches the hold time still cannot fire
        engine.evaluate(&[aligned()], Some(&guide), &identity(), t0 + ms(1700));
        let eval = engine.evaluate(&[aligned()], Some(&guide), &identity(), t0 + ms(3300));
        assert!(matches!(eval, Evaluation::Holding { remaining, .. } if remaining.is_zero()));
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(AlignmentPhase::Idle.as_str(), "idle");
        assert_eq!(AlignmentPhase::Triggering.as_str(), "triggering");
    }
}
