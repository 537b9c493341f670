//! Align Capture - alignment-triggered still capture
//!
//! This crate guides a user to line a physical object up with an on-screen
//! guide and captures a still automatically once it has stayed aligned:
//!
//! - **Card**: ID-1 cards in landscape
//! - **Document**: portrait pages
//! - **Receipt**: narrow slips with an adjustable length
//!
//! # Architecture
//!
//! A [`CaptureSession`] is ticked once per display refresh. It samples the
//! live frame through a throttled [`Detector`], projects detections from the
//! model's input grid onto the overlay, and feeds them to the
//! [`AlignmentEngine`], which fires at most one automatic capture per
//! alignment episode. Captures are cropped from the native frame and handed
//! to an [`ExportSink`]. Video, detection, layout, status display and export
//! are all collaborator traits.

pub mod alignment;
pub mod capture;
pub mod config;
pub mod detector;
pub mod export;
pub mod geometry;
pub mod guide;
pub mod sampler;
pub mod session;
pub mod status;
pub mod transform;
pub mod types;
pub mod video;

// Re-export commonly used types
pub use alignment::{
    select_best, AlignmentEngine, AlignmentPhase, AlignmentSettings, AlignmentState, BestMatch,
    Evaluation,
};
pub use capture::{CaptureDispatcher, PreparedCapture};
pub use config::Config;
pub use detector::{decode_ssd_outputs, prepare_input, Detector, ReplayDetector};
pub use export::{ExportSink, JpegDirectorySink};
pub use geometry::{intersection_over_union, Frame, Inference, Overlay, Rect, Space};
pub use guide::{CenteredGuideLayout, GuideElements, GuideLayout, GuideRectCache};
pub use sampler::{run_inference, SamplingThrottle};
pub use session::{CaptureSession, Collaborators, OverlayDetection, OverlayRenderer, SessionStats};
pub use status::{LogNotifier, StatusBoard, StatusKind, StatusNotifier};
pub use transform::{clamp_to_frame, crop_region, fit_overlay, OverlayLayout, PixelRegion, SpaceTransform};
pub use types::{
    CaptureError, CaptureRequest, CaptureSource, ClassId, Detection, DetectionError,
    ExportArtifact, ExportError, FrameSize, GuideMode, ScreenBounds, Viewport,
};
pub use video::{StillFrameSource, VideoSource};
