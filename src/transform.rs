//! Scaling between inference, overlay and frame pixel spaces.
//!
//! The detector reports boxes on its square input grid. The same box is drawn
//! on the overlay surface and, at capture time, cut out of the native frame.
//! Both are the same per-axis scale by `destination / inference_size`; only
//! the destination extent differs.

use crate::geometry::{Frame, Inference, Overlay, Rect, Space};
use crate::types::{FrameSize, ScreenBounds, Viewport};
use std::marker::PhantomData;

/// Width and height of a destination surface in space `S`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent<S: Space> {
    pub width: f32,
    pub height: f32,
    space: PhantomData<S>,
}

impl<S: Space> Extent<S> {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            space: PhantomData,
        }
    }
}

impl From<FrameSize> for Extent<Frame> {
    fn from(size: FrameSize) -> Self {
        Extent::new(size.width as f32, size.height as f32)
    }
}

/// Per-axis scale from space `A` into space `B`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpaceTransform<A: Space, B: Space> {
    scale_x: f32,
    scale_y: f32,
    spaces: PhantomData<(A, B)>,
}

impl<B: Space> SpaceTransform<Inference, B> {
    /// Map the `inference_size` square onto `dest`
    ///
    /// An `inference_size` of zero yields a zero scale, so every mapped box is
    /// degenerate and treated as absent downstream.
    pub fn from_inference(inference_size: u32, dest: Extent<B>) -> Self {
        let (scale_x, scale_y) = if inference_size == 0 {
            (0.0, 0.0)
        } else {
            let size = inference_size as f32;
            (dest.width / size, dest.height / size)
        };

        Self {
            scale_x,
            scale_y,
            spaces: PhantomData,
        }
    }
}

impl<A: Space, B: Space> SpaceTransform<A, B> {
    pub fn scale(&self) -> (f32, f32) {
        (self.scale_x, self.scale_y)
    }

    pub fn apply(&self, rect: &Rect<A>) -> Rect<B> {
        Rect::new(
            rect.x * self.scale_x,
            rect.y * self.scale_y,
            rect.w * self.scale_x,
            rect.h * self.scale_y,
        )
    }
}

/// Inference space to overlay space
pub type ToOverlay = SpaceTransform<Inference, Overlay>;

/// Inference space to frame space
pub type ToFrame = SpaceTransform<Inference, Frame>;

/// Integer pixel window inside a frame, safe to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Clamp a frame-space rectangle to the frame and snap it to whole pixels
///
/// The result always satisfies `x + width <= frame.width` and
/// `y + height <= frame.height`. Returns `None` when nothing of the rectangle
/// is left inside the frame.
pub fn clamp_to_frame(rect: &Rect<Frame>, frame: FrameSize) -> Option<PixelRegion> {
    if !rect.is_valid() || frame.is_empty() {
        return None;
    }

    let max_x = frame.width as f32;
    let max_y = frame.height as f32;

    let x0 = rect.x.max(0.0).min(max_x).floor();
    let y0 = rect.y.max(0.0).min(max_y).floor();
    let x1 = rect.right().max(0.0).min(max_x).ceil();
    let y1 = rect.bottom().max(0.0).min(max_y).ceil();

    let width = (x1 - x0) as u32;
    let height = (y1 - y0) as u32;
    if width == 0 || height == 0 {
        return None;
    }

    Some(PixelRegion {
        x: x0 as u32,
        y: y0 as u32,
        width,
        height,
    })
}

/// Map an inference-space box onto the frame and clamp it for cropping
pub fn crop_region(bbox: &Rect<Inference>, inference_size: u32, frame: FrameSize) -> Option<PixelRegion> {
    let to_frame = ToFrame::from_inference(inference_size, frame.into());
    clamp_to_frame(&to_frame.apply(bbox), frame)
}

/// Size and placement of the overlay surface inside the viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayLayout {
    pub width: f32,
    pub height: f32,
    /// Offset of the surface from the viewport origin; negative when cropped
    pub left: f32,
    pub top: f32,
    /// Aspect ratio the layout was computed for
    pub video_aspect: f32,
}

impl OverlayLayout {
    pub fn extent(&self) -> Extent<Overlay> {
        Extent::new(self.width, self.height)
    }

    /// The surface's client rect in viewport coordinates
    pub fn bounds(&self) -> ScreenBounds {
        ScreenBounds::new(self.left, self.top, self.width, self.height)
    }

    pub fn to_overlay(&self, inference_size: u32) -> ToOverlay {
        ToOverlay::from_inference(inference_size, self.extent())
    }
}

/// Size the overlay to cover the viewport at the video's aspect ratio, centered
///
/// A wider viewport than the video pins the width and overflows vertically;
/// otherwise the height is pinned. An unknown or invalid aspect falls back to 1.
pub fn fit_overlay(viewport: Viewport, video_aspect: Option<f32>) -> OverlayLayout {
    let video_aspect = match video_aspect {
        Some(aspect) if aspect.is_finite() && aspect > 0.0 => aspect,
        _ => 1.0,
    };

    let container_aspect = if viewport.height > 0.0 {
        viewport.width / viewport.height
    } else {
        f32::INFINITY
    };

    let (width, height) = if container_aspect > video_aspect {
        (viewport.width, viewport.width / video_aspect)
    } else {
        (viewport.height * video_aspect, viewport.height)
    };

    OverlayLayout {
        width,
        height,
        left: (viewport.width - width) / 2.0,
        top: (viewport.height - height) / 2.0,
        video_aspect,
    }
}
