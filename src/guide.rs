//! Guide rectangle cache.
//!
//! The guide is the on-screen marker the user lines the object up with. Its
//! position is measured in screen coordinates by the layout collaborator and
//! cached here relative to the overlay surface's origin, so the alignment
//! engine can compare it directly with detections projected into overlay space.

use crate::geometry::{Overlay, Rect};
use crate::types::{GuideMode, ScreenBounds, Viewport};
use tracing::debug;

/// Card guide aspect ratio (ISO/IEC 7810 ID-1, 85.60 x 53.98 mm)
const CARD_ASPECT: f32 = 85.60 / 53.98;

/// Document guide aspect ratio (A-series portrait, width / height)
const DOCUMENT_ASPECT: f32 = 1.0 / std::f32::consts::SQRT_2;

/// Receipt guide width as a fraction of the card guide width
const RECEIPT_WIDTH_FRACTION: f32 = 0.5;

/// Measured client rects of every guide element, one per mode
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GuideElements {
    pub card: Option<ScreenBounds>,
    pub document: Option<ScreenBounds>,
    pub receipt: Option<ScreenBounds>,
}

impl GuideElements {
    pub fn for_mode(&self, mode: GuideMode) -> Option<ScreenBounds> {
        match mode {
            GuideMode::Card => self.card,
            GuideMode::Document => self.document,
            GuideMode::Receipt => self.receipt,
        }
    }
}

/// Supplies guide element bounds for the current viewport
///
/// Implemented by whatever owns the UI layout. Bounds are in the same screen
/// coordinate system as the overlay surface.
pub trait GuideLayout: Send {
    fn guide_elements(&self, viewport: Viewport, receipt_ratio: f32) -> GuideElements;
}

/// Cached guide rectangle in overlay space
#[derive(Debug, Clone, Default)]
pub struct GuideRectCache {
    rect: Option<Rect<Overlay>>,
}

impl GuideRectCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-derive the guide rectangle from scratch
    ///
    /// Clears the cache when the active mode has no guide element, or when the
    /// guide or the surface has no area.
    pub fn recompute(
        &mut self,
        mode: GuideMode,
        elements: &GuideElements,
        surface: Option<ScreenBounds>,
    ) -> Option<Rect<Overlay>> {
        let rect = match (elements.for_mode(mode), surface) {
            (Some(guide), Some(surface)) if guide.has_area() && surface.has_area() => Rect::new(
                guide.left - surface.left,
                guide.top - surface.top,
                guide.width,
                guide.height,
            )
            .valid(),
            _ => None,
        };

        match &rect {
            Some(r) => debug!(
                "Guide for {} at ({:.1}, {:.1}) {:.1}x{:.1} on overlay",
                mode, r.x, r.y, r.w, r.h
            ),
            None => debug!("No active guide for {}", mode),
        }

        self.rect = rect;
        rect
    }

    pub fn get(&self) -> Option<&Rect<Overlay>> {
        self.rect.as_ref()
    }
}

/// Layout with guides centered in the viewport
///
/// Card and document guides keep their physical aspect ratio and fill
/// `fill` of the limiting viewport dimension. The receipt guide is narrower
/// and its height follows the receipt ratio (height / width), capped to the
/// viewport. Any guide can be pinned to explicit bounds instead.
#[derive(Debug, Clone)]
pub struct CenteredGuideLayout {
    fill: f32,
    overrides: GuideElements,
}

impl CenteredGuideLayout {
    pub fn new(fill: f32) -> Self {
        Self {
            fill: fill.clamp(0.05, 1.0),
            overrides: GuideElements::default(),
        }
    }

    /// Pin a mode's guide to fixed screen bounds
    pub fn with_guide(mut self, mode: GuideMode, bounds: ScreenBounds) -> Self {
        match mode {
            GuideMode::Card => self.overrides.card = Some(bounds),
            GuideMode::Document => self.overrides.document = Some(bounds),
            GuideMode::Receipt => self.overrides.receipt = Some(bounds),
        }
        self
    }

    fn centered(viewport: Viewport, width: f32, height: f32) -> ScreenBounds {
        ScreenBounds::new(
            (viewport.width - width) / 2.0,
            (viewport.height - height) / 2.0,
            width,
            height,
        )
    }

    /// Largest box of the given aspect that fits in `fill` of the viewport
    fn fit(&self, viewport: Viewport, aspect: f32) -> (f32, f32) {
        let max_w = viewport.width * self.fill;
        let max_h = viewport.height * self.fill;
        if max_w / aspect <= max_h {
            (max_w, max_w / aspect)
        } else {
            (max_h * aspect, max_h)
        }
    }
}

impl Default for CenteredGuideLayout {
    fn default() -> Self {
        Self::new(0.8)
    }
}

impl GuideLayout for CenteredGuideLayout {
    fn guide_elements(&self, viewport: Viewport, receipt_ratio: f32) -> GuideElements {
        let (card_w, card_h) = self.fit(viewport, CARD_ASPECT);
        let (doc_w, doc_h) = self.fit(viewport, DOCUMENT_ASPECT);

        let receipt_w = card_w * RECEIPT_WIDTH_FRACTION;
        let receipt_h = (receipt_w * receipt_ratio).min(viewport.height * self.fill);

        GuideElements {
            card: self
                .overrides
                .card
                .or(Some(Self::centered(viewport, card_w, card_h))),
            document: self
                .overrides
                .document
                .or(Some(Self::centered(viewport, doc_w, doc_h))),
            receipt: self
                .overrides
                .receipt
                .or(Some(Self::centered(viewport, receipt_w, receipt_h))),
        }
    }
}
