//! Rectangles tagged with the pixel space they live in, and IoU.
//!
//! Three coordinate spaces meet in this crate: the square model input
//! ([`Inference`]), the on-screen overlay surface ([`Overlay`]) and the native
//! video frame ([`Frame`]). A [`Rect`] carries its space as a type parameter so
//! a box can only be compared with boxes from the same space, and can only
//! move between spaces through a [`crate::transform::SpaceTransform`].

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::marker::PhantomData;

/// Marker trait for a pixel coordinate space
pub trait Space: Copy + Debug + Default + PartialEq + Send + Sync + 'static {
    const NAME: &'static str;
}

/// The model's square input grid
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Inference;

/// The on-screen overlay surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Overlay;

/// The native resolution of the incoming video frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Frame;

impl Space for Inference {
    const NAME: &'static str = "inference";
}

impl Space for Overlay {
    const NAME: &'static str = "overlay";
}

impl Space for Frame {
    const NAME: &'static str = "frame";
}

/// Axis-aligned rectangle `{x, y, w, h}` in space `S`
///
/// A rectangle is only meaningful when both `w` and `h` are positive; see
/// [`Rect::is_valid`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Rect<S: Space> {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    #[serde(skip)]
    space: PhantomData<S>,
}

impl<S: Space> Rect<S> {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            x,
            y,
            w,
            h,
            space: PhantomData,
        }
    }

    /// Finite coordinates with positive width and height
    pub fn is_valid(&self) -> bool {
        self.w > 0.0
            && self.h > 0.0
            && self.x.is_finite()
            && self.y.is_finite()
            && self.w.is_finite()
            && self.h.is_finite()
    }

    /// `Some(self)` if valid; degenerate rectangles are treated as absent
    pub fn valid(self) -> Option<Self> {
        self.is_valid().then_some(self)
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    pub fn area(&self) -> f32 {
        self.w * self.h
    }

    /// Overlapping region, or `None` when the rectangles only touch or miss
    pub fn intersection(&self, other: &Rect<S>) -> Option<Rect<S>> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());

        Rect::new(x1, y1, x2 - x1, y2 - y1).valid()
    }
}

/// Intersection-over-union of two rectangles in the same space, in `[0, 1]`
///
/// Returns 0 when the boxes do not overlap, when either box is degenerate,
/// and when the union is not positive.
pub fn intersection_over_union<S: Space>(a: &Rect<S>, b: &Rect<S>) -> f32 {
    if !a.is_valid() || !b.is_valid() {
        return 0.0;
    }

    let ix1 = a.x.max(b.x);
    let iy1 = a.y.max(b.y);
    let ix2 = a.right().min(b.right());
    let iy2 = a.bottom().min(b.bottom());

    let iw = (ix2 - ix1).max(0.0);
    let ih = (iy2 - iy1).max(0.0);
    let inter = iw * ih;

    if inter <= 0.0 {
        return 0.0;
    }

    let union = a.area() + b.area() - inter;
    if union > 0.0 {
        (inter / union).min(1.0)
    } else {
        0.0
    }
}
