//! Video source interface.
//!
//! The live camera is an external collaborator. The engine only needs its
//! frame size, whether a decodable frame is available right now, and a way
//! to pull the current frame at native or scaled resolution.

use crate::types::FrameSize;
use image::imageops::FilterType;
use image::RgbaImage;
use std::path::Path;
use tracing::debug;

/// A live (or simulated) video feed
pub trait VideoSource: Send + Sync {
    /// Native frame size, once known
    fn frame_size(&self) -> Option<FrameSize>;

    /// Whether a decodable frame is available now
    fn has_current_frame(&self) -> bool;

    /// The current frame at native resolution
    fn current_frame(&self) -> Option<RgbaImage>;

    /// The current frame resized to `width x height`
    fn draw_scaled(&self, width: u32, height: u32) -> Option<RgbaImage> {
        let frame = self.current_frame()?;
        if frame.dimensions() == (width, height) {
            return Some(frame);
        }
        Some(image::imageops::resize(&frame, width, height, FilterType::Triangle))
    }

    /// Width / height of the native frame
    fn aspect(&self) -> Option<f32> {
        self.frame_size().and_then(|size| size.aspect())
    }
}

/// Source that always serves the same frame
#[derive(Debug, Clone)]
pub struct StillFrameSource {
    frame: RgbaImage,
}

impl StillFrameSource {
    pub fn new(frame: RgbaImage) -> Self {
        Self { frame }
    }

    /// Decode an image file as the frame
    pub fn from_path(path: &Path) -> Result<Self, image::ImageError> {
        let frame = image::open(path)?.to_rgba8();
        debug!(
            "Loaded still frame {} ({}x{})",
            path.display(),
            frame.width(),
            frame.height()
        );
        Ok(Self::new(frame))
    }
}

impl VideoSource for StillFrameSource {
    fn frame_size(&self) -> Option<FrameSize> {
        let (width, height) = self.frame.dimensions();
        let size = FrameSize::new(width, height);
        (!size.is_empty()).then_some(size)
    }

    fn has_current_frame(&self) -> bool {
        self.frame_size().is_some()
    }

    fn current_frame(&self) -> Option<RgbaImage> {
        self.has_current_frame().then(|| self.frame.clone())
    }
}
