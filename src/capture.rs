//! Capture dispatch.
//!
//! Grabs the current video frame, cuts out the requested region and hands it
//! to the export sink. The frame is grabbed synchronously so the pixels match
//! the moment the trigger fired; only the export itself is awaited.

use crate::export::ExportSink;
use crate::transform::crop_region;
use crate::types::{CaptureError, CaptureRequest, CaptureSource, ExportArtifact};
use crate::video::VideoSource;
use image::RgbaImage;
use std::sync::Arc;
use tracing::{debug, trace};

/// Pixels ready to be exported for one request
#[derive(Debug, Clone)]
pub struct PreparedCapture {
    pub source: CaptureSource,
    pub image: RgbaImage,
}

/// Turns capture requests into export calls
#[derive(Clone)]
pub struct CaptureDispatcher {
    video: Arc<dyn VideoSource>,
    sink: Arc<dyn ExportSink>,
    inference_size: u32,
}

impl CaptureDispatcher {
    pub fn new(video: Arc<dyn VideoSource>, sink: Arc<dyn ExportSink>, inference_size: u32) -> Self {
        Self {
            video,
            sink,
            inference_size,
        }
    }

    /// Grab and crop the current frame
    ///
    /// Returns `Ok(None)` when the video source has no frame yet.
    pub fn prepare(&self, request: &CaptureRequest) -> Result<Option<PreparedCapture>, CaptureError> {
        if !self.video.has_current_frame() {
            debug!("No current frame; {} capture skipped", request.source);
            return Ok(None);
        }

        let frame = match self.video.current_frame() {
            Some(frame) => frame,
            None => return Ok(None),
        };

        let image = match &request.crop_bbox {
            None => frame,
            Some(bbox) => {
                let size = crate::types::FrameSize::new(frame.width(), frame.height());
                let region = crop_region(bbox, self.inference_size, size)
                    .ok_or(CaptureError::EmptyRegion(size.width, size.height))?;
                trace!(
                    "Cropping {}x{} at ({}, {}) from {}x{}",
                    region.width,
                    region.height,
                    region.x,
                    region.y,
                    size.width,
                    size.height
                );
                image::imageops::crop_imm(&frame, region.x, region.y, region.width, region.height).to_image()
            }
        };

        Ok(Some(PreparedCapture {
            source: request.source,
            image,
        }))
    }

    /// Export prepared pixels
    pub async fn export(&self, prepared: PreparedCapture) -> Result<ExportArtifact, CaptureError> {
        let artifact = self.sink.export_image(prepared.image, prepared.source).await?;
        Ok(artifact)
    }

    /// Prepare and export in one step; exactly one export per call with a frame
    pub async fn capture(&self, request: CaptureRequest) -> Result<Option<ExportArtifact>, CaptureError> {
        match self.prepare(&request)? {
            Some(prepared) => self.export(prepared).await.map(Some),
            None => Ok(None),
        }
    }

    pub fn inference_size(&self) -> u32 {
        self.inference_size
    }
}
