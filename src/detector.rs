//! Detection adapter integration.
//!
//! This module defines the interface to the object-detection model and the
//! pieces around it that do not depend on a particular inference runtime:
//! drawing the current frame into the model's square input, decoding the
//! standard SSD post-process outputs, and replaying recorded batches.

use crate::geometry::Rect;
use crate::types::{ClassId, Detection, DetectionError};
use crate::video::VideoSource;
use image::RgbaImage;
use std::collections::VecDeque;
use std::io::BufRead;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Trait for object detectors
///
/// Boxes are returned in inference-space pixels. Implementations may drop
/// low-confidence boxes early, but the alignment engine applies its own
/// score threshold regardless.
#[async_trait::async_trait]
pub trait Detector: Send + Sync {
    /// Run the model on a `size x size` RGBA frame
    async fn detect(&self, frame: &RgbaImage) -> Result<Vec<Detection>, DetectionError>;

    /// Whether the model has finished loading
    fn is_ready(&self) -> bool {
        true
    }
}

/// Draw the current video frame into the square model input
pub fn prepare_input(source: &dyn VideoSource, size: u32) -> Option<RgbaImage> {
    if size == 0 || !source.has_current_frame() {
        return None;
    }
    source.draw_scaled(size, size)
}

/// Decode SSD post-process tensors into inference-space detections
///
/// `boxes` holds `[ymin, xmin, ymax, xmax]` per detection, normalized to
/// `[0, 1]`; `scores` and the optional `classes` hold one value each. `count`
/// is the model's reported detection count and is clamped to what the tensors
/// actually contain. Detections below `min_score` and degenerate boxes are
/// dropped.
pub fn decode_ssd_outputs(
    boxes: &[f32],
    scores: &[f32],
    classes: Option<&[f32]>,
    count: usize,
    size: u32,
    min_score: f32,
) -> Vec<Detection> {
    let count = count.min(scores.len()).min(boxes.len() / 4);
    let size = size as f32;

    let mut detections = Vec::with_capacity(count);
    for i in 0..count {
        let score = scores[i];
        if score.is_nan() || score < min_score {
            continue;
        }

        let base = i * 4;
        let ymin = boxes[base];
        let xmin = boxes[base + 1];
        let ymax = boxes[base + 2];
        let xmax = boxes[base + 3];

        let bbox = Rect::new(xmin * size, ymin * size, (xmax - xmin) * size, (ymax - ymin) * size);
        if !bbox.is_valid() {
            continue;
        }

        let class_id = classes
            .and_then(|c| c.get(i))
            .filter(|c| c.is_finite() && **c >= 0.0)
            .map(|c| *c as ClassId);

        detections.push(Detection {
            bbox,
            score,
            class_id,
        });
    }

    detections
}

/// Detector that replays recorded batches
///
/// Each call returns the next batch. When the recording runs out the detector
/// either starts over (`looping`) or returns empty batches.
pub struct ReplayDetector {
    batches: Mutex<VecDeque<Vec<Detection>>>,
    recording: Vec<Vec<Detection>>,
    looping: bool,
}

impl ReplayDetector {
    pub fn from_batches(batches: Vec<Vec<Detection>>, looping: bool) -> Self {
        Self {
            batches: Mutex::new(batches.iter().cloned().collect()),
            recording: batches,
            looping,
        }
    }

    /// Load JSON Lines, one JSON array of detections per line
    ///
    /// Blank lines and lines starting with `#` are skipped.
    pub fn from_reader<R: BufRead>(reader: R, looping: bool) -> Result<Self, DetectionError> {
        let mut batches = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let batch: Vec<Detection> =
                serde_json::from_str(trimmed).map_err(|source| DetectionError::InvalidRecord {
                    line: index + 1,
                    source,
                })?;
            batches.push(batch);
        }

        debug!("Loaded {} recorded detection batches", batches.len());
        Ok(Self::from_batches(batches, looping))
    }

    pub fn from_path(path: &Path, looping: bool) -> Result<Self, DetectionError> {
        let file = std::fs::File::open(path)?;
        let detector = Self::from_reader(std::io::BufReader::new(file), looping)?;
        info!("Replaying {} batches from {}", detector.len(), path.display());
        Ok(detector)
    }

    /// Number of recorded batches
    pub fn len(&self) -> usize {
        self.recording.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recording.is_empty()
    }
}

#[async_trait::async_trait]
impl Detector for ReplayDetector {
    async fn detect(&self, _frame: &RgbaImage) -> Result<Vec<Detection>, DetectionError> {
        let mut batches = self
            .batches
            .lock()
            .map_err(|_| DetectionError::InferenceFailed("replay state poisoned".to_string()))?;

        if batches.is_empty() && self.looping {
            batches.extend(self.recording.iter().cloned());
        }

        Ok(batches.pop_front().unwrap_or_default())
    }
}
