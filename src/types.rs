//! Core types used throughout the capture engine.
//!
//! This module defines the fundamental data structures for guide selection,
//! detections, capture requests, and the error types returned by the external
//! collaborators (detector, export sink).

use crate::geometry::{Inference, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Opaque class identifier reported by the detection model
pub type ClassId = u32;

/// Which physical object the on-screen guide is shaped for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuideMode {
    /// ID card (landscape, credit-card proportions)
    #[default]
    Card,
    /// Document page (portrait)
    Document,
    /// Receipt (narrow, adjustable length)
    Receipt,
}

impl GuideMode {
    pub const ALL: [GuideMode; 3] = [GuideMode::Card, GuideMode::Document, GuideMode::Receipt];

    pub fn as_str(&self) -> &'static str {
        match self {
            GuideMode::Card => "card",
            GuideMode::Document => "document",
            GuideMode::Receipt => "receipt",
        }
    }
}

impl fmt::Display for GuideMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GuideMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "card" => Ok(GuideMode::Card),
            "document" | "doc" => Ok(GuideMode::Document),
            "receipt" => Ok(GuideMode::Receipt),
            other => Err(format!("unknown guide mode: {}", other)),
        }
    }
}

/// One object found by the detector in a single inference call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Bounding box in inference-space pixels
    pub bbox: Rect<Inference>,
    /// Confidence in [0, 1]
    pub score: f32,
    /// Model class, never interpreted by the engine
    #[serde(default)]
    pub class_id: Option<ClassId>,
}

impl Detection {
    pub fn new(bbox: Rect<Inference>, score: f32) -> Self {
        Self {
            bbox,
            score,
            class_id: None,
        }
    }

    pub fn with_class(mut self, class_id: ClassId) -> Self {
        self.class_id = Some(class_id);
        self
    }
}

/// Who asked for a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureSource {
    /// Shutter button
    Manual,
    /// Alignment engine
    Auto,
}

impl CaptureSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureSource::Manual => "manual",
            CaptureSource::Auto => "auto",
        }
    }
}

impl fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single request to grab and export the current frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureRequest {
    pub source: CaptureSource,
    /// Region to keep, in inference space; `None` captures the full frame
    pub crop_bbox: Option<Rect<Inference>>,
}

impl CaptureRequest {
    pub fn manual() -> Self {
        Self {
            source: CaptureSource::Manual,
            crop_bbox: None,
        }
    }

    pub fn auto(crop_bbox: Rect<Inference>) -> Self {
        Self {
            source: CaptureSource::Auto,
            crop_bbox: Some(crop_bbox),
        }
    }
}

/// Native pixel size of a video frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width / height, or `None` for an empty frame
    pub fn aspect(&self) -> Option<f32> {
        if self.is_empty() {
            None
        } else {
            Some(self.width as f32 / self.height as f32)
        }
    }
}

/// Size of the host window the overlay is laid out in
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Axis-aligned box in screen coordinates (the layout system's client rect)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenBounds {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl ScreenBounds {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// What an export sink produced for one capture
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub source: CaptureSource,
}

/// Errors returned by a detection adapter
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("Detector is not ready")]
    NotReady,

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Inference timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid detection record on line {line}: {source}")]
    InvalidRecord {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by an export sink
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export rejected: {0}")]
    Rejected(String),
}

/// Errors that can occur while dispatching a capture
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Crop region lies outside the {0}x{1} frame")]
    EmptyRegion(u32, u32),

    #[error("Export failed: {0}")]
    Export(#[from] ExportError),
}
