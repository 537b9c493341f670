//! Configuration management for the capture engine.
//!
//! Loads configuration from TOML files and provides runtime defaults.

use crate::alignment::AlignmentSettings;
use crate::types::FrameSize;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default)]
    pub inference: InferenceConfig,

    #[serde(default)]
    pub auto_capture: AutoCaptureConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub status: StatusConfig,

    #[serde(default)]
    pub receipt: ReceiptConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Whether the engine runs at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Requested capture width
    #[serde(default = "default_target_width")]
    pub target_width: u32,

    /// Requested capture height
    #[serde(default = "default_target_height")]
    pub target_height: u32,

    /// Render tick period, roughly one display refresh
    #[serde(default = "default_frame_interval")]
    pub frame_interval_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            target_width: default_target_width(),
            target_height: default_target_height(),
            frame_interval_ms: default_frame_interval(),
        }
    }
}

impl CameraConfig {
    /// Requested native frame size
    pub fn target_size(&self) -> FrameSize {
        FrameSize::new(self.target_width, self.target_height)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Side of the square model input, in pixels
    #[serde(default = "default_inference_size")]
    pub size: u32,

    /// Minimum time between inference calls
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: u64,

    /// Give up on a single inference call after this long
    #[serde(default = "default_inference_timeout")]
    pub timeout_ms: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            size: default_inference_size(),
            min_interval_ms: default_min_interval(),
            timeout_ms: default_inference_timeout(),
        }
    }
}

impl InferenceConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoCaptureConfig {
    /// When false, batches are never evaluated and only manual capture works
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Detections scoring below this are ignored
    #[serde(default = "default_min_score")]
    pub min_score: f32,

    /// Minimum overlap with the guide (0-1)
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,

    /// How long alignment must hold before capturing
    #[serde(default = "default_required_ms")]
    pub required_ms: u64,
}

impl Default for AutoCaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_score: default_min_score(),
            iou_threshold: default_iou_threshold(),
            required_ms: default_required_ms(),
        }
    }
}

impl AutoCaptureConfig {
    pub fn settings(&self) -> AlignmentSettings {
        AlignmentSettings {
            min_score: self.min_score,
            iou_threshold: self.iou_threshold,
            required: Duration::from_millis(self.required_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Where captures are written; defaults to the pictures directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    /// JPEG quality (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl CaptureConfig {
    /// Configured output directory, or `<pictures>/align-capture`
    pub fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| {
            dirs::picture_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."))
                .join("align-capture")
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// How long a "saved" message stays up
    #[serde(default = "default_auto_hide_delay")]
    pub auto_hide_delay_ms: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            auto_hide_delay_ms: default_auto_hide_delay(),
        }
    }
}

impl StatusConfig {
    pub fn auto_hide_delay(&self) -> Duration {
        Duration::from_millis(self.auto_hide_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptConfig {
    /// Initial receipt guide ratio (height / width)
    #[serde(default = "default_receipt_ratio")]
    pub default_ratio: f32,

    #[serde(default = "default_receipt_min_ratio")]
    pub min_ratio: f32,

    #[serde(default = "default_receipt_max_ratio")]
    pub max_ratio: f32,
}

impl Default for ReceiptConfig {
    fn default() -> Self {
        Self {
            default_ratio: default_receipt_ratio(),
            min_ratio: default_receipt_min_ratio(),
            max_ratio: default_receipt_max_ratio(),
        }
    }
}

impl ReceiptConfig {
    /// Clamp `ratio` into the configured range
    ///
    /// A reversed range is treated as its swapped form; NaN falls back to the
    /// default ratio.
    pub fn clamp(&self, ratio: f32) -> f32 {
        let lo = self.min_ratio.min(self.max_ratio);
        let hi = self.min_ratio.max(self.max_ratio);
        let ratio = if ratio.is_nan() { self.default_ratio } else { ratio };
        ratio.max(lo).min(hi)
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_target_width() -> u32 {
    3840
}

fn default_target_height() -> u32 {
    2160
}

fn default_frame_interval() -> u64 {
    16
}

fn default_inference_size() -> u32 {
    192
}

fn default_min_interval() -> u64 {
    100
}

fn default_inference_timeout() -> u64 {
    3000
}

fn default_min_score() -> f32 {
    0.7
}

fn default_iou_threshold() -> f32 {
    0.9
}

fn default_required_ms() -> u64 {
    1500
}

fn default_jpeg_quality() -> u8 {
    95
}

fn default_auto_hide_delay() -> u64 {
    2000
}

fn default_receipt_ratio() -> f32 {
    2.0
}

fn default_receipt_min_ratio() -> f32 {
    1.0
}

fn default_receipt_max_ratio() -> f32 {
    4.0
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        Self::load_from_path(Self::default_config_path())
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: PathBuf) -> Self {
        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("No config file found at {:?}, using defaults", path);
                Self::default()
            }
        }
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("align-capture")
            .join("config.toml")
    }

    /// Save configuration to the default path
    pub fn save(&self) -> std::io::Result<()> {
        self.save_to_path(Self::default_config_path())
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: PathBuf) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

        std::fs::write(&path, contents)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }
}
