//! Detection sampling throttle.
//!
//! The render loop ticks at display rate, far faster than the detector should
//! run. [`SamplingThrottle`] lets at most one inference call through per
//! minimum interval and never more than one at a time; [`run_inference`]
//! bounds a single call with a timeout so a hung detector cannot wedge the
//! loop.

use crate::detector::Detector;
use crate::types::{Detection, DetectionError};
use image::RgbaImage;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Single-flight, minimum-interval gate for inference calls
#[derive(Debug, Clone)]
pub struct SamplingThrottle {
    min_interval: Duration,
    last_sample: Option<Instant>,
    busy: bool,
}

impl SamplingThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_sample: None,
            busy: false,
        }
    }

    /// Claim the next sample slot at `now`
    ///
    /// Returns `false` while a call is in flight or the minimum interval has
    /// not elapsed since the last claimed slot. On `true` the throttle is busy
    /// until [`SamplingThrottle::complete`] is called.
    pub fn try_begin(&mut self, now: Instant) -> bool {
        if self.busy {
            trace!("Sample skipped: inference in flight");
            return false;
        }

        if let Some(last) = self.last_sample {
            if now.saturating_duration_since(last) < self.min_interval {
                trace!("Sample skipped: within minimum interval");
                return false;
            }
        }

        self.busy = true;
        self.last_sample = Some(now);
        true
    }

    /// Release the slot; called for every outcome, success or not
    pub fn complete(&mut self) {
        self.busy = false;
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn last_sample(&self) -> Option<Instant> {
        self.last_sample
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

/// Run one detection call, failing with [`DetectionError::Timeout`] after `timeout`
pub async fn run_inference(
    detector: Arc<dyn Detector>,
    frame: RgbaImage,
    timeout: Duration,
) -> Result<Vec<Detection>, DetectionError> {
    match tokio::time::timeout(timeout, detector.detect(&frame)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Inference did not finish within {:?}", timeout);
            Err(DetectionError::Timeout(timeout))
        }
    }
}
