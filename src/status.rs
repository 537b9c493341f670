//! User-facing status line.
//!
//! The engine reports progress ("hold still", countdown, save results,
//! errors) through a [`StatusNotifier`]. [`StatusBoard`] sits in front of the
//! real notifier and makes `show`/`hide` idempotent, remembers which kind of
//! message is on screen, and hides transient messages after a deadline.

use std::time::Instant;
use tracing::info;

pub const MSG_LOADING: &str = "Loading model...";
pub const MSG_ALIGNING: &str = "Aligning with the guide...";
pub const MSG_CAPTURING_AUTO: &str = "Capturing automatically...";
pub const MSG_CAPTURING_MANUAL: &str = "Capturing...";
pub const MSG_INFERENCE_FAILED: &str = "Inference failed; retrying shortly.";
pub const MSG_SAVE_FAILED: &str = "Failed to save the capture.";

/// Display surface for status text
pub trait StatusNotifier: Send {
    fn show(&mut self, text: &str);
    fn hide(&mut self);
}

impl<N: StatusNotifier + ?Sized> StatusNotifier for Box<N> {
    fn show(&mut self, text: &str) {
        (**self).show(text)
    }

    fn hide(&mut self) {
        (**self).hide()
    }
}

/// What a status message is about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// Hold-still and countdown messages
    Alignment,
    /// Capture in progress or finished
    Capture,
    /// Something failed
    Error,
    /// Anything else
    Info,
}

/// Idempotent front for a [`StatusNotifier`]
pub struct StatusBoard<N: StatusNotifier> {
    notifier: N,
    visible: bool,
    text: String,
    kind: StatusKind,
    hide_at: Option<Instant>,
}

impl<N: StatusNotifier> StatusBoard<N> {
    pub fn new(notifier: N) -> Self {
        Self {
            notifier,
            visible: false,
            text: String::new(),
            kind: StatusKind::Info,
            hide_at: None,
        }
    }

    /// Show `text`; a no-op if the same text is already visible
    pub fn show(&mut self, kind: StatusKind, text: &str) {
        self.hide_at = None;
        self.kind = kind;

        if self.visible && self.text == text {
            return;
        }

        self.visible = true;
        self.text.clear();
        self.text.push_str(text);
        self.notifier.show(text);
    }

    pub fn hide(&mut self) {
        self.hide_at = None;
        if !self.visible {
            return;
        }

        self.visible = false;
        self.text.clear();
        self.notifier.hide();
    }

    /// Hide only if the visible message is of `kind`
    pub fn hide_kind(&mut self, kind: StatusKind) {
        if self.visible && self.kind == kind {
            self.hide();
        }
    }

    /// Hide the current message once `deadline` has passed
    pub fn hide_after(&mut self, deadline: Instant) {
        if self.visible {
            self.hide_at = Some(deadline);
        }
    }

    /// Apply a pending auto-hide
    pub fn poll(&mut self, now: Instant) {
        if matches!(self.hide_at, Some(deadline) if now >= deadline) {
            self.hide();
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn text(&self) -> Option<&str> {
        self.visible.then_some(self.text.as_str())
    }

    pub fn kind(&self) -> Option<StatusKind> {
        self.visible.then_some(self.kind)
    }
}

/// Notifier that writes status changes to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

impl StatusNotifier for LogNotifier {
    fn show(&mut self, text: &str) {
        info!("📣 {}", text);
    }

    fn hide(&mut self) {
        info!("📣 (cleared)");
    }
}

/// Countdown text for the remaining hold time
pub fn countdown_message(remaining_secs: f32) -> String {
    format!("Auto capture in {:.1}s", remaining_secs.max(0.0))
}

/// Completion text for a saved capture
pub fn saved_message(source: crate::types::CaptureSource, width: u32, height: u32) -> String {
    format!("Saved ({}): {}x{}", source, width, height)
}
