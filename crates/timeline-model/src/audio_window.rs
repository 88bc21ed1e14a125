//! Audio trim window.

use serde::{Deserialize, Serialize};

/// The `[start, end)` region of the audio asset included in the output.
///
/// Both edges are set from the current playback position of the audio
/// preview, so no ordering between them is enforced here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioWindow {
    /// Seek position when the render starts.
    pub start: f64,

    /// Position the captured audio must reach before the render finalizes.
    pub end: Option<f64>,
}

impl AudioWindow {
    /// Window with explicit edges.
    pub fn new(start: f64, end: Option<f64>) -> Self {
        Self { start, end }
    }

    /// Mark the current playback position as the start.
    pub fn set_start(&mut self, position_secs: f64) {
        self.start = position_secs.max(0.0);
    }

    /// Mark the current playback position as the end.
    pub fn set_end(&mut self, position_secs: f64) {
        self.end = Some(position_secs.max(0.0));
    }

    /// Forget the end marker.
    pub fn clear_end(&mut self) {
        self.end = None;
    }

    /// Whether a playback position still falls short of the end marker.
    pub fn needs_tail(&self, position_secs: f64) -> bool {
        matches!(self.end, Some(end) if position_secs < end)
    }
}
