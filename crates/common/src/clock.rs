//! Clock and timing utilities for the render loop.
//!
//! Every render is anchored to a monotonic epoch recorded when capture
//! starts. This module provides utilities for:
//! - Capturing the epoch
//! - Measuring time-boxed segments against it
//! - Comparing where the audio and video streams ended up
//!
//! The clock reads `tokio::time::Instant`, so tests running on a paused
//! runtime observe virtual time.

use std::time::Duration;

use tokio::time::Instant;

/// A render clock that provides monotonic timestamps relative to
/// a fixed epoch (the moment capture started).
#[derive(Debug, Clone)]
pub struct RenderClock {
    /// The instant capture started.
    epoch: Instant,

    /// Wall-clock time at epoch (ISO 8601 string).
    epoch_wall: String,
}

impl RenderClock {
    /// Create a new render clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Get nanoseconds elapsed since capture start.
    pub fn elapsed_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Get seconds elapsed since capture start.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Elapsed time as a duration.
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// Wall-clock time at capture start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }

    /// Convert seconds to nanoseconds.
    pub fn secs_to_ns(secs: f64) -> u64 {
        (secs * 1_000_000_000.0) as u64
    }
}

/// Convert a target segment length in seconds to a time box.
///
/// Non-finite and non-positive values collapse to zero. Returns `None` for
/// lengths too large to represent as a `Duration`.
pub fn time_box(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        Some(Duration::ZERO)
    }
}

/// Drift measurement between two streams.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeasurement {
    /// Timestamp in the reference stream (ns).
    pub reference_ns: u64,
    /// Timestamp in the measured stream (ns).
    pub measured_ns: u64,
}

impl DriftMeasurement {
    /// Drift in nanoseconds (positive = measured is ahead).
    pub fn drift_ns(&self) -> i64 {
        self.measured_ns as i64 - self.reference_ns as i64
    }

    /// Drift in milliseconds.
    pub fn drift_ms(&self) -> f64 {
        self.drift_ns() as f64 / 1_000_000.0
    }

    /// Whether drift exceeds an acceptable threshold.
    pub fn exceeds_threshold_ms(&self, threshold_ms: f64) -> bool {
        self.drift_ms().abs() > threshold_ms
    }
}

/// Rate gate for paint ticks.
///
/// The compositor asks on every tick whether a frame should be pushed
/// downstream; ticks arriving faster than the target rate are absorbed.
#[derive(Debug)]
pub struct RateController {
    target_interval_ns: u64,
    last_tick_ns: Option<u64>,
}

impl RateController {
    /// Create a controller targeting the given Hz rate.
    pub fn new(target_hz: u32) -> Self {
        Self {
            target_interval_ns: 1_000_000_000 / target_hz.max(1) as u64,
            last_tick_ns: None,
        }
    }

    /// Check if enough time has passed for the next tick.
    /// Returns true and updates internal state if ready.
    /// The first call always returns true.
    pub fn should_tick(&mut self, current_ns: u64) -> bool {
        match self.last_tick_ns {
            None => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            Some(last) if current_ns >= last + self.target_interval_ns => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            _ => false,
        }
    }

    /// Forget the last tick so the next call fires immediately.
    pub fn reset(&mut self) {
        self.last_tick_ns = None;
    }
}
