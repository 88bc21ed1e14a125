//! The audio track played underneath the compositor.
//!
//! The track runs on its own clock: it is started together with the
//! compositor and never synchronized with it afterwards. When the
//! compositor finishes, the track keeps feeding the encoder until the end
//! marker of its window is reached.

use std::time::Duration;

use cliploom_capture_engine::pipeline::CaptureHandle;
use cliploom_common::clock::{DriftMeasurement, RenderClock};
use cliploom_common::error::{CliploomError, CliploomResult};
use cliploom_timeline_model::{AudioWindow, MediaAsset};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::source::{AudioOutput, AudioPlayback, MediaLoader};

/// Drift beyond which the audio/video end mismatch is logged as a warning.
const DRIFT_WARN_MS: f64 = 100.0;

/// How the trailing wait ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioFinish {
    /// Position the track was paused at.
    pub position_secs: f64,

    /// Time spent waiting for the end marker after the compositor finished.
    pub tail_secs: f64,

    /// The source ran out before reaching the end marker.
    pub ended_early: bool,
}

/// A trimmed audio asset playing into the capture.
pub struct AudioTrack {
    playback: Box<dyn AudioPlayback>,
    window: AudioWindow,
    poll_interval: Duration,
    clock: Option<RenderClock>,
    released: bool,
}

impl AudioTrack {
    /// Open the asset and seek to the start of the window.
    pub async fn open(
        loader: &dyn MediaLoader,
        asset: &MediaAsset,
        window: AudioWindow,
        output: AudioOutput,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> CliploomResult<Self> {
        let playback = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CliploomError::Cancelled),
            opened = loader.open_audio(asset, output) => opened?,
        };
        let mut track = Self {
            playback,
            window,
            poll_interval,
            clock: None,
            released: false,
        };

        let start = seek_target(window.start, asset.natural_duration_secs);
        if start != window.start {
            tracing::warn!(
                requested = window.start,
                start,
                "Audio start is outside the track; clamped"
            );
        }
        let seek = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CliploomError::Cancelled),
            seeked = track.playback.seek(start) => seeked,
        };
        if let Err(e) = seek {
            track.abort();
            return Err(e);
        }

        tracing::info!(
            asset = asset.id,
            start,
            end = ?window.end,
            monitor = output.monitor,
            "Audio track ready"
        );
        Ok(track)
    }

    /// Route the signal to the capture and begin playback.
    pub fn start(&mut self, capture: Option<CaptureHandle>) -> CliploomResult<()> {
        self.playback.route_to(capture);
        self.playback.play()?;
        self.clock = Some(RenderClock::start());
        tracing::debug!(position = self.playback.position_secs(), "Audio track started");
        Ok(())
    }

    /// Current read position.
    pub fn position_secs(&self) -> f64 {
        self.playback.position_secs()
    }

    /// Wait until the end marker is reached, then pause.
    ///
    /// Returns immediately when no end marker is set. The wait also ends
    /// when the source runs out of audio.
    pub async fn finish(&mut self, cancel: &CancellationToken) -> CliploomResult<AudioFinish> {
        let tail_started = tokio::time::Instant::now();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ended_early = false;

        loop {
            let position = self.playback.position_secs();
            if !self.window.needs_tail(position) {
                break;
            }
            if self.playback.is_ended() {
                tracing::warn!(
                    position,
                    end = ?self.window.end,
                    "Audio ended before reaching the end marker"
                );
                ended_early = true;
                break;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CliploomError::Cancelled),
                _ = ticker.tick() => {}
            }
        }

        self.playback.pause()?;
        self.playback.route_to(None);

        let finish = AudioFinish {
            position_secs: self.playback.position_secs(),
            tail_secs: tail_started.elapsed().as_secs_f64(),
            ended_early,
        };
        tracing::info!(
            position = finish.position_secs,
            tail_secs = finish.tail_secs,
            "Audio track paused"
        );
        Ok(finish)
    }

    /// Compare how much audio and video went into the capture.
    pub fn log_drift(&self, video_secs: f64) {
        let Some(clock) = &self.clock else {
            return;
        };
        let measurement = DriftMeasurement {
            reference_ns: RenderClock::secs_to_ns(video_secs),
            measured_ns: clock.elapsed_ns(),
        };
        if measurement.exceeds_threshold_ms(DRIFT_WARN_MS) {
            tracing::warn!(drift_ms = measurement.drift_ms(), "Audio/video end drift exceeds threshold");
        } else {
            tracing::info!(drift_ms = measurement.drift_ms(), "Audio/video end drift within threshold");
        }
    }

    /// Stop playback and release the source.
    pub fn abort(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.playback.pause() {
            tracing::debug!(error = %e, "Audio pause failed during abort");
        }
        self.playback.route_to(None);
        self.playback.release();
        self.released = true;
    }
}

/// Clamp a requested start position into the playable range of the track.
fn seek_target(requested: f64, natural_secs: f64) -> f64 {
    let requested = if requested.is_finite() { requested.max(0.0) } else { 0.0 };
    if natural_secs.is_finite() && natural_secs > 0.0 {
        requested.min(natural_secs)
    } else {
        requested
    }
}

impl Drop for AudioTrack {
    fn drop(&mut self) {
        self.abort();
    }
}
