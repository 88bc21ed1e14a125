//! Render job management.
//!
//! A [`RenderSession`] lives for exactly one render: it starts the capture,
//! runs the compositor while the audio track plays, waits out the audio
//! tail, flushes the encoder and hands back the artifact. Every failure
//! path tears down the same resources: surface capture, audio source and
//! encoder.

use std::sync::Arc;

use cliploom_capture_engine::artifact::Artifact;
use cliploom_capture_engine::frame::AudioFormat;
use cliploom_capture_engine::pipeline::{CaptureSpec, EncoderBackend};
use cliploom_capture_engine::session::CaptureSession;
use cliploom_common::clock::{time_box, RenderClock};
use cliploom_common::config::RenderDefaults;
use cliploom_common::error::{CliploomError, CliploomResult};
use cliploom_timeline_model::{AudioWindow, MediaAsset, Timeline};
use tokio_util::sync::CancellationToken;

use crate::audio::AudioTrack;
use crate::compositor::{Compositor, SegmentReport};
use crate::source::{AudioOutput, MediaLoader};
use crate::surface::OutputSurface;

/// Progress callback for rendering.
pub type ProgressCallback = Arc<dyn Fn(RenderProgress) + Send + Sync>;

/// Render progress report.
#[derive(Debug, Clone)]
pub struct RenderProgress {
    /// Current progress [0.0, 1.0].
    pub progress: f64,

    /// Timeline entries finished so far.
    pub segments_done: usize,

    /// Timeline entries in this render.
    pub total_segments: usize,

    /// Time since the capture started.
    pub elapsed_secs: f64,

    /// Current stage.
    pub stage: RenderStage,
}

/// Stages of a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    Preparing,
    Compositing,
    /// Waiting for the audio track to reach its end marker.
    AudioTail,
    /// Waiting for the encoder to flush.
    Encoding,
    Complete,
    Failed,
}

/// Everything one render needs, snapshotted from the studio.
#[derive(Debug, Clone)]
pub struct RenderPlan {
    pub timeline: Timeline,
    pub videos: Vec<MediaAsset>,
    pub audio: Option<MediaAsset>,
    pub window: AudioWindow,
}

/// Transient state of one render invocation.
pub struct RenderSession<'a> {
    plan: RenderPlan,
    config: &'a RenderDefaults,
    progress: Option<&'a ProgressCallback>,
    capture: CaptureSession,
    audio: Option<AudioTrack>,
    clock: Option<RenderClock>,
    reports: Vec<SegmentReport>,
}

impl<'a> RenderSession<'a> {
    pub fn new(
        plan: RenderPlan,
        config: &'a RenderDefaults,
        progress: Option<&'a ProgressCallback>,
    ) -> Self {
        let audio = plan.audio.as_ref().map(|_| AudioFormat {
            sample_rate: config.audio_sample_rate,
            channels: config.audio_channels,
        });
        Self {
            capture: CaptureSession::new(CaptureSpec {
                fps: config.capture_fps,
                audio,
            }),
            plan,
            config,
            progress,
            audio: None,
            clock: None,
            reports: Vec::new(),
        }
    }

    /// Segments played so far.
    pub fn reports(&self) -> &[SegmentReport] {
        &self.reports
    }

    /// Run the render to completion, tearing everything down on failure.
    pub async fn run(
        &mut self,
        loader: &dyn MediaLoader,
        encoder: &dyn EncoderBackend,
        surface: &mut OutputSurface,
        cancel: &CancellationToken,
    ) -> CliploomResult<Artifact> {
        tracing::info!(
            segments = self.plan.timeline.len(),
            total_secs = self.plan.timeline.total_secs(),
            audio = self.plan.audio.is_some(),
            "Starting render"
        );
        self.report(0, RenderStage::Preparing);

        let result = self.run_inner(loader, encoder, surface, cancel).await;
        if let Err(e) = &result {
            self.teardown(surface);
            self.report(self.reports.len(), RenderStage::Failed);
            if e.is_cancelled() {
                tracing::info!(segments = self.reports.len(), "Render cancelled");
            } else {
                tracing::error!(error = %e, "Render failed");
            }
        }
        result
    }

    async fn run_inner(
        &mut self,
        loader: &dyn MediaLoader,
        encoder: &dyn EncoderBackend,
        surface: &mut OutputSurface,
        cancel: &CancellationToken,
    ) -> CliploomResult<Artifact> {
        for entry in self.plan.timeline.degenerate_entries() {
            tracing::warn!(
                slot = entry.slot,
                duration = entry.duration.secs(),
                "Segment duration is not positive and will be skipped"
            );
        }

        if let Some(entry) = self
            .plan
            .timeline
            .entries
            .iter()
            .find(|e| e.duration.is_playable() && time_box(e.duration.secs()).is_none())
        {
            return Err(CliploomError::render(format!(
                "Segment {} duration {}s is too long to schedule",
                entry.slot,
                entry.duration.secs()
            )));
        }

        let capture = self.capture.start(encoder)?;
        self.clock = Some(RenderClock::start());

        if let Some(asset) = &self.plan.audio {
            let track = AudioTrack::open(
                loader,
                asset,
                self.plan.window,
                AudioOutput::from_config(self.config),
                self.config.audio_poll_interval(),
                cancel,
            )
            .await?;
            self.audio = Some(track);
        }

        surface.attach_capture(capture.clone());
        if let Some(track) = self.audio.as_mut() {
            track.start(Some(capture))?;
        }

        self.report(0, RenderStage::Compositing);
        let total = self.plan.timeline.len();
        let progress = self.progress;
        let clock = self.clock.clone();
        let mut compositor = Compositor::new(loader, self.config.paint_interval());
        self.reports = compositor
            .run(
                &self.plan.timeline,
                &self.plan.videos,
                surface,
                cancel,
                |_, done| {
                    if let Some(cb) = progress {
                        cb(RenderProgress {
                            progress: fraction(done, total) * 0.9,
                            segments_done: done,
                            total_segments: total,
                            elapsed_secs: clock.as_ref().map(|c| c.elapsed_secs()).unwrap_or(0.0),
                            stage: RenderStage::Compositing,
                        });
                    }
                },
            )
            .await?;
        let video_secs = self.elapsed_secs();

        if self.audio.is_some() {
            self.report_stage(RenderStage::AudioTail, 0.9);
        }
        if let Some(track) = self.audio.as_mut() {
            track.finish(cancel).await?;
            track.log_drift(video_secs);
        }

        surface.detach_capture();
        self.report_stage(RenderStage::Encoding, 0.95);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CliploomError::Cancelled),
            stopped = self.capture.stop(self.config.flush_timeout()) => stopped?,
        }

        let segments = self.reports.iter().map(SegmentReport::summary).collect();
        let artifact = self.capture.finalize(segments)?;
        let segments_rendered = artifact.summary.segments_rendered;
        if let Some(mut track) = self.audio.take() {
            track.abort();
        }

        self.report_stage(RenderStage::Complete, 1.0);
        tracing::info!(
            segments = segments_rendered,
            bytes = artifact.len(),
            duration_secs = artifact.summary.duration_secs,
            "Render complete"
        );
        Ok(artifact)
    }

    fn teardown(&mut self, surface: &mut OutputSurface) {
        surface.detach_capture();
        if let Some(mut track) = self.audio.take() {
            track.abort();
        }
        self.capture.abort();
    }

    fn elapsed_secs(&self) -> f64 {
        self.clock.as_ref().map(|c| c.elapsed_secs()).unwrap_or(0.0)
    }

    fn report(&self, done: usize, stage: RenderStage) {
        let total = self.plan.timeline.len();
        self.emit(RenderProgress {
            progress: fraction(done, total) * 0.9,
            segments_done: done,
            total_segments: total,
            elapsed_secs: self.elapsed_secs(),
            stage,
        });
    }

    fn report_stage(&self, stage: RenderStage, progress: f64) {
        let total = self.plan.timeline.len();
        self.emit(RenderProgress {
            progress,
            segments_done: self.reports.len(),
            total_segments: total,
            elapsed_secs: self.elapsed_secs(),
            stage,
        });
    }

    fn emit(&self, progress: RenderProgress) {
        if let Some(cb) = self.progress {
            cb(progress);
        }
    }
}

fn fraction(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    done as f64 / total as f64
}
