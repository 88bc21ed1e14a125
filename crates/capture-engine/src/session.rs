//! Capture session management.

use std::time::Duration;

use cliploom_common::clock::RenderClock;
use cliploom_common::error::{CliploomError, CliploomResult};
use tokio::sync::mpsc;

use crate::artifact::{Artifact, CaptureSummary, ContainerFormat, SegmentSummary};
use crate::pipeline::{CaptureHandle, CaptureSpec, EncoderBackend, EncoderEvent};

/// State of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session created but not started.
    Idle,
    /// Encoder running and accepting input.
    Capturing,
    /// End-of-stream flushed; chunks collected.
    Stopped,
    /// Artifact handed out.
    Finalized,
    /// Encoder released without an artifact.
    Aborted,
}

/// One encoder session: start, feed, stop, flush, finalize.
pub struct CaptureSession {
    spec: CaptureSpec,
    state: SessionState,
    container: Option<ContainerFormat>,
    clock: Option<RenderClock>,
    handle: Option<CaptureHandle>,
    events: Option<mpsc::UnboundedReceiver<EncoderEvent>>,
    chunks: Vec<Vec<u8>>,
    duration_secs: f64,
}

impl CaptureSession {
    /// Create a new capture session for the given inputs.
    pub fn new(spec: CaptureSpec) -> Self {
        Self {
            spec,
            state: SessionState::Idle,
            container: None,
            clock: None,
            handle: None,
            events: None,
            chunks: Vec::new(),
            duration_secs: 0.0,
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Inputs this session was created for.
    pub fn spec(&self) -> &CaptureSpec {
        &self.spec
    }

    /// Capture duration so far.
    pub fn elapsed_secs(&self) -> f64 {
        match self.state {
            SessionState::Capturing => self.clock.as_ref().map(|c| c.elapsed_secs()).unwrap_or(0.0),
            _ => self.duration_secs,
        }
    }

    /// Open the encoder and begin capturing.
    ///
    /// Any failure to open or start the encoder is reported as
    /// `Unsupported`: the host cannot capture this stream combination.
    pub fn start(&mut self, backend: &dyn EncoderBackend) -> CliploomResult<CaptureHandle> {
        if self.state != SessionState::Idle {
            return Err(CliploomError::capture("Session already started"));
        }

        tracing::info!(
            backend = backend.name(),
            fps = self.spec.fps,
            audio = self.spec.audio.is_some(),
            "Starting capture session"
        );

        if !backend.is_available() {
            return Err(CliploomError::unsupported(format!(
                "capture unsupported: encoder backend '{}' is not available on this host",
                backend.name()
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let encoder = backend.open(&self.spec, tx).map_err(|e| match e {
            CliploomError::Unsupported { .. } => e,
            other => CliploomError::unsupported(format!("capture unsupported: {other}")),
        })?;

        if let Err(e) = encoder.start() {
            let _ = encoder.close();
            return Err(CliploomError::unsupported(format!(
                "capture unsupported: encoder failed to start: {e}"
            )));
        }

        let clock = RenderClock::start();
        tracing::info!(epoch_wall = %clock.epoch_wall(), "Capture clock started");

        let handle = CaptureHandle::new(encoder, self.spec.audio);
        self.container = Some(backend.container());
        self.clock = Some(clock);
        self.events = Some(rx);
        self.handle = Some(handle.clone());
        self.state = SessionState::Capturing;
        Ok(handle)
    }

    /// Signal end-of-stream and wait for the encoder to flush.
    ///
    /// Every chunk emitted before the flush notification is kept. Fails if
    /// the encoder reports an error or does not flush within `timeout`.
    pub async fn stop(&mut self, timeout: Duration) -> CliploomResult<()> {
        if self.state != SessionState::Capturing {
            return Err(CliploomError::capture("Session not capturing"));
        }
        let handle = self
            .handle
            .clone()
            .ok_or_else(|| CliploomError::capture("Session has no encoder"))?;
        let mut events = self
            .events
            .take()
            .ok_or_else(|| CliploomError::capture("Session has no encoder events"))?;

        tracing::info!("Stopping capture session");
        self.duration_secs = self.clock.as_ref().map(|c| c.elapsed_secs()).unwrap_or(0.0);
        handle.encoder().end_of_stream()?;

        let drained = tokio::time::timeout(timeout, async {
            while let Some(event) = events.recv().await {
                match event {
                    EncoderEvent::Chunk(bytes) => self.chunks.push(bytes),
                    EncoderEvent::Flushed => return Ok(()),
                    EncoderEvent::Failed(message) => {
                        return Err(CliploomError::capture(format!("Encoder failed: {message}")))
                    }
                }
            }
            Err(CliploomError::capture(
                "Encoder closed its output before flushing",
            ))
        })
        .await;

        let result = match drained {
            Ok(result) => result,
            Err(_) => {
                let detail = handle
                    .encoder()
                    .last_error()
                    .map(|e| format!(": {e}"))
                    .unwrap_or_default();
                Err(CliploomError::capture(format!(
                    "Encoder did not flush within {}s{detail}",
                    timeout.as_secs_f64()
                )))
            }
        };

        if let Err(e) = handle.encoder().close() {
            tracing::warn!(error = %e, "Encoder close failed");
        }

        match result {
            Ok(()) => {
                let stats = handle.stats();
                tracing::info!(
                    duration_secs = self.duration_secs,
                    chunks = self.chunks.len(),
                    video_frames = stats.video_frames,
                    audio_blocks = stats.audio_blocks,
                    "Capture flushed"
                );
                self.state = SessionState::Stopped;
                Ok(())
            }
            Err(e) => {
                self.release();
                self.state = SessionState::Aborted;
                Err(e)
            }
        }
    }

    /// Concatenate the collected chunks into an artifact.
    ///
    /// Skipped segments are listed in the summary but not counted as rendered.
    pub fn finalize(&mut self, segments: Vec<SegmentSummary>) -> CliploomResult<Artifact> {
        if self.state != SessionState::Stopped {
            return Err(CliploomError::capture("Session not stopped"));
        }
        let container = self
            .container
            .ok_or_else(|| CliploomError::capture("Session has no container"))?;
        let stats = self.handle.as_ref().map(|h| h.stats()).unwrap_or_default();
        let started_at = self
            .clock
            .as_ref()
            .map(|c| c.epoch_wall().to_string())
            .unwrap_or_default();

        let segments_rendered = segments.iter().filter(|s| !s.skipped).count();
        let chunk_count = self.chunks.len();
        let bytes = std::mem::take(&mut self.chunks).concat();
        let artifact = Artifact {
            container,
            has_audio: self.spec.audio.is_some(),
            chunk_count,
            started_at,
            summary: CaptureSummary {
                segments_rendered,
                segments,
                video_frames: stats.video_frames,
                audio_blocks: stats.audio_blocks,
                duration_secs: self.duration_secs,
            },
            bytes,
        };

        self.handle = None;
        self.state = SessionState::Finalized;
        tracing::info!(
            bytes = artifact.len(),
            mime = artifact.mime_type(),
            segments_rendered,
            "Capture finalized"
        );
        Ok(artifact)
    }

    /// Release the encoder without producing an artifact.
    pub fn abort(&mut self) {
        match self.state {
            SessionState::Finalized | SessionState::Aborted => return,
            SessionState::Capturing => {
                self.duration_secs = self.clock.as_ref().map(|c| c.elapsed_secs()).unwrap_or(0.0);
            }
            SessionState::Idle | SessionState::Stopped => {}
        }
        if let Some(handle) = &self.handle {
            if let Err(e) = handle.encoder().close() {
                tracing::warn!(error = %e, "Encoder close failed during abort");
            }
        }
        self.release();
        self.state = SessionState::Aborted;
        tracing::info!(duration_secs = self.duration_secs, "Capture session aborted");
    }

    fn release(&mut self) {
        self.handle = None;
        self.events = None;
        self.chunks.clear();
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if self.state == SessionState::Capturing {
            self.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryEncoderBackend, DUMP_HEADER};
    use crate::frame::{AudioBlock, AudioFormat, VideoFrame};

    fn video_only() -> CaptureSpec {
        CaptureSpec { fps: 30, audio: None }
    }

    #[tokio::test]
    async fn test_full_lifecycle_produces_artifact() {
        let backend = MemoryEncoderBackend::new();
        let mut session = CaptureSession::new(CaptureSpec {
            fps: 30,
            audio: Some(AudioFormat::default()),
        });
        assert_eq!(session.state(), SessionState::Idle);

        let handle = session.start(&backend).unwrap();
        assert_eq!(session.state(), SessionState::Capturing);
        handle.push_video(&VideoFrame::blank(2, 2)).unwrap();
        handle
            .push_audio(&AudioBlock {
                format: AudioFormat::default(),
                samples: vec![0.0; 96],
            })
            .unwrap();

        session.stop(Duration::from_secs(1)).await.unwrap();
        assert_eq!(session.state(), SessionState::Stopped);

        let played = SegmentSummary {
            frames_painted: 1,
            ..SegmentSummary::default()
        };
        let skipped = SegmentSummary {
            slot: 1,
            skipped: true,
            ..SegmentSummary::default()
        };
        let artifact = session
            .finalize(vec![played.clone(), skipped, played])
            .unwrap();
        assert_eq!(session.state(), SessionState::Finalized);
        assert_eq!(artifact.container, ContainerFormat::RawDump);
        assert!(artifact.has_audio);
        assert_eq!(artifact.chunk_count, 3);
        assert!(artifact.bytes.starts_with(DUMP_HEADER));
        assert_eq!(artifact.summary.segments_rendered, 2);
        assert_eq!(artifact.summary.segments.len(), 3);
        assert!(artifact.summary.segments[1].skipped);
        assert_eq!(artifact.summary.video_frames, 1);
        assert_eq!(artifact.summary.audio_blocks, 1);
        assert_eq!(backend.log().closed(), 1);
    }

    #[test]
    fn test_unavailable_backend_is_unsupported() {
        let backend = MemoryEncoderBackend::unsupported();
        let mut session = CaptureSession::new(video_only());
        let err = session.start(&backend).unwrap_err();
        assert!(matches!(err, CliploomError::Unsupported { .. }));
        assert!(err.to_string().contains("capture unsupported"));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_double_start_rejected() {
        let backend = MemoryEncoderBackend::new();
        let mut session = CaptureSession::new(video_only());
        session.start(&backend).unwrap();
        assert!(session.start(&backend).is_err());
        assert_eq!(backend.log().opened(), 1);
    }

    #[tokio::test]
    async fn test_finalize_requires_stop() {
        let backend = MemoryEncoderBackend::new();
        let mut session = CaptureSession::new(video_only());
        assert!(session.finalize(Vec::new()).is_err());
        session.start(&backend).unwrap();
        assert!(session.finalize(Vec::new()).is_err());
        session.stop(Duration::from_secs(1)).await.unwrap();
        assert!(session.finalize(Vec::new()).is_ok());
        assert!(session.finalize(Vec::new()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_delayed_flush() {
        let backend = MemoryEncoderBackend::new().with_flush_delay(Duration::from_millis(400));
        let mut session = CaptureSession::new(video_only());
        session.start(&backend).unwrap();

        let before = tokio::time::Instant::now();
        session.stop(Duration::from_secs(5)).await.unwrap();
        assert!(before.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_times_out_when_flush_never_arrives() {
        let backend = MemoryEncoderBackend::new().with_flush_delay(Duration::from_secs(60));
        let mut session = CaptureSession::new(video_only());
        session.start(&backend).unwrap();

        let err = session.stop(Duration::from_secs(1)).await.unwrap_err();
        assert!(err.to_string().contains("did not flush"));
        assert_eq!(session.state(), SessionState::Aborted);
        assert_eq!(backend.log().closed(), 1);
    }

    #[test]
    fn test_abort_releases_encoder() {
        let backend = MemoryEncoderBackend::new();
        let mut session = CaptureSession::new(video_only());
        let handle = session.start(&backend).unwrap();
        session.abort();
        assert_eq!(session.state(), SessionState::Aborted);
        assert_eq!(backend.log().closed(), 1);
        assert!(handle.push_video(&VideoFrame::blank(1, 1)).is_err());

        session.abort();
        assert_eq!(backend.log().closed(), 1);
    }

    #[test]
    fn test_drop_while_capturing_closes_encoder() {
        let backend = MemoryEncoderBackend::new();
        {
            let mut session = CaptureSession::new(video_only());
            session.start(&backend).unwrap();
        }
        assert_eq!(backend.log().closed(), 1);
    }
}
