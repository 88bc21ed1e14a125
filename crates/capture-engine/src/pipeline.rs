//! Encoder pipeline contracts.
//!
//! A capture encoder takes painted frames and routed audio blocks and emits
//! container chunks on a channel. Backends wrap GStreamer or an in-memory
//! recorder behind the same interface so the session never cares which one
//! it drives.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cliploom_common::error::CliploomResult;
use tokio::sync::mpsc;

use crate::artifact::ContainerFormat;
use crate::frame::{AudioBlock, AudioFormat, VideoFrame};

/// What the encoder must accept for one render.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSpec {
    /// Nominal frame rate of the visual stream.
    pub fps: u32,

    /// Audio input layout; `None` produces a video-only artifact.
    pub audio: Option<AudioFormat>,
}

/// Notifications from a running encoder.
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderEvent {
    /// A piece of the encoded container, in output order.
    Chunk(Vec<u8>),

    /// End-of-stream has propagated through the encoder; no more chunks follow.
    Flushed,

    /// The encoder failed; no more chunks follow.
    Failed(String),
}

/// Sender half handed to an encoder when it is opened.
pub type EncoderEventSender = mpsc::UnboundedSender<EncoderEvent>;

/// A running combined audio/video encoder.
///
/// All methods take `&self`: the compositor and the audio track feed the
/// same encoder from different tasks.
pub trait CaptureEncoder: Send + Sync {
    /// Begin accepting input.
    fn start(&self) -> CliploomResult<()>;

    /// Feed one frame of the visual stream.
    fn push_video(&self, frame: &VideoFrame) -> CliploomResult<()>;

    /// Feed one block of the audio stream.
    fn push_audio(&self, block: &AudioBlock) -> CliploomResult<()>;

    /// Signal end-of-stream on every input. The encoder emits
    /// [`EncoderEvent::Flushed`] once the last chunk is out.
    fn end_of_stream(&self) -> CliploomResult<()>;

    /// Tear the encoder down and release its resources.
    fn close(&self) -> CliploomResult<()>;

    /// Most recent asynchronous error, if the backend can report one.
    fn last_error(&self) -> Option<String> {
        None
    }
}

/// Trait for encoder backends (GStreamer, in-memory, etc.).
pub trait EncoderBackend: Send + Sync {
    /// Open an encoder for the given inputs.
    ///
    /// Fails with `Unsupported` when the host cannot encode this combination.
    fn open(
        &self,
        spec: &CaptureSpec,
        events: EncoderEventSender,
    ) -> CliploomResult<Arc<dyn CaptureEncoder>>;

    /// Check if this backend can encode on the current host.
    fn is_available(&self) -> bool;

    /// Container the produced chunks belong to.
    fn container(&self) -> ContainerFormat;

    /// Backend name.
    fn name(&self) -> &str;
}

/// Runtime statistics from a capture.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStats {
    /// Frames forwarded to the encoder.
    pub video_frames: u64,

    /// Audio blocks forwarded to the encoder.
    pub audio_blocks: u64,

    /// Seconds of audio forwarded to the encoder.
    pub audio_secs: f64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    video_frames: AtomicU64,
    audio_blocks: AtomicU64,
    audio_micros: AtomicU64,
}

/// Cloneable input side of a started capture.
///
/// The output surface holds one to forward painted frames; the audio track
/// holds another to forward decoded samples.
#[derive(Clone)]
pub struct CaptureHandle {
    encoder: Arc<dyn CaptureEncoder>,
    audio: Option<AudioFormat>,
    counters: Arc<StatsCounters>,
}

impl std::fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("audio", &self.audio)
            .field("stats", &self.stats())
            .finish()
    }
}

impl CaptureHandle {
    pub(crate) fn new(encoder: Arc<dyn CaptureEncoder>, audio: Option<AudioFormat>) -> Self {
        Self {
            encoder,
            audio,
            counters: Arc::new(StatsCounters::default()),
        }
    }

    /// Forward a painted frame.
    pub fn push_video(&self, frame: &VideoFrame) -> CliploomResult<()> {
        self.encoder.push_video(frame)?;
        self.counters.video_frames.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Forward decoded audio. Blocks are dropped when the capture was
    /// started without an audio input.
    pub fn push_audio(&self, block: &AudioBlock) -> CliploomResult<()> {
        if self.audio.is_none() {
            return Ok(());
        }
        self.encoder.push_audio(block)?;
        self.counters.audio_blocks.fetch_add(1, Ordering::Relaxed);
        self.counters
            .audio_micros
            .fetch_add((block.duration_secs() * 1_000_000.0) as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Audio layout the encoder expects, if it has an audio input.
    pub fn audio_format(&self) -> Option<AudioFormat> {
        self.audio
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            video_frames: self.counters.video_frames.load(Ordering::Relaxed),
            audio_blocks: self.counters.audio_blocks.load(Ordering::Relaxed),
            audio_secs: self.counters.audio_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0,
        }
    }

    pub(crate) fn encoder(&self) -> &Arc<dyn CaptureEncoder> {
        &self.encoder
    }
}

/// Initialize GStreamer once per process.
#[cfg(feature = "gstreamer")]
pub fn init_gstreamer() -> CliploomResult<()> {
    use std::sync::OnceLock;

    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gstreamer::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(cliploom_common::error::CliploomError::capture(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

/// Report which of the named GStreamer element factories are missing.
#[cfg(feature = "gstreamer")]
pub fn missing_elements(names: &[&str]) -> Vec<String> {
    if init_gstreamer().is_err() {
        return names.iter().map(|n| n.to_string()).collect();
    }
    names
        .iter()
        .filter(|name| gstreamer::ElementFactory::find(name).is_none())
        .map(|name| name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryEncoderBackend;

    #[test]
    fn test_handle_counts_forwarded_media() {
        let backend = MemoryEncoderBackend::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let spec = CaptureSpec {
            fps: 30,
            audio: Some(AudioFormat::default()),
        };
        let encoder = backend.open(&spec, tx).unwrap();
        encoder.start().unwrap();
        let handle = CaptureHandle::new(encoder, spec.audio);

        handle.push_video(&VideoFrame::blank(4, 4)).unwrap();
        handle.push_video(&VideoFrame::blank(4, 4)).unwrap();
        handle
            .push_audio(&AudioBlock {
                format: AudioFormat::default(),
                samples: vec![0.0; 48000],
            })
            .unwrap();

        let stats = handle.stats();
        assert_eq!(stats.video_frames, 2);
        assert_eq!(stats.audio_blocks, 1);
        assert!((stats.audio_secs - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_video_only_handle_drops_audio() {
        let backend = MemoryEncoderBackend::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let spec = CaptureSpec {
            fps: 30,
            audio: None,
        };
        let encoder = backend.open(&spec, tx).unwrap();
        encoder.start().unwrap();
        let handle = CaptureHandle::new(encoder, None);

        handle
            .push_audio(&AudioBlock {
                format: AudioFormat::default(),
                samples: vec![0.0; 64],
            })
            .unwrap();
        assert_eq!(handle.stats().audio_blocks, 0);
        assert!(backend.log().audio_blocks().is_empty());
    }
}
