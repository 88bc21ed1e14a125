//! Media sources: probing and playing video and audio assets.
//!
//! A [`MediaLoader`] turns a [`MediaHandle`] into an inspected [`MediaAsset`]
//! and opens playback handles for it. The compositor only ever asks a video
//! playback for "the most recently decoded frame"; the audio playback pushes
//! its decoded blocks straight into the capture encoder once routed.

use std::sync::Arc;

use async_trait::async_trait;
use cliploom_capture_engine::frame::{AudioFormat, VideoFrame};
use cliploom_capture_engine::pipeline::CaptureHandle;
use cliploom_common::config::RenderDefaults;
use cliploom_common::error::CliploomResult;
use cliploom_timeline_model::{AssetId, MediaAsset, MediaHandle};

#[cfg(feature = "gstreamer")]
pub mod gst;
pub mod synthetic;

#[cfg(feature = "gstreamer")]
pub use gst::GstMediaLoader;
pub use synthetic::{SyntheticLoader, SyntheticLog};

/// Where an opened audio asset sends its decoded signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioOutput {
    /// Also play the track on the local output device.
    pub monitor: bool,

    /// PCM layout delivered to the capture route.
    pub format: AudioFormat,
}

impl AudioOutput {
    /// Output layout taken from the render settings.
    pub fn from_config(config: &RenderDefaults) -> Self {
        Self {
            monitor: config.monitor_audio,
            format: AudioFormat {
                sample_rate: config.audio_sample_rate,
                channels: config.audio_channels,
            },
        }
    }
}

/// Opens media assets for probing and playback.
#[async_trait]
pub trait MediaLoader: Send + Sync {
    /// Decode enough of a video to learn its natural duration and size.
    async fn inspect_video(&self, id: AssetId, handle: MediaHandle) -> CliploomResult<MediaAsset>;

    /// Decode enough of an audio file to learn its natural duration.
    async fn inspect_audio(&self, id: AssetId, handle: MediaHandle) -> CliploomResult<MediaAsset>;

    /// Open a video for playback. Resolves once the first frame is decodable.
    async fn open_video(&self, asset: &MediaAsset) -> CliploomResult<Box<dyn VideoPlayback>>;

    /// Open an audio asset for playback, paused at position zero.
    async fn open_audio(
        &self,
        asset: &MediaAsset,
        output: AudioOutput,
    ) -> CliploomResult<Box<dyn AudioPlayback>>;

    /// Check if this loader can decode on the current host.
    fn is_available(&self) -> bool;

    /// Loader name.
    fn name(&self) -> &str;
}

/// A muted, rate-adjustable video playback.
pub trait VideoPlayback: Send {
    /// Natural picture size.
    fn dimensions(&self) -> (u32, u32);

    /// Natural (unwarped) duration.
    fn natural_duration_secs(&self) -> f64;

    /// Start or resume playback at the given rate.
    fn play(&mut self, rate: f64) -> CliploomResult<()>;

    /// Most recently decoded frame; the last one is held once the source
    /// reaches its end.
    fn current_frame(&self) -> Option<VideoFrame>;

    /// Stop advancing.
    fn pause(&mut self) -> CliploomResult<()>;

    /// Release decode resources. Safe to call more than once.
    fn release(&mut self);
}

/// An audio playback with a movable read position.
#[async_trait]
pub trait AudioPlayback: Send {
    /// Move the read position. Resolves once the seek has settled.
    async fn seek(&mut self, position_secs: f64) -> CliploomResult<()>;

    /// Route decoded blocks to a capture input, or stop routing.
    fn route_to(&mut self, capture: Option<CaptureHandle>);

    /// Start or resume playback.
    fn play(&mut self) -> CliploomResult<()>;

    /// Stop advancing.
    fn pause(&mut self) -> CliploomResult<()>;

    /// Current read position.
    fn position_secs(&self) -> f64;

    /// Whether the source has no more audio to produce.
    fn is_ended(&self) -> bool;

    /// Release decode resources. Safe to call more than once.
    fn release(&mut self);
}

/// Get the host media loader.
///
/// Builds without GStreamer fall back to the synthetic loader, which
/// generates test patterns and tones instead of decoding files.
pub fn get_loader() -> Arc<dyn MediaLoader> {
    #[cfg(feature = "gstreamer")]
    {
        Arc::new(GstMediaLoader::new())
    }
    #[cfg(not(feature = "gstreamer"))]
    {
        tracing::warn!("Built without GStreamer; media files are replaced by synthetic sources");
        Arc::new(SyntheticLoader::new())
    }
}
