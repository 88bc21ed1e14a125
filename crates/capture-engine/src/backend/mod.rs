//! Encoder backends.

use std::sync::Arc;

use cliploom_common::config::RenderDefaults;

use crate::pipeline::EncoderBackend;

#[cfg(feature = "gstreamer")]
pub mod gst;
pub mod memory;

#[cfg(feature = "gstreamer")]
pub use gst::GstEncoderBackend;
pub use memory::{MemoryEncoderBackend, MemoryEncoderLog};

/// Get the host encoder backend.
///
/// Builds without GStreamer fall back to the in-memory recorder, which
/// produces a raw dump rather than a playable clip.
pub fn get_backend(config: &RenderDefaults) -> Arc<dyn EncoderBackend> {
    #[cfg(feature = "gstreamer")]
    {
        Arc::new(GstEncoderBackend::new(config.video_bitrate_kbps))
    }
    #[cfg(not(feature = "gstreamer"))]
    {
        let _ = config;
        tracing::warn!("Built without GStreamer; captures are written as raw dumps");
        Arc::new(MemoryEncoderBackend::new())
    }
}
