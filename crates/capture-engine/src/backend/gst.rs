//! GStreamer encoder backend: VP8 + Opus in WebM.

use std::sync::{Arc, Mutex, MutexGuard};

use cliploom_common::error::{CliploomError, CliploomResult};
use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;

use crate::artifact::ContainerFormat;
use crate::frame::{AudioBlock, AudioFormat, VideoFrame};
use crate::pipeline::{
    init_gstreamer, missing_elements, CaptureEncoder, CaptureSpec, EncoderBackend, EncoderEvent,
    EncoderEventSender,
};

/// Element factories the WebM capture pipeline needs.
pub const REQUIRED_ELEMENTS: &[&str] = &[
    "appsrc",
    "appsink",
    "videoconvert",
    "vp8enc",
    "audioconvert",
    "audioresample",
    "opusenc",
    "webmmux",
    "queue",
];

/// Encodes the composite stream with `vp8enc`/`opusenc` into `webmmux`.
#[derive(Debug, Clone)]
pub struct GstEncoderBackend {
    video_bitrate_kbps: u32,
}

impl GstEncoderBackend {
    pub fn new(video_bitrate_kbps: u32) -> Self {
        Self { video_bitrate_kbps }
    }

    fn launch_description(&self, spec: &CaptureSpec) -> String {
        let mut launch = format!(
            "appsrc name=video is-live=true do-timestamp=true format=time \
             ! queue ! videoconvert ! vp8enc deadline=1 target-bitrate={bitrate} \
             ! queue ! webmmux name=mux streamable=true \
             ! appsink name=out sync=false",
            bitrate = self.video_bitrate_kbps as u64 * 1000,
        );
        if spec.audio.is_some() {
            launch.push_str(
                " appsrc name=audio is-live=true do-timestamp=true format=time \
                 ! queue ! audioconvert ! audioresample ! opusenc ! queue ! mux.",
            );
        }
        launch
    }
}

impl EncoderBackend for GstEncoderBackend {
    fn open(
        &self,
        spec: &CaptureSpec,
        events: EncoderEventSender,
    ) -> CliploomResult<Arc<dyn CaptureEncoder>> {
        init_gstreamer().map_err(|e| CliploomError::unsupported(format!("capture unsupported: {e}")))?;
        let missing = missing_elements(REQUIRED_ELEMENTS);
        if !missing.is_empty() {
            return Err(CliploomError::unsupported(format!(
                "capture unsupported: missing GStreamer elements {}",
                missing.join(", ")
            )));
        }

        let launch = self.launch_description(spec);
        tracing::debug!(%launch, "Building capture pipeline");

        let element = gst::parse::launch(&launch).map_err(|e| {
            CliploomError::unsupported(format!("capture unsupported: failed to build pipeline: {e}"))
        })?;
        let pipeline = element.dynamic_cast::<gst::Pipeline>().map_err(|_| {
            CliploomError::capture("Launch string did not produce a pipeline")
        })?;

        let video_src = app_src(&pipeline, "video")?;
        let audio_src = match spec.audio {
            Some(format) => {
                let src = app_src(&pipeline, "audio")?;
                src.set_caps(Some(&audio_caps(format)));
                Some(src)
            }
            None => None,
        };

        let sink = pipeline
            .by_name("out")
            .and_then(|e| e.dynamic_cast::<gst_app::AppSink>().ok())
            .ok_or_else(|| CliploomError::capture("Capture pipeline has no output sink"))?;

        let chunk_events = events.clone();
        let eos_events = events.clone();
        sink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                    let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;
                    // The session drops its receiver on abort; keep draining.
                    let _ = chunk_events.send(EncoderEvent::Chunk(map.as_slice().to_vec()));
                    Ok(gst::FlowSuccess::Ok)
                })
                .eos(move |_| {
                    let _ = eos_events.send(EncoderEvent::Flushed);
                })
                .build(),
        );

        Ok(Arc::new(GstEncoder {
            pipeline,
            video_src,
            audio_src,
            fps: spec.fps.max(1),
            video_dims: Mutex::new(None),
            events,
        }))
    }

    fn is_available(&self) -> bool {
        init_gstreamer().is_ok() && missing_elements(REQUIRED_ELEMENTS).is_empty()
    }

    fn container(&self) -> ContainerFormat {
        ContainerFormat::Webm
    }

    fn name(&self) -> &str {
        "gstreamer-webm"
    }
}

struct GstEncoder {
    pipeline: gst::Pipeline,
    video_src: gst_app::AppSrc,
    audio_src: Option<gst_app::AppSrc>,
    fps: u32,
    video_dims: Mutex<Option<(u32, u32)>>,
    events: EncoderEventSender,
}

impl GstEncoder {
    fn video_dims(&self) -> MutexGuard<'_, Option<(u32, u32)>> {
        self.video_dims.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bus_error(&self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        let msg = bus.pop_filtered(&[gst::MessageType::Error])?;
        match msg.view() {
            gst::MessageView::Error(err) => Some(format!(
                "{} ({})",
                err.error(),
                err.debug().map(|d| d.to_string()).unwrap_or_default()
            )),
            _ => None,
        }
    }
}

impl CaptureEncoder for GstEncoder {
    fn start(&self) -> CliploomResult<()> {
        self.pipeline.set_state(gst::State::Playing).map_err(|e| {
            CliploomError::capture(format!("Failed to start capture pipeline: {e:?}"))
        })?;
        tracing::info!(fps = self.fps, audio = self.audio_src.is_some(), "Capture pipeline started");
        Ok(())
    }

    fn push_video(&self, frame: &VideoFrame) -> CliploomResult<()> {
        {
            // Surface resizes renegotiate the input caps mid-stream.
            let mut dims = self.video_dims();
            if *dims != Some((frame.width, frame.height)) {
                self.video_src
                    .set_caps(Some(&video_caps(frame.width, frame.height, self.fps)));
                tracing::debug!(width = frame.width, height = frame.height, "Capture video caps updated");
                *dims = Some((frame.width, frame.height));
            }
        }

        let buffer = gst::Buffer::from_slice(frame.pixels.clone());
        self.video_src.push_buffer(buffer).map_err(|e| {
            let detail = self.bus_error().unwrap_or_default();
            CliploomError::capture(format!("Video push rejected: {e:?} {detail}"))
        })?;
        Ok(())
    }

    fn push_audio(&self, block: &AudioBlock) -> CliploomResult<()> {
        let Some(src) = &self.audio_src else {
            return Ok(());
        };
        let buffer = gst::Buffer::from_mut_slice(block.to_le_bytes());
        src.push_buffer(buffer).map_err(|e| {
            let detail = self.bus_error().unwrap_or_default();
            CliploomError::capture(format!("Audio push rejected: {e:?} {detail}"))
        })?;
        Ok(())
    }

    fn end_of_stream(&self) -> CliploomResult<()> {
        // Both inputs must reach EOS before the muxer finalizes the file.
        self.video_src
            .end_of_stream()
            .map_err(|e| CliploomError::capture(format!("Failed to end video input: {e:?}")))?;
        if let Some(src) = &self.audio_src {
            src.end_of_stream()
                .map_err(|e| CliploomError::capture(format!("Failed to end audio input: {e:?}")))?;
        }
        Ok(())
    }

    fn close(&self) -> CliploomResult<()> {
        if let Some(error) = self.bus_error() {
            let _ = self.events.send(EncoderEvent::Failed(error));
        }
        self.pipeline.set_state(gst::State::Null).map_err(|e| {
            CliploomError::capture(format!("Failed to stop capture pipeline: {e:?}"))
        })?;
        Ok(())
    }

    fn last_error(&self) -> Option<String> {
        self.bus_error()
    }
}

impl Drop for GstEncoder {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

fn app_src(pipeline: &gst::Pipeline, name: &str) -> CliploomResult<gst_app::AppSrc> {
    pipeline
        .by_name(name)
        .and_then(|e| e.dynamic_cast::<gst_app::AppSrc>().ok())
        .ok_or_else(|| CliploomError::capture(format!("Capture pipeline has no '{name}' input")))
}

fn video_caps(width: u32, height: u32, fps: u32) -> gst::Caps {
    gst::Caps::builder("video/x-raw")
        .field("format", "RGBA")
        .field("width", width as i32)
        .field("height", height as i32)
        .field("framerate", gst::Fraction::new(fps as i32, 1))
        .build()
}

fn audio_caps(format: AudioFormat) -> gst::Caps {
    gst::Caps::builder("audio/x-raw")
        .field("format", "F32LE")
        .field("layout", "interleaved")
        .field("rate", format.sample_rate as i32)
        .field("channels", format.channels as i32)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_description_adds_audio_branch_only_when_needed() {
        let backend = GstEncoderBackend::new(2500);
        let video_only = backend.launch_description(&CaptureSpec { fps: 30, audio: None });
        assert!(video_only.contains("vp8enc deadline=1 target-bitrate=2500000"));
        assert!(video_only.contains("webmmux name=mux"));
        assert!(!video_only.contains("opusenc"));

        let with_audio = backend.launch_description(&CaptureSpec {
            fps: 30,
            audio: Some(AudioFormat::default()),
        });
        assert!(with_audio.contains("appsrc name=audio"));
        assert!(with_audio.ends_with("mux."));
    }
}
