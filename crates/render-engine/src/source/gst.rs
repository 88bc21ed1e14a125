//! GStreamer media loader.
//!
//! Video is decoded to RGBA into an appsink whose latest sample is kept in
//! a shared slot; playback rate is applied with a flushing rate seek. Audio
//! is decoded to interleaved `F32LE`, tee'd to the capture route and
//! optionally to the local output device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use cliploom_capture_engine::frame::{AudioBlock, AudioFormat, VideoFrame};
use cliploom_capture_engine::pipeline::{init_gstreamer, missing_elements, CaptureHandle};
use cliploom_common::error::{CliploomError, CliploomResult};
use cliploom_timeline_model::{AssetId, MediaAsset, MediaHandle};
use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;

use super::{AudioOutput, AudioPlayback, MediaLoader, VideoPlayback};

/// Element factories the decode pipelines need.
pub const REQUIRED_ELEMENTS: &[&str] = &[
    "filesrc",
    "decodebin",
    "videoconvert",
    "videoscale",
    "audioconvert",
    "audioresample",
    "tee",
    "queue",
    "appsink",
];

const PREROLL_TIMEOUT_SECS: u64 = 10;

/// Decodes media files with `decodebin`.
#[derive(Debug, Clone, Default)]
pub struct GstMediaLoader;

impl GstMediaLoader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaLoader for GstMediaLoader {
    async fn inspect_video(&self, id: AssetId, handle: MediaHandle) -> CliploomResult<MediaAsset> {
        let path = file_path(&handle)?;
        let inspected = blocking(move || {
            let video = build_video_pipeline(&path)?;
            preroll(&video.pipeline)?;
            let duration = query_duration(&video.pipeline)?;
            let frame = lock_frame(&video.latest)
                .clone()
                .ok_or_else(|| CliploomError::decode("Video produced no frame while prerolling"))?;
            let _ = video.pipeline.set_state(gst::State::Null);
            Ok((duration, frame.width, frame.height))
        })
        .await?;

        let (duration, width, height) = inspected;
        tracing::info!(asset = id, duration, width, height, "Inspected video");
        Ok(MediaAsset::video(id, handle, duration, width, height))
    }

    async fn inspect_audio(&self, id: AssetId, handle: MediaHandle) -> CliploomResult<MediaAsset> {
        let path = file_path(&handle)?;
        let duration = blocking(move || {
            let audio = build_audio_pipeline(&path, AudioFormat::default(), false)?;
            preroll(&audio.pipeline)?;
            let duration = query_duration(&audio.pipeline)?;
            let _ = audio.pipeline.set_state(gst::State::Null);
            Ok(duration)
        })
        .await?;

        tracing::info!(asset = id, duration, "Inspected audio");
        Ok(MediaAsset::audio(id, handle, duration))
    }

    async fn open_video(&self, asset: &MediaAsset) -> CliploomResult<Box<dyn VideoPlayback>> {
        let path = file_path(&asset.handle)?;
        let video = blocking(move || {
            let video = build_video_pipeline(&path)?;
            preroll(&video.pipeline)?;
            Ok(video)
        })
        .await?;

        let dims = asset.dimensions().or_else(|| {
            lock_frame(&video.latest)
                .as_ref()
                .map(|f| (f.width, f.height))
        });
        Ok(Box::new(GstVideoPlayback {
            pipeline: video.pipeline,
            latest: video.latest,
            dims: dims.unwrap_or((0, 0)),
            natural_secs: asset.natural_duration_secs,
            released: false,
        }))
    }

    async fn open_audio(
        &self,
        asset: &MediaAsset,
        output: AudioOutput,
    ) -> CliploomResult<Box<dyn AudioPlayback>> {
        let path = file_path(&asset.handle)?;
        let audio = blocking(move || {
            let audio = build_audio_pipeline(&path, output.format, output.monitor)?;
            preroll(&audio.pipeline)?;
            Ok(audio)
        })
        .await?;

        Ok(Box::new(GstAudioPlayback {
            pipeline: audio.pipeline,
            route: audio.route,
            ended: audio.ended,
            released: false,
        }))
    }

    fn is_available(&self) -> bool {
        init_gstreamer().is_ok() && missing_elements(REQUIRED_ELEMENTS).is_empty()
    }

    fn name(&self) -> &str {
        "gstreamer"
    }
}

fn file_path(handle: &MediaHandle) -> CliploomResult<String> {
    match handle {
        MediaHandle::File { path } => {
            if !path.exists() {
                return Err(CliploomError::FileNotFound { path: path.clone() });
            }
            Ok(path.display().to_string())
        }
        MediaHandle::Synthetic { .. } => Err(CliploomError::unsupported(
            "GStreamer loader cannot open synthetic sources",
        )),
    }
}

async fn blocking<T, F>(f: F) -> CliploomResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> CliploomResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CliploomError::decode(format!("Decode task failed: {e}")))?
}

type FrameSlot = Arc<Mutex<Option<VideoFrame>>>;
type RouteSlot = Arc<Mutex<Option<CaptureHandle>>>;

fn lock_frame(slot: &FrameSlot) -> MutexGuard<'_, Option<VideoFrame>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

fn lock_route(slot: &RouteSlot) -> MutexGuard<'_, Option<CaptureHandle>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

struct VideoPipeline {
    pipeline: gst::Pipeline,
    latest: FrameSlot,
}

struct AudioPipeline {
    pipeline: gst::Pipeline,
    route: RouteSlot,
    ended: Arc<AtomicBool>,
}

fn launch(description: &str) -> CliploomResult<gst::Pipeline> {
    init_gstreamer()?;
    let element = gst::parse::launch(description)
        .map_err(|e| CliploomError::decode(format!("Failed to build decode pipeline: {e}")))?;
    element
        .dynamic_cast::<gst::Pipeline>()
        .map_err(|_| CliploomError::decode("Launch string did not produce a pipeline"))
}

fn app_sink(pipeline: &gst::Pipeline, name: &str) -> CliploomResult<gst_app::AppSink> {
    pipeline
        .by_name(name)
        .and_then(|e| e.dynamic_cast::<gst_app::AppSink>().ok())
        .ok_or_else(|| CliploomError::decode(format!("Decode pipeline has no '{name}' sink")))
}

fn set_location(pipeline: &gst::Pipeline, path: &str) -> CliploomResult<()> {
    let src = pipeline
        .by_name("src")
        .ok_or_else(|| CliploomError::decode("Decode pipeline has no source"))?;
    src.set_property("location", path);
    Ok(())
}

fn build_video_pipeline(path: &str) -> CliploomResult<VideoPipeline> {
    let pipeline = launch(
        "filesrc name=src ! decodebin ! videoconvert ! videoscale \
         ! video/x-raw,format=RGBA ! appsink name=sink sync=true max-buffers=1 drop=true",
    )?;
    set_location(&pipeline, path)?;

    let latest: FrameSlot = Arc::new(Mutex::new(None));
    let preroll_slot = latest.clone();
    let sample_slot = latest.clone();
    app_sink(&pipeline, "sink")?.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_preroll(move |sink| {
                let sample = sink.pull_preroll().map_err(|_| gst::FlowError::Eos)?;
                if let Some(frame) = sample_to_frame(&sample) {
                    *lock_frame(&preroll_slot) = Some(frame);
                }
                Ok(gst::FlowSuccess::Ok)
            })
            .new_sample(move |sink| {
                let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                if let Some(frame) = sample_to_frame(&sample) {
                    *lock_frame(&sample_slot) = Some(frame);
                }
                Ok(gst::FlowSuccess::Ok)
            })
            .build(),
    );

    Ok(VideoPipeline { pipeline, latest })
}

fn build_audio_pipeline(
    path: &str,
    format: AudioFormat,
    monitor: bool,
) -> CliploomResult<AudioPipeline> {
    let mut description = format!(
        "filesrc name=src ! decodebin ! audioconvert ! audioresample \
         ! audio/x-raw,format=F32LE,layout=interleaved,rate={rate},channels={channels} \
         ! tee name=t t. ! queue ! appsink name=capture sync=true",
        rate = format.sample_rate,
        channels = format.channels,
    );
    if monitor {
        description.push_str(" t. ! queue ! audioconvert ! autoaudiosink");
    }
    let pipeline = launch(&description)?;
    set_location(&pipeline, path)?;

    let route_slot: RouteSlot = Arc::new(Mutex::new(None));
    let ended = Arc::new(AtomicBool::new(false));
    let sample_route = route_slot.clone();
    let eos_flag = ended.clone();
    app_sink(&pipeline, "capture")?.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_sample(move |sink| {
                let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                let Some(capture) = lock_route(&sample_route).clone() else {
                    return Ok(gst::FlowSuccess::Ok);
                };
                let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;
                let samples = map
                    .as_slice()
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect();
                if let Err(e) = capture.push_audio(&AudioBlock { format, samples }) {
                    tracing::debug!(error = %e, "Audio capture route rejected block");
                }
                Ok(gst::FlowSuccess::Ok)
            })
            .eos(move |_| {
                eos_flag.store(true, Ordering::SeqCst);
            })
            .build(),
    );

    Ok(AudioPipeline {
        pipeline,
        route: route_slot,
        ended,
    })
}

fn sample_to_frame(sample: &gst::Sample) -> Option<VideoFrame> {
    let caps = sample.caps()?;
    let structure = caps.structure(0)?;
    let width = structure.get::<i32>("width").ok()?;
    let height = structure.get::<i32>("height").ok()?;
    let buffer = sample.buffer()?;
    let map = buffer.map_readable().ok()?;
    VideoFrame::from_rgba(width as u32, height as u32, map.as_slice().to_vec())
}

/// Bring a pipeline to `Paused` and wait for the first buffer.
fn preroll(pipeline: &gst::Pipeline) -> CliploomResult<()> {
    let failed = pipeline.set_state(gst::State::Paused).is_err();
    let (result, _, _) = pipeline.state(gst::ClockTime::from_seconds(PREROLL_TIMEOUT_SECS));
    if failed || result.is_err() {
        let detail = bus_error(pipeline).unwrap_or_else(|| "preroll failed".to_string());
        let _ = pipeline.set_state(gst::State::Null);
        return Err(CliploomError::decode(format!("Media is not decodable: {detail}")));
    }
    Ok(())
}

fn query_duration(pipeline: &gst::Pipeline) -> CliploomResult<f64> {
    pipeline
        .query_duration::<gst::ClockTime>()
        .map(|d| d.nseconds() as f64 / 1_000_000_000.0)
        .ok_or_else(|| CliploomError::decode("Media duration is unknown"))
}

/// Seconds to a pipeline position, saturating below `ClockTime::NONE`.
fn clock_time(secs: f64) -> gst::ClockTime {
    let ns = (secs.max(0.0) * 1_000_000_000.0).min(i64::MAX as f64);
    gst::ClockTime::from_nseconds(ns as u64)
}

fn bus_error(pipeline: &gst::Pipeline) -> Option<String> {
    let bus = pipeline.bus()?;
    let msg = bus.pop_filtered(&[gst::MessageType::Error])?;
    match msg.view() {
        gst::MessageView::Error(err) => Some(err.error().to_string()),
        _ => None,
    }
}

struct GstVideoPlayback {
    pipeline: gst::Pipeline,
    latest: FrameSlot,
    dims: (u32, u32),
    natural_secs: f64,
    released: bool,
}

impl VideoPlayback for GstVideoPlayback {
    fn dimensions(&self) -> (u32, u32) {
        self.dims
    }

    fn natural_duration_secs(&self) -> f64 {
        self.natural_secs
    }

    fn play(&mut self, rate: f64) -> CliploomResult<()> {
        if (rate - 1.0).abs() > f64::EPSILON {
            let seek = gst::event::Seek::new(
                rate,
                gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE,
                gst::SeekType::Set,
                Some(gst::ClockTime::ZERO),
                gst::SeekType::None,
                gst::ClockTime::NONE,
            );
            if !self.pipeline.send_event(seek) {
                return Err(CliploomError::decode(format!(
                    "Source refused playback rate {rate:.3}"
                )));
            }
        }
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| CliploomError::decode(format!("Failed to start video: {e:?}")))?;
        Ok(())
    }

    fn current_frame(&self) -> Option<VideoFrame> {
        lock_frame(&self.latest).clone()
    }

    fn pause(&mut self) -> CliploomResult<()> {
        self.pipeline
            .set_state(gst::State::Paused)
            .map_err(|e| CliploomError::decode(format!("Failed to pause video: {e:?}")))?;
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            let _ = self.pipeline.set_state(gst::State::Null);
            *lock_frame(&self.latest) = None;
        }
    }
}

impl Drop for GstVideoPlayback {
    fn drop(&mut self) {
        self.release();
    }
}

struct GstAudioPlayback {
    pipeline: gst::Pipeline,
    route: RouteSlot,
    ended: Arc<AtomicBool>,
    released: bool,
}

#[async_trait]
impl AudioPlayback for GstAudioPlayback {
    async fn seek(&mut self, position_secs: f64) -> CliploomResult<()> {
        let pipeline = self.pipeline.clone();
        let target = clock_time(position_secs);
        blocking(move || {
            pipeline
                .seek_simple(gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE, target)
                .map_err(|e| CliploomError::audio(format!("Audio seek failed: {e}")))?;
            let (result, _, _) =
                pipeline.state(gst::ClockTime::from_seconds(PREROLL_TIMEOUT_SECS));
            result.map_err(|e| CliploomError::audio(format!("Audio seek did not settle: {e:?}")))?;
            Ok(())
        })
        .await?;
        self.ended.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn route_to(&mut self, capture: Option<CaptureHandle>) {
        *lock_route(&self.route) = capture;
    }

    fn play(&mut self) -> CliploomResult<()> {
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| CliploomError::audio(format!("Failed to start audio: {e:?}")))?;
        Ok(())
    }

    fn pause(&mut self) -> CliploomResult<()> {
        self.pipeline
            .set_state(gst::State::Paused)
            .map_err(|e| CliploomError::audio(format!("Failed to pause audio: {e:?}")))?;
        Ok(())
    }

    fn position_secs(&self) -> f64 {
        self.pipeline
            .query_position::<gst::ClockTime>()
            .map(|p| p.nseconds() as f64 / 1_000_000_000.0)
            .unwrap_or(0.0)
    }

    fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            *lock_route(&self.route) = None;
            let _ = self.pipeline.set_state(gst::State::Null);
        }
    }
}

impl Drop for GstAudioPlayback {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_handles_are_rejected() {
        let err = file_path(&MediaHandle::Synthetic { seed: 1 }).unwrap_err();
        assert!(matches!(err, CliploomError::Unsupported { .. }));
    }

    #[test]
    fn test_clock_time_saturates() {
        assert_eq!(clock_time(1.5), gst::ClockTime::from_mseconds(1500));
        assert_eq!(clock_time(-3.0), gst::ClockTime::ZERO);
        assert_eq!(clock_time(f64::NAN), gst::ClockTime::ZERO);
        let far = clock_time(1e11).nseconds();
        assert!(far < u64::MAX);
        assert!(far > clock_time(1e9).nseconds());
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = file_path(&MediaHandle::File {
            path: "/nonexistent/cliploom/clip.webm".into(),
        })
        .unwrap_err();
        assert!(matches!(err, CliploomError::FileNotFound { .. }));
    }
}
