//! Synthetic media: generated test patterns and tones.
//!
//! Every handle maps to a deterministic seed. Video assets are solid
//! frames whose colour identifies the asset and whose blue channel counts
//! source frames; audio assets are sine tones pushed in 20 ms blocks. All
//! timing reads `tokio::time`, so paused-clock tests see virtual time.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::f32::consts::TAU;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use cliploom_capture_engine::frame::{AudioBlock, AudioFormat, VideoFrame};
use cliploom_capture_engine::pipeline::CaptureHandle;
use cliploom_common::error::{CliploomError, CliploomResult};
use cliploom_timeline_model::{AssetId, MediaAsset, MediaHandle};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::{AudioOutput, AudioPlayback, MediaLoader, VideoPlayback};

/// Source frame rate of generated video.
pub const SYNTHETIC_FPS: f64 = 30.0;

const AUDIO_BLOCK: Duration = Duration::from_millis(20);

/// Seed behind a handle. Files hash their path.
pub fn seed_of(handle: &MediaHandle) -> u64 {
    match handle {
        MediaHandle::Synthetic { seed } => *seed,
        MediaHandle::File { path } => {
            let mut hasher = DefaultHasher::new();
            path.hash(&mut hasher);
            hasher.finish()
        }
    }
}

/// Natural picture size of a generated video.
pub fn dimensions_for(seed: u64) -> (u32, u32) {
    let step = (seed % 4) as u32;
    (160 + step * 32, 90 + step * 18)
}

/// Colour of a generated frame. Red and green identify the asset, blue is
/// the source frame index.
pub fn frame_colour(seed: u64, frame_index: u64) -> [u8; 4] {
    [
        (seed.wrapping_mul(67) % 251) as u8,
        (seed.wrapping_mul(131) % 241) as u8,
        (frame_index % 256) as u8,
        255,
    ]
}

#[derive(Debug, Default)]
struct LogCounters {
    videos_opened: AtomicUsize,
    videos_released: AtomicUsize,
    audio_opened: AtomicUsize,
    audio_released: AtomicUsize,
    video_plays: Mutex<Vec<(AssetId, f64)>>,
}

/// Shared view of what the synthetic loader has handed out.
#[derive(Debug, Clone, Default)]
pub struct SyntheticLog {
    inner: Arc<LogCounters>,
}

impl SyntheticLog {
    pub fn videos_opened(&self) -> usize {
        self.inner.videos_opened.load(Ordering::SeqCst)
    }

    pub fn videos_released(&self) -> usize {
        self.inner.videos_released.load(Ordering::SeqCst)
    }

    pub fn audio_opened(&self) -> usize {
        self.inner.audio_opened.load(Ordering::SeqCst)
    }

    pub fn audio_released(&self) -> usize {
        self.inner.audio_released.load(Ordering::SeqCst)
    }

    /// Asset id and rate of every video playback start, in order.
    pub fn video_plays(&self) -> Vec<(AssetId, f64)> {
        self.plays().clone()
    }

    fn plays(&self) -> MutexGuard<'_, Vec<(AssetId, f64)>> {
        self.inner
            .video_plays
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

/// Loader that generates media instead of decoding it.
#[derive(Debug, Clone)]
pub struct SyntheticLoader {
    video_secs: f64,
    audio_secs: f64,
    open_delay: Duration,
    failing: HashSet<AssetId>,
    log: SyntheticLog,
}

impl SyntheticLoader {
    pub fn new() -> Self {
        Self {
            video_secs: 4.0,
            audio_secs: 30.0,
            open_delay: Duration::ZERO,
            failing: HashSet::new(),
            log: SyntheticLog::default(),
        }
    }

    /// Natural duration of every generated video.
    pub fn with_video_secs(mut self, secs: f64) -> Self {
        self.video_secs = secs;
        self
    }

    /// Natural duration of every generated audio track.
    pub fn with_audio_secs(mut self, secs: f64) -> Self {
        self.audio_secs = secs;
        self
    }

    /// Time a video takes to become decodable after being opened.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Make opening the given asset fail with a decode error.
    pub fn failing_on(mut self, id: AssetId) -> Self {
        self.failing.insert(id);
        self
    }

    /// Handle onto the shared log.
    pub fn log(&self) -> SyntheticLog {
        self.log.clone()
    }

    fn check_failure(&self, asset: &MediaAsset) -> CliploomResult<()> {
        if self.failing.contains(&asset.id) {
            return Err(CliploomError::decode(format!(
                "Failed to decode {}",
                asset.handle.describe()
            )));
        }
        Ok(())
    }
}

impl Default for SyntheticLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaLoader for SyntheticLoader {
    async fn inspect_video(&self, id: AssetId, handle: MediaHandle) -> CliploomResult<MediaAsset> {
        let (width, height) = dimensions_for(seed_of(&handle));
        Ok(MediaAsset::video(id, handle, self.video_secs, width, height))
    }

    async fn inspect_audio(&self, id: AssetId, handle: MediaHandle) -> CliploomResult<MediaAsset> {
        Ok(MediaAsset::audio(id, handle, self.audio_secs))
    }

    async fn open_video(&self, asset: &MediaAsset) -> CliploomResult<Box<dyn VideoPlayback>> {
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        self.check_failure(asset)?;

        let seed = seed_of(&asset.handle);
        let dims = asset.dimensions().unwrap_or_else(|| dimensions_for(seed));
        self.log.inner.videos_opened.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(asset = asset.id, seed, "Opened synthetic video");

        Ok(Box::new(SyntheticVideo {
            asset_id: asset.id,
            seed,
            dims,
            clock: PlayClock::new(asset.natural_duration_secs),
            released: false,
            log: self.log.clone(),
        }))
    }

    async fn open_audio(
        &self,
        asset: &MediaAsset,
        output: AudioOutput,
    ) -> CliploomResult<Box<dyn AudioPlayback>> {
        self.check_failure(asset)?;
        if output.monitor {
            tracing::debug!("Synthetic audio has no monitor output");
        }
        self.log.inner.audio_opened.fetch_add(1, Ordering::SeqCst);

        let seed = seed_of(&asset.handle);
        Ok(Box::new(SyntheticAudio {
            frequency: 220.0 + (seed % 5) as f32 * 55.0,
            format: output.format,
            clock: Arc::new(Mutex::new(PlayClock::new(asset.natural_duration_secs))),
            capture: None,
            pump: None,
            released: false,
            log: self.log.clone(),
        }))
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

/// Playback position that advances with runtime time.
#[derive(Debug, Clone)]
struct PlayClock {
    base_secs: f64,
    started: Option<Instant>,
    rate: f64,
    natural_secs: f64,
}

impl PlayClock {
    fn new(natural_secs: f64) -> Self {
        Self {
            base_secs: 0.0,
            started: None,
            rate: 1.0,
            natural_secs: natural_secs.max(0.0),
        }
    }

    fn position(&self) -> f64 {
        let run = self
            .started
            .map(|t| t.elapsed().as_secs_f64() * self.rate)
            .unwrap_or(0.0);
        (self.base_secs + run).min(self.natural_secs)
    }

    fn play(&mut self, rate: f64) {
        self.base_secs = self.position();
        self.rate = rate;
        self.started = Some(Instant::now());
    }

    fn pause(&mut self) {
        self.base_secs = self.position();
        self.started = None;
    }

    fn seek(&mut self, position_secs: f64) {
        self.base_secs = position_secs.clamp(0.0, self.natural_secs);
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }

    fn is_ended(&self) -> bool {
        self.position() >= self.natural_secs
    }
}

struct SyntheticVideo {
    asset_id: AssetId,
    seed: u64,
    dims: (u32, u32),
    clock: PlayClock,
    released: bool,
    log: SyntheticLog,
}

impl VideoPlayback for SyntheticVideo {
    fn dimensions(&self) -> (u32, u32) {
        self.dims
    }

    fn natural_duration_secs(&self) -> f64 {
        self.clock.natural_secs
    }

    fn play(&mut self, rate: f64) -> CliploomResult<()> {
        if self.released {
            return Err(CliploomError::decode("Video playback already released"));
        }
        if !(rate.is_finite() && rate > 0.0) {
            return Err(CliploomError::render(format!("Invalid playback rate {rate}")));
        }
        self.clock.play(rate);
        self.log.plays().push((self.asset_id, rate));
        Ok(())
    }

    fn current_frame(&self) -> Option<VideoFrame> {
        if self.released {
            return None;
        }
        let last_index = ((self.clock.natural_secs * SYNTHETIC_FPS).ceil() as u64).saturating_sub(1);
        let index = ((self.clock.position() * SYNTHETIC_FPS) as u64).min(last_index);
        let (width, height) = self.dims;
        Some(VideoFrame::solid(width, height, frame_colour(self.seed, index)))
    }

    fn pause(&mut self) -> CliploomResult<()> {
        self.clock.pause();
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.clock.pause();
            self.log.inner.videos_released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for SyntheticVideo {
    fn drop(&mut self) {
        self.release();
    }
}

struct SyntheticAudio {
    frequency: f32,
    format: AudioFormat,
    clock: Arc<Mutex<PlayClock>>,
    capture: Option<CaptureHandle>,
    pump: Option<JoinHandle<()>>,
    released: bool,
    log: SyntheticLog,
}

impl SyntheticAudio {
    fn clock(&self) -> MutexGuard<'_, PlayClock> {
        lock_clock(&self.clock)
    }

    fn stop_pump(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }

    fn start_pump(&mut self) -> CliploomResult<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            CliploomError::audio(format!("Synthetic audio requires a tokio runtime: {e}"))
        })?;
        let clock = self.clock.clone();
        let capture = self.capture.clone();
        let format = self.format;
        let frequency = self.frequency;

        self.pump = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(AUDIO_BLOCK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut emitted_secs = lock_clock(&clock).position();
            let rate = format.sample_rate.max(1) as f64;

            loop {
                ticker.tick().await;
                let (position, ended) = {
                    let clock = lock_clock(&clock);
                    (clock.position(), clock.is_ended())
                };
                let frames = ((position - emitted_secs) * rate).floor();
                if frames >= 1.0 {
                    let block = tone_block(format, frequency, emitted_secs, frames as usize);
                    emitted_secs += frames / rate;
                    if let Some(capture) = &capture {
                        if let Err(e) = capture.push_audio(&block) {
                            tracing::debug!(error = %e, "Synthetic audio route closed");
                            break;
                        }
                    }
                }
                if ended {
                    break;
                }
            }
        }));
        Ok(())
    }
}

fn lock_clock(clock: &Mutex<PlayClock>) -> MutexGuard<'_, PlayClock> {
    clock.lock().unwrap_or_else(|e| e.into_inner())
}

fn tone_block(format: AudioFormat, frequency: f32, start_secs: f64, frames: usize) -> AudioBlock {
    let channels = format.channels.max(1) as usize;
    let rate = format.sample_rate.max(1) as f64;
    let mut samples = Vec::with_capacity(frames * channels);
    for n in 0..frames {
        let t = (start_secs + n as f64 / rate) as f32;
        let value = (TAU * frequency * t).sin() * 0.2;
        samples.extend(std::iter::repeat(value).take(channels));
    }
    AudioBlock { format, samples }
}

#[async_trait]
impl AudioPlayback for SyntheticAudio {
    async fn seek(&mut self, position_secs: f64) -> CliploomResult<()> {
        if self.released {
            return Err(CliploomError::audio("Audio playback already released"));
        }
        let was_playing = self.pump.is_some();
        self.stop_pump();
        self.clock().seek(position_secs);
        if was_playing {
            self.start_pump()?;
        }
        Ok(())
    }

    fn route_to(&mut self, capture: Option<CaptureHandle>) {
        self.capture = capture;
        if self.pump.is_some() {
            self.stop_pump();
            if let Err(e) = self.start_pump() {
                tracing::warn!(error = %e, "Failed to restart synthetic audio");
            }
        }
    }

    fn play(&mut self) -> CliploomResult<()> {
        if self.released {
            return Err(CliploomError::audio("Audio playback already released"));
        }
        if self.pump.is_some() {
            return Ok(());
        }
        self.clock().play(1.0);
        self.start_pump()
    }

    fn pause(&mut self) -> CliploomResult<()> {
        self.stop_pump();
        self.clock().pause();
        Ok(())
    }

    fn position_secs(&self) -> f64 {
        self.clock().position()
    }

    fn is_ended(&self) -> bool {
        self.clock().is_ended()
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.stop_pump();
            self.clock().pause();
            self.capture = None;
            self.log.inner.audio_released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for SyntheticAudio {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_asset(loader_secs: f64, seed: u64) -> MediaAsset {
        let (w, h) = dimensions_for(seed);
        MediaAsset::video(seed, MediaHandle::Synthetic { seed }, loader_secs, w, h)
    }

    #[tokio::test]
    async fn test_inspect_reports_configured_geometry() {
        let loader = SyntheticLoader::new().with_video_secs(6.0);
        let asset = loader
            .inspect_video(1, MediaHandle::Synthetic { seed: 1 })
            .await
            .unwrap();
        assert_eq!(asset.natural_duration_secs, 6.0);
        assert_eq!(asset.dimensions(), Some((192, 108)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_video_advances_at_rate_and_holds_last_frame() {
        let loader = SyntheticLoader::new();
        let mut video = loader.open_video(&video_asset(1.0, 3)).await.unwrap();
        assert_eq!(video.current_frame().unwrap().pixel(0, 0).unwrap()[2], 0);

        video.play(2.0).unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        // 0.25s wall at 2x = 0.5s of source = frame 15.
        assert_eq!(video.current_frame().unwrap().pixel(0, 0).unwrap()[2], 15);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(video.current_frame().unwrap().pixel(0, 0).unwrap()[2], 29);

        video.release();
        assert!(video.current_frame().is_none());
        assert_eq!(loader.log().video_plays(), vec![(3, 2.0)]);
        assert_eq!(loader.log().videos_released(), 1);
    }

    #[tokio::test]
    async fn test_failing_asset_is_a_decode_error() {
        let loader = SyntheticLoader::new().failing_on(7);
        let err = loader.open_video(&video_asset(4.0, 7)).await.err().unwrap();
        assert!(matches!(err, CliploomError::Decode { .. }));
        assert_eq!(loader.log().videos_opened(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_audio_position_seek_and_end() {
        let loader = SyntheticLoader::new().with_audio_secs(2.0);
        let asset = MediaAsset::audio(9, MediaHandle::Synthetic { seed: 9 }, 2.0);
        let output = AudioOutput {
            monitor: false,
            format: AudioFormat::default(),
        };
        let mut audio = loader.open_audio(&asset, output).await.unwrap();

        audio.seek(1.5).await.unwrap();
        assert!((audio.position_secs() - 1.5).abs() < 1e-9);
        audio.play().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!((audio.position_secs() - 1.7).abs() < 1e-6);
        assert!(!audio.is_ended());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(audio.is_ended());
        assert_eq!(audio.position_secs(), 2.0);

        audio.release();
        assert_eq!(loader.log().audio_released(), 1);
    }

    #[test]
    fn test_tone_block_layout() {
        let block = tone_block(AudioFormat::default(), 440.0, 0.0, 960);
        assert_eq!(block.frames(), 960);
        assert_eq!(block.samples[0], block.samples[1]);
        assert!(block.samples.iter().all(|s| s.abs() <= 0.2 + f32::EPSILON));
    }
}
