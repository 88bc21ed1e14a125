//! The editing session: assets, timestamps, order, audio window, and the
//! single output surface that renders and previews take turns on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use cliploom_capture_engine::artifact::Artifact;
use cliploom_capture_engine::frame::VideoFrame;
use cliploom_capture_engine::pipeline::EncoderBackend;
use cliploom_common::config::RenderDefaults;
use cliploom_common::error::{CliploomError, CliploomResult};
use cliploom_timeline_model::{
    AssetId, AudioWindow, MediaAsset, MediaHandle, Order, SegmentDuration, Timeline,
    TimestampList,
};
use rand::Rng;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::preview::{run_preview, PreviewFrame};
use crate::render::{ProgressCallback, RenderPlan, RenderSession};
use crate::source::MediaLoader;
use crate::surface::OutputSurface;

const INITIAL_SURFACE: (u32, u32) = (640, 360);

#[derive(Debug, Default)]
struct StudioState {
    videos: Vec<MediaAsset>,
    audio: Option<MediaAsset>,
    timestamps: TimestampList,
    order: Order,
    window: AudioWindow,
}

/// One user's editing session.
///
/// Editing operations take effect immediately; a render or preview works
/// on a snapshot taken when it starts. Only one render or preview may use
/// the surface at a time; a second one is rejected with `Busy`.
pub struct Studio {
    loader: Arc<dyn MediaLoader>,
    encoder: Arc<dyn EncoderBackend>,
    config: RenderDefaults,
    progress: Option<ProgressCallback>,
    state: Mutex<StudioState>,
    surface: tokio::sync::Mutex<OutputSurface>,
    permit: Semaphore,
    result: Mutex<Option<Arc<Artifact>>>,
    next_id: AtomicU64,
}

impl Studio {
    pub fn new(
        loader: Arc<dyn MediaLoader>,
        encoder: Arc<dyn EncoderBackend>,
        config: RenderDefaults,
    ) -> Self {
        let (width, height) = INITIAL_SURFACE;
        Self {
            loader,
            encoder,
            surface: tokio::sync::Mutex::new(OutputSurface::new(width, height, config.capture_fps)),
            config,
            progress: None,
            state: Mutex::new(StudioState::default()),
            permit: Semaphore::new(1),
            result: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Report render progress to a callback.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    fn state(&self) -> MutexGuard<'_, StudioState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn result_slot(&self) -> MutexGuard<'_, Option<Arc<Artifact>>> {
        self.result.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn allocate_id(&self) -> AssetId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Replace the video list. The order is reset to the identity.
    pub async fn set_videos(&self, handles: Vec<MediaHandle>) -> CliploomResult<Vec<MediaAsset>> {
        let mut videos = Vec::with_capacity(handles.len());
        for handle in handles {
            let id = self.allocate_id();
            let asset = self.loader.inspect_video(id, handle).await?;
            tracing::debug!(
                asset = asset.id,
                source = %asset.handle.describe(),
                duration = asset.natural_duration_secs,
                "Video loaded"
            );
            videos.push(asset);
        }

        let mut state = self.state();
        state.order.reset(videos.len());
        state.videos = videos.clone();
        tracing::info!(count = videos.len(), "Video assets replaced");
        Ok(videos)
    }

    /// Replace or clear the audio track. The audio window is reset.
    pub async fn set_audio(&self, handle: Option<MediaHandle>) -> CliploomResult<Option<MediaAsset>> {
        let asset = match handle {
            Some(handle) => {
                let id = self.allocate_id();
                Some(self.loader.inspect_audio(id, handle).await?)
            }
            None => None,
        };

        let mut state = self.state();
        state.audio = asset.clone();
        state.window = AudioWindow::default();
        tracing::info!(
            audio = ?asset.as_ref().map(|a| a.handle.describe()),
            "Audio asset replaced"
        );
        Ok(asset)
    }

    /// Replace the raw timestamp text.
    pub fn set_timestamps(&self, raw: impl Into<String>) {
        self.state().timestamps.set(raw);
    }

    /// Append a playback position to the timestamp text.
    pub fn add_timestamp(&self, position_secs: f64) -> String {
        let mut state = self.state();
        state.timestamps.push_position(position_secs);
        state.timestamps.raw().to_string()
    }

    /// Raw timestamp text.
    pub fn timestamps(&self) -> String {
        self.state().timestamps.raw().to_string()
    }

    /// Target segment durations derived from the timestamp text.
    pub fn durations(&self) -> Vec<SegmentDuration> {
        self.state().timestamps.durations()
    }

    /// Mark a playback position as the audio start.
    pub fn set_audio_start(&self, position_secs: f64) {
        self.state().window.set_start(position_secs);
    }

    /// Mark a playback position as the audio end.
    pub fn set_audio_end(&self, position_secs: f64) {
        self.state().window.set_end(position_secs);
    }

    /// Forget the audio end marker.
    pub fn clear_audio_end(&self) {
        self.state().window.clear_end();
    }

    /// Current audio window.
    pub fn audio_window(&self) -> AudioWindow {
        self.state().window
    }

    /// Shuffle the segment order uniformly.
    pub fn shuffle(&self) -> Vec<usize> {
        let mut state = self.state();
        state.order.shuffle();
        state.order.as_slice().to_vec()
    }

    /// Shuffle the segment order with a caller-provided generator.
    pub fn shuffle_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        let mut state = self.state();
        state.order.shuffle_with(rng);
        state.order.as_slice().to_vec()
    }

    /// Set an explicit order. It must be a permutation of the loaded videos.
    pub fn set_order(&self, indices: Vec<usize>) -> CliploomResult<()> {
        let mut state = self.state();
        let n = state.videos.len();
        match Order::from_permutation(indices) {
            Some(order) if order.len() == n => {
                state.order = order;
                Ok(())
            }
            _ => Err(CliploomError::config(format!(
                "Order must be a permutation of 0..{n}"
            ))),
        }
    }

    /// Current segment order.
    pub fn order(&self) -> Vec<usize> {
        self.state().order.as_slice().to_vec()
    }

    /// Loaded video assets.
    pub fn videos(&self) -> Vec<MediaAsset> {
        self.state().videos.clone()
    }

    /// Loaded audio asset.
    pub fn audio(&self) -> Option<MediaAsset> {
        self.state().audio.clone()
    }

    /// The segments a render would play right now.
    pub fn plan(&self) -> Timeline {
        let state = self.state();
        Timeline::plan(&state.order, &state.timestamps.durations())
    }

    fn snapshot(&self) -> RenderPlan {
        let state = self.state();
        RenderPlan {
            timeline: Timeline::plan(&state.order, &state.timestamps.durations()),
            videos: state.videos.clone(),
            audio: state.audio.clone(),
            window: state.window,
        }
    }

    /// Whether a render or preview holds the surface.
    pub fn is_busy(&self) -> bool {
        self.permit.available_permits() == 0
    }

    /// Most recent render result.
    pub fn last_artifact(&self) -> Option<Arc<Artifact>> {
        self.result_slot().clone()
    }

    /// Current surface contents.
    pub async fn surface_snapshot(&self) -> VideoFrame {
        self.surface.lock().await.snapshot()
    }

    /// Whether the surface is still forwarding to a capture.
    pub async fn surface_is_capturing(&self) -> bool {
        self.surface.lock().await.is_capturing()
    }

    /// Render the current timeline into one clip.
    ///
    /// Returns `Ok(None)` without starting an encoder when there is nothing
    /// to play. On success the artifact replaces the previous result.
    pub async fn render(&self, cancel: &CancellationToken) -> CliploomResult<Option<Arc<Artifact>>> {
        let _permit = self
            .permit
            .try_acquire()
            .map_err(|_| CliploomError::busy("a render or preview is already in progress"))?;

        let plan = self.snapshot();
        if plan.timeline.is_empty() {
            tracing::info!(
                videos = plan.videos.len(),
                "Nothing to render: no segment durations or no videos"
            );
            return Ok(None);
        }

        let mut surface = self.surface.lock().await;
        let mut session = RenderSession::new(plan, &self.config, self.progress.as_ref());
        let artifact = session
            .run(self.loader.as_ref(), self.encoder.as_ref(), &mut surface, cancel)
            .await?;

        let artifact = Arc::new(artifact);
        *self.result_slot() = Some(artifact.clone());
        Ok(Some(artifact))
    }

    /// Show each segment's first frame in timeline order.
    ///
    /// Returns `Ok(None)` when there is nothing to show.
    pub async fn preview(&self, cancel: &CancellationToken) -> CliploomResult<Option<Vec<PreviewFrame>>> {
        let _permit = self
            .permit
            .try_acquire()
            .map_err(|_| CliploomError::busy("a render or preview is already in progress"))?;

        let plan = self.snapshot();
        if plan.timeline.is_empty() {
            tracing::info!("Nothing to preview");
            return Ok(None);
        }

        let mut surface = self.surface.lock().await;
        let shown = run_preview(
            self.loader.as_ref(),
            &plan.timeline,
            &plan.videos,
            &mut surface,
            self.config.preview_step(),
            cancel,
        )
        .await?;
        Ok(Some(shown))
    }
}
