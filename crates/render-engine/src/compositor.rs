//! Segment compositor: plays the timeline onto the output surface.
//!
//! Each segment is time-boxed by wall clock, not by source frames: the
//! clip is played at `natural / target` speed and whatever frame was
//! decoded most recently is painted on every tick until the box expires.
//! A source that ends early leaves its last frame on screen; a source that
//! cannot keep up simply has frames skipped.

use std::time::Duration;

use cliploom_capture_engine::artifact::SegmentSummary;
use cliploom_capture_engine::frame::VideoFrame;
use cliploom_common::clock::time_box;
use cliploom_common::error::{CliploomError, CliploomResult};
use cliploom_timeline_model::{AssetId, MediaAsset, Timeline, TimelineEntry};
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::source::{MediaLoader, VideoPlayback};
use crate::surface::OutputSurface;

/// Where the compositor is in the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositorState {
    Idle,
    /// Waiting for segment `i` to become decodable.
    Loading(usize),
    /// Painting segment `i`.
    Playing(usize),
    Finished,
    Aborted,
}

/// What happened while one segment played.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentReport {
    /// Position in the timeline.
    pub slot: usize,

    /// Index into the video asset list.
    pub asset_index: usize,

    /// Asset that was played.
    pub asset_id: AssetId,

    /// Requested on-screen duration.
    pub target_secs: f64,

    /// Speed the clip was played at.
    pub playback_rate: f64,

    /// Measured time the segment held the surface.
    pub elapsed_secs: f64,

    /// Paint ticks that drew a frame.
    pub frames_painted: u64,

    /// The segment had no playable duration and was not shown.
    pub skipped: bool,
}

impl SegmentReport {
    /// The artifact-side record of this segment.
    pub fn summary(&self) -> SegmentSummary {
        SegmentSummary {
            slot: self.slot,
            asset_index: self.asset_index,
            target_secs: self.target_secs,
            playback_rate: self.playback_rate,
            elapsed_secs: self.elapsed_secs,
            frames_painted: self.frames_painted,
            skipped: self.skipped,
        }
    }
}

/// A segment whose video is open and decodable.
pub struct LoadedSegment {
    asset_id: AssetId,
    playback: Box<dyn VideoPlayback>,
}

impl LoadedSegment {
    /// Natural picture size of the loaded clip.
    pub fn dimensions(&self) -> (u32, u32) {
        self.playback.dimensions()
    }

    /// Frame the clip would show right now.
    pub fn current_frame(&self) -> Option<VideoFrame> {
        self.playback.current_frame()
    }

    /// Release decode resources.
    pub fn release(mut self) {
        self.playback.release();
    }
}

/// Open a video asset and size the surface to its picture.
pub async fn load_segment(
    loader: &dyn MediaLoader,
    asset: &MediaAsset,
    surface: &mut OutputSurface,
    cancel: &CancellationToken,
) -> CliploomResult<LoadedSegment> {
    let playback = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(CliploomError::Cancelled),
        opened = loader.open_video(asset) => opened?,
    };

    let (width, height) = playback.dimensions();
    surface.resize(width, height);
    Ok(LoadedSegment {
        asset_id: asset.id,
        playback,
    })
}

/// Plays a single timeline entry.
pub struct SegmentPlayer<'a> {
    loader: &'a dyn MediaLoader,
    paint_interval: Duration,
}

impl<'a> SegmentPlayer<'a> {
    pub fn new(loader: &'a dyn MediaLoader, paint_interval: Duration) -> Self {
        Self {
            loader,
            paint_interval,
        }
    }

    /// Open the asset and size the surface to it.
    pub async fn load(
        &self,
        asset: &MediaAsset,
        surface: &mut OutputSurface,
        cancel: &CancellationToken,
    ) -> CliploomResult<LoadedSegment> {
        load_segment(self.loader, asset, surface, cancel).await
    }

    /// Play a loaded segment for exactly its time box, then release it.
    pub async fn play(
        &self,
        mut segment: LoadedSegment,
        entry: &TimelineEntry,
        surface: &mut OutputSurface,
        cancel: &CancellationToken,
    ) -> CliploomResult<SegmentReport> {
        let natural = segment.playback.natural_duration_secs();
        let rate = entry.playback_rate(natural).unwrap_or_else(|| {
            tracing::warn!(
                slot = entry.slot,
                natural,
                "Natural duration unknown; playing at normal speed"
            );
            1.0
        });

        let result = self.paint_loop(&mut segment, entry, rate, surface, cancel).await;

        if let Err(e) = segment.playback.pause() {
            tracing::warn!(slot = entry.slot, error = %e, "Failed to pause segment");
        }
        segment.playback.release();

        let (elapsed, frames_painted) = result?;
        Ok(SegmentReport {
            slot: entry.slot,
            asset_index: entry.asset_index,
            asset_id: segment.asset_id,
            target_secs: entry.duration.secs(),
            playback_rate: rate,
            elapsed_secs: elapsed.as_secs_f64(),
            frames_painted,
            skipped: false,
        })
    }

    async fn paint_loop(
        &self,
        segment: &mut LoadedSegment,
        entry: &TimelineEntry,
        rate: f64,
        surface: &mut OutputSurface,
        cancel: &CancellationToken,
    ) -> CliploomResult<(Duration, u64)> {
        let length = segment_time_box(entry)?;
        segment.playback.play(rate)?;
        let started = Instant::now();
        let deadline = started
            .checked_add(length)
            .ok_or_else(|| segment_too_long(entry))?;

        let mut ticker = tokio::time::interval(self.paint_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = 0u64;
        let mut painted = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CliploomError::Cancelled),
                // Always paint at least once, even for sub-tick boxes.
                _ = tokio::time::sleep_until(deadline), if ticks > 0 => break,
                _ = ticker.tick() => {
                    ticks += 1;
                    if let Some(frame) = segment.playback.current_frame() {
                        surface.paint(&frame)?;
                        painted += 1;
                    }
                }
            }
        }

        Ok((started.elapsed(), painted))
    }
}

/// Drives the segment player across the whole timeline.
pub struct Compositor<'a> {
    player: SegmentPlayer<'a>,
    state: CompositorState,
}

impl<'a> Compositor<'a> {
    pub fn new(loader: &'a dyn MediaLoader, paint_interval: Duration) -> Self {
        Self {
            player: SegmentPlayer::new(loader, paint_interval),
            state: CompositorState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> CompositorState {
        self.state
    }

    /// Play every timeline entry in order.
    ///
    /// `on_segment` is called after each entry with the number of entries
    /// done so far.
    pub async fn run(
        &mut self,
        timeline: &Timeline,
        assets: &[MediaAsset],
        surface: &mut OutputSurface,
        cancel: &CancellationToken,
        mut on_segment: impl FnMut(&SegmentReport, usize),
    ) -> CliploomResult<Vec<SegmentReport>> {
        match self.run_entries(timeline, assets, surface, cancel, &mut on_segment).await {
            Ok(reports) => {
                self.state = CompositorState::Finished;
                tracing::info!(segments = reports.len(), "Compositor finished");
                Ok(reports)
            }
            Err(e) => {
                self.state = CompositorState::Aborted;
                tracing::warn!(error = %e, "Compositor aborted");
                Err(e)
            }
        }
    }

    async fn run_entries(
        &mut self,
        timeline: &Timeline,
        assets: &[MediaAsset],
        surface: &mut OutputSurface,
        cancel: &CancellationToken,
        on_segment: &mut impl FnMut(&SegmentReport, usize),
    ) -> CliploomResult<Vec<SegmentReport>> {
        let mut reports = Vec::with_capacity(timeline.len());

        for (i, entry) in timeline.entries.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(CliploomError::Cancelled);
            }
            let asset = assets.get(entry.asset_index).ok_or_else(|| {
                CliploomError::render(format!(
                    "Timeline slot {} refers to missing video {}",
                    entry.slot, entry.asset_index
                ))
            })?;

            if !entry.duration.is_playable() {
                tracing::warn!(
                    slot = entry.slot,
                    duration = entry.duration.secs(),
                    "Skipping segment without a playable duration"
                );
                let report = SegmentReport {
                    slot: entry.slot,
                    asset_index: entry.asset_index,
                    asset_id: asset.id,
                    target_secs: entry.duration.secs(),
                    playback_rate: 0.0,
                    elapsed_secs: 0.0,
                    frames_painted: 0,
                    skipped: true,
                };
                on_segment(&report, i + 1);
                reports.push(report);
                continue;
            }

            segment_time_box(entry)?;

            self.state = CompositorState::Loading(i);
            let segment = self.player.load(asset, surface, cancel).await?;

            self.state = CompositorState::Playing(i);
            let report = self.player.play(segment, entry, surface, cancel).await?;
            tracing::info!(
                slot = report.slot,
                asset = report.asset_id,
                rate = report.playback_rate,
                target_secs = report.target_secs,
                elapsed_secs = report.elapsed_secs,
                frames = report.frames_painted,
                "Segment played"
            );
            on_segment(&report, i + 1);
            reports.push(report);
        }

        Ok(reports)
    }
}

/// The time box of a playable entry, or an error if it cannot be scheduled.
fn segment_time_box(entry: &TimelineEntry) -> CliploomResult<Duration> {
    time_box(entry.duration.secs()).ok_or_else(|| segment_too_long(entry))
}

fn segment_too_long(entry: &TimelineEntry) -> CliploomError {
    CliploomError::render(format!(
        "Segment {} duration {}s is too long to schedule",
        entry.slot,
        entry.duration.secs()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::synthetic::{dimensions_for, SyntheticLoader};
    use cliploom_timeline_model::{derive_durations, MediaHandle, Order};

    fn assets(n: u64, natural: f64) -> Vec<MediaAsset> {
        (0..n)
            .map(|seed| {
                let (w, h) = dimensions_for(seed);
                MediaAsset::video(seed, MediaHandle::Synthetic { seed }, natural, w, h)
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_segments_play_in_order_for_their_time_box() {
        let loader = SyntheticLoader::new();
        let order = Order::from_permutation(vec![2, 0, 1]).unwrap();
        let timeline = Timeline::plan(&order, &derive_durations("1, 1.5, 3.5"));
        let assets = assets(3, 4.0);
        let mut surface = OutputSurface::new(1, 1, 30);
        let cancel = CancellationToken::new();

        let mut compositor = Compositor::new(&loader, Duration::from_millis(10));
        let started = Instant::now();
        let mut progress = Vec::new();
        let reports = compositor
            .run(&timeline, &assets, &mut surface, &cancel, |_, done| progress.push(done))
            .await
            .unwrap();

        assert_eq!(compositor.state(), CompositorState::Finished);
        assert_eq!(progress, vec![1, 2, 3]);
        let order: Vec<_> = reports.iter().map(|r| r.asset_index).collect();
        assert_eq!(order, vec![2, 0, 1]);
        assert_eq!(reports[0].playback_rate, 4.0);
        assert_eq!(reports[1].playback_rate, 8.0);
        assert_eq!(reports[2].playback_rate, 2.0);
        for report in &reports {
            assert!((report.elapsed_secs - report.target_secs).abs() < 0.02);
            assert!(report.frames_painted >= 1);
        }
        assert!((started.elapsed().as_secs_f64() - 3.5).abs() < 0.05);
        assert_eq!(surface.dimensions(), dimensions_for(1));
        assert_eq!(loader.log().videos_released(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degenerate_segment_is_skipped() {
        let loader = SyntheticLoader::new();
        let timeline = Timeline::plan(&Order::initialize(3), &derive_durations("2, 1, 1.5"));
        let mut surface = OutputSurface::new(1, 1, 30);
        let mut compositor = Compositor::new(&loader, Duration::from_millis(10));

        let reports = compositor
            .run(&timeline, &assets(3, 4.0), &mut surface, &CancellationToken::new(), |_, _| {})
            .await
            .unwrap();

        assert_eq!(reports.len(), 3);
        assert!(reports[1].skipped);
        assert!(!reports[2].skipped);
        assert_eq!(loader.log().videos_opened(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sub_tick_box_paints_once() {
        let loader = SyntheticLoader::new();
        let timeline = Timeline::plan(&Order::initialize(1), &derive_durations("0.001"));
        let mut surface = OutputSurface::new(1, 1, 30);
        let mut compositor = Compositor::new(&loader, Duration::from_millis(16));

        let reports = compositor
            .run(&timeline, &assets(1, 4.0), &mut surface, &CancellationToken::new(), |_, _| {})
            .await
            .unwrap();
        assert_eq!(reports[0].frames_painted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unschedulable_duration_is_an_error() {
        let loader = SyntheticLoader::new();
        let timeline = Timeline::plan(&Order::initialize(2), &derive_durations("1, 1e20"));
        let mut surface = OutputSurface::new(1, 1, 30);
        let mut compositor = Compositor::new(&loader, Duration::from_millis(10));

        let err = compositor
            .run(&timeline, &assets(2, 4.0), &mut surface, &CancellationToken::new(), |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, CliploomError::Render { .. }));
        assert!(err.to_string().contains("too long"));
        assert_eq!(compositor.state(), CompositorState::Aborted);
        assert_eq!(loader.log().videos_opened(), 1);
        assert_eq!(loader.log().videos_released(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decode_failure_aborts_and_releases() {
        let loader = SyntheticLoader::new().failing_on(1);
        let timeline = Timeline::plan(&Order::initialize(3), &derive_durations("1, 2, 3"));
        let mut surface = OutputSurface::new(1, 1, 30);
        let mut compositor = Compositor::new(&loader, Duration::from_millis(10));

        let err = compositor
            .run(&timeline, &assets(3, 4.0), &mut surface, &CancellationToken::new(), |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, CliploomError::Decode { .. }));
        assert_eq!(compositor.state(), CompositorState::Aborted);
        assert_eq!(loader.log().videos_opened(), 1);
        assert_eq!(loader.log().videos_released(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_paint_loop() {
        let loader = SyntheticLoader::new();
        let timeline = Timeline::plan(&Order::initialize(2), &derive_durations("5, 10"));
        let mut surface = OutputSurface::new(1, 1, 30);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            trigger.cancel();
        });

        let mut compositor = Compositor::new(&loader, Duration::from_millis(10));
        let err = compositor
            .run(&timeline, &assets(2, 4.0), &mut surface, &cancel, |_, _| {})
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(loader.log().videos_released(), 1);
    }
}
