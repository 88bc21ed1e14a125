//! Storyboard preview: each segment's first frame, held briefly.
//!
//! Preview walks the timeline in order without starting an encoder or the
//! audio track, so it shows what will be rendered without the cost of
//! playing every segment at full length.

use std::time::Duration;

use cliploom_capture_engine::frame::VideoFrame;
use cliploom_common::error::{CliploomError, CliploomResult};
use cliploom_timeline_model::{MediaAsset, Timeline};
use tokio_util::sync::CancellationToken;

use crate::compositor::load_segment;
use crate::source::MediaLoader;
use crate::surface::OutputSurface;

/// One shown segment.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewFrame {
    pub slot: usize,
    pub asset_index: usize,
    pub frame: VideoFrame,
}

/// Show the first frame of every timeline entry for `step` each.
pub async fn run_preview(
    loader: &dyn MediaLoader,
    timeline: &Timeline,
    assets: &[MediaAsset],
    surface: &mut OutputSurface,
    step: Duration,
    cancel: &CancellationToken,
) -> CliploomResult<Vec<PreviewFrame>> {
    let mut shown = Vec::with_capacity(timeline.len());

    for entry in &timeline.entries {
        let asset = assets.get(entry.asset_index).ok_or_else(|| {
            CliploomError::render(format!(
                "Timeline slot {} refers to missing video {}",
                entry.slot, entry.asset_index
            ))
        })?;

        let segment = load_segment(loader, asset, surface, cancel).await?;
        let first = segment.current_frame();
        segment.release();

        let Some(frame) = first else {
            tracing::warn!(slot = entry.slot, "Segment produced no preview frame");
            continue;
        };
        surface.paint(&frame)?;
        shown.push(PreviewFrame {
            slot: entry.slot,
            asset_index: entry.asset_index,
            frame: surface.snapshot(),
        });
        tracing::debug!(slot = entry.slot, asset = asset.id, "Preview frame shown");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CliploomError::Cancelled),
            _ = tokio::time::sleep(step) => {}
        }
    }

    tracing::info!(segments = shown.len(), "Preview finished");
    Ok(shown)
}
