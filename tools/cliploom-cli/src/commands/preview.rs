//! Storyboard preview of the timeline.

use cliploom_common::config::AppConfig;

use super::{cancel_on_ctrl_c, load_studio};
use crate::TimelineArgs;

pub async fn run(config: &AppConfig, timeline: TimelineArgs) -> anyhow::Result<()> {
    println!("Loading {} clip(s)", timeline.videos.len());
    let studio = load_studio(&config.render, &timeline).await?;
    let videos = studio.videos();
    println!();

    let cancel = cancel_on_ctrl_c();
    let shown = match studio.preview(&cancel).await {
        Ok(Some(shown)) => shown,
        Ok(None) => {
            println!("Nothing to preview.");
            return Ok(());
        }
        Err(e) if e.is_cancelled() => {
            println!("Preview cancelled.");
            return Ok(());
        }
        Err(e) => return Err(anyhow::anyhow!("Preview failed: {e}")),
    };

    println!("Preview ({} segment(s)):", shown.len());
    for frame in &shown {
        let source = videos
            .get(frame.asset_index)
            .map(|v| v.handle.describe())
            .unwrap_or_default();
        println!(
            "  slot {}: [{}] {} {}x{}",
            frame.slot, frame.asset_index, source, frame.frame.width, frame.frame.height
        );
    }
    Ok(())
}
