//! Render the timeline into one clip.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use cliploom_common::config::AppConfig;
use cliploom_render_engine::{RenderProgress, RenderStage};
use cliploom_timeline_model::MediaHandle;

use super::{cancel_on_ctrl_c, load_studio};
use crate::TimelineArgs;

/// Audio options of the render command.
pub struct AudioArgs {
    pub path: Option<PathBuf>,
    pub start: Option<f64>,
    pub end: Option<f64>,
}

pub async fn run(
    config: &AppConfig,
    timeline: TimelineArgs,
    audio: AudioArgs,
    output: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    println!("Loading {} clip(s)", timeline.videos.len());
    let studio = load_studio(&config.render, &timeline)
        .await?
        .with_progress(Arc::new(print_progress));

    if let Some(path) = audio.path {
        let asset = studio
            .set_audio(Some(MediaHandle::File { path }))
            .await?
            .ok_or_else(|| anyhow::anyhow!("Audio track failed to load"))?;
        println!(
            "  Audio: {} ({:.2}s)",
            asset.handle.describe(),
            asset.natural_duration_secs
        );
        if let Some(start) = audio.start {
            studio.set_audio_start(start);
        }
        if let Some(end) = audio.end {
            studio.set_audio_end(end);
        }
        let window = studio.audio_window();
        match window.end {
            Some(end) => println!("  Audio window: {:.2}s -> {:.2}s", window.start, end),
            None => println!("  Audio window: from {:.2}s", window.start),
        }
    }

    let plan = studio.plan();
    println!(
        "  Timeline: {} segment(s), {:.2}s",
        plan.len(),
        plan.total_secs()
    );
    println!();

    let cancel = cancel_on_ctrl_c();
    let result = studio.render(&cancel).await;
    println!();

    let artifact = match result {
        Ok(Some(artifact)) => artifact,
        Ok(None) => {
            println!("Nothing to render: give at least one clip and one valid timestamp.");
            return Ok(());
        }
        Err(e) if e.is_cancelled() => {
            println!("Render cancelled.");
            return Ok(());
        }
        Err(e) => return Err(anyhow::anyhow!("Render failed: {e}")),
    };

    let output_path = output.unwrap_or_else(|| {
        config
            .output_dir
            .join(format!("cliploom.{}", artifact.container.extension()))
    });
    artifact.write_to(&output_path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(artifact.as_ref())?);
    } else {
        println!("Render complete: {}", output_path.display());
        println!("  Type: {}", artifact.mime_type());
        println!("  Size: {} bytes", artifact.len());
        println!("  Segments: {}", artifact.summary.segments_rendered);
        println!("  Duration: {:.2}s", artifact.summary.duration_secs);
        println!("  Audio: {}", if artifact.has_audio { "yes" } else { "no" });
        for segment in &artifact.summary.segments {
            if segment.skipped {
                println!("    [{}] clip {} skipped", segment.slot, segment.asset_index);
            } else {
                println!(
                    "    [{}] clip {} {:.2}s at {:.2}x, {} frame(s)",
                    segment.slot,
                    segment.asset_index,
                    segment.target_secs,
                    segment.playback_rate,
                    segment.frames_painted
                );
            }
        }
    }

    Ok(())
}

fn print_progress(p: RenderProgress) {
    let stage = match p.stage {
        RenderStage::Preparing => "preparing",
        RenderStage::Compositing => "compositing",
        RenderStage::AudioTail => "waiting for audio end",
        RenderStage::Encoding => "encoding",
        RenderStage::Complete => "complete",
        RenderStage::Failed => "failed",
    };
    print!(
        "\r  Progress: {:.1}% ({}/{} segments, {:.1}s, {stage})        ",
        p.progress * 100.0,
        p.segments_done,
        p.total_segments,
        p.elapsed_secs,
    );
    let _ = std::io::stdout().flush();
}
