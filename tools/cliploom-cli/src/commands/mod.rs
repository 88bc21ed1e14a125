pub mod check;
pub mod config;
pub mod plan;
pub mod preview;
pub mod render;

use std::sync::Arc;

use cliploom_capture_engine::backend::{get_backend, MemoryEncoderBackend};
use cliploom_capture_engine::pipeline::EncoderBackend;
use cliploom_common::config::RenderDefaults;
use cliploom_render_engine::source::synthetic::SyntheticLoader;
use cliploom_render_engine::{get_loader, MediaLoader, Studio};
use cliploom_timeline_model::MediaHandle;
use tokio_util::sync::CancellationToken;

use crate::TimelineArgs;

/// Build a studio with the clips, timestamps and order from the command line.
pub async fn load_studio(config: &RenderDefaults, args: &TimelineArgs) -> anyhow::Result<Studio> {
    let (loader, encoder): (Arc<dyn MediaLoader>, Arc<dyn EncoderBackend>) = if args.dry_run {
        (
            Arc::new(SyntheticLoader::new()),
            Arc::new(MemoryEncoderBackend::new()),
        )
    } else {
        (get_loader(), get_backend(config))
    };
    tracing::debug!(loader = loader.name(), encoder = encoder.name(), "Media backends selected");

    let studio = Studio::new(loader, encoder, config.clone());
    let handles = args
        .videos
        .iter()
        .map(|path| MediaHandle::File { path: path.clone() })
        .collect();
    let videos = studio.set_videos(handles).await?;
    for (index, video) in videos.iter().enumerate() {
        println!(
            "  [{index}] {} ({:.2}s)",
            video.handle.describe(),
            video.natural_duration_secs
        );
    }

    studio.set_timestamps(args.timestamps.clone());
    if let Some(order) = &args.order {
        studio.set_order(order.clone())?;
    } else if args.shuffle {
        studio.shuffle();
    }
    Ok(studio)
}

/// A cancellation token that fires on Ctrl+C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!();
            println!("Cancelling...");
            trigger.cancel();
        }
    });
    cancel
}
