use std::sync::Arc;

use cliploom_capture_engine::backend::memory::MemoryEncoderBackend;
use cliploom_common::config::RenderDefaults;
use cliploom_render_engine::source::synthetic::SyntheticLoader;
use cliploom_render_engine::Studio;
use cliploom_timeline_model::MediaHandle;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn studio_with(clips: u64) -> Studio {
    let studio = Studio::new(
        Arc::new(SyntheticLoader::new()),
        Arc::new(MemoryEncoderBackend::new()),
        RenderDefaults::default(),
    );
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("test runtime");
    runtime
        .block_on(studio.set_videos((0..clips).map(|seed| MediaHandle::Synthetic { seed }).collect()))
        .expect("synthetic videos load");
    studio
}

proptest! {
    #[test]
    fn shuffled_plan_pairs_each_slot_with_its_duration(
        clips in 1u64..8,
        cuts in prop::collection::vec(0.1f64..5.0, 0..10),
        seed in any::<u64>(),
    ) {
        let studio = studio_with(clips);
        let mut position = 0.0;
        let raw: Vec<String> = cuts
            .iter()
            .map(|step| {
                position += step;
                format!("{position:.3}")
            })
            .collect();
        studio.set_timestamps(raw.join(", "));

        let order = studio.shuffle_with(&mut StdRng::seed_from_u64(seed));
        let mut sorted = order.clone();
        sorted.sort_unstable();
        prop_assert_eq!(sorted, (0..clips as usize).collect::<Vec<_>>());

        let durations = studio.durations();
        let plan = studio.plan();
        prop_assert_eq!(plan.len(), durations.len().min(clips as usize));
        for entry in &plan.entries {
            prop_assert_eq!(entry.asset_index, order[entry.slot]);
            prop_assert_eq!(entry.duration, durations[entry.slot]);
            prop_assert!(entry.duration.is_playable());
        }
    }

    #[test]
    fn plan_total_matches_last_cut_when_every_slot_plays(
        cuts in prop::collection::vec(0.1f64..5.0, 1..6),
    ) {
        let studio = studio_with(cuts.len() as u64);
        let mut position = 0.0;
        let mut raw = Vec::new();
        for step in &cuts {
            position += step;
            raw.push(format!("{position:.3}"));
        }
        studio.set_timestamps(raw.join(","));

        let last: f64 = raw.last().and_then(|s| s.parse().ok()).unwrap_or(0.0);
        prop_assert!((studio.plan().total_secs() - last).abs() < 1e-6);
    }
}
