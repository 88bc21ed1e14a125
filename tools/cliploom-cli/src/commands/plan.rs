//! Print the durations and playback rates a timestamp list produces.

use cliploom_timeline_model::{derive_durations, playback_rate};
use serde_json::json;

pub fn run(timestamps: &str, natural: Option<Vec<f64>>, json: bool) -> anyhow::Result<()> {
    let durations = derive_durations(timestamps);
    let natural = natural.unwrap_or_default();

    let rows: Vec<_> = durations
        .iter()
        .enumerate()
        .map(|(slot, duration)| {
            let clip = natural.get(slot).copied();
            let rate = clip.and_then(|n| playback_rate(n, duration.secs()));
            (slot, duration.secs(), duration.is_playable(), clip, rate)
        })
        .collect();

    if json {
        let entries: Vec<_> = rows
            .iter()
            .map(|&(slot, secs, playable, clip, rate)| {
                json!({
                    "slot": slot,
                    "duration_secs": secs,
                    "playable": playable,
                    "natural_secs": clip,
                    "playback_rate": rate,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No valid timestamps: a render would be a no-op.");
        return Ok(());
    }

    println!("Segments:");
    for (slot, secs, playable, clip, rate) in &rows {
        let mut line = format!("  [{slot}] {secs:.2}s");
        if let (Some(clip), Some(rate)) = (clip, rate) {
            line.push_str(&format!("  clip {clip:.2}s -> rate {rate:.3}x"));
        }
        if !playable {
            line.push_str("  (skipped: duration is not positive)");
        }
        println!("{line}");
    }
    let total: f64 = rows
        .iter()
        .filter(|row| row.2)
        .map(|row| row.1)
        .sum();
    println!("Total: {total:.2}s");
    if natural.len() > rows.len() {
        println!(
            "Note: {} clip(s) have no timestamp and will not play.",
            natural.len() - rows.len()
        );
    }
    Ok(())
}
