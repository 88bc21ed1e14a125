//! Render-time timeline plan.
//!
//! A timeline pairs order slot `i` with segment duration `i`. Whichever side
//! is longer has its surplus ignored.

use serde::{Deserialize, Serialize};

use crate::order::Order;
use crate::timestamps::SegmentDuration;

/// One planned segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Position in the timeline.
    pub slot: usize,

    /// Index into the video asset list.
    pub asset_index: usize,

    /// Target on-screen duration.
    pub duration: SegmentDuration,
}

impl TimelineEntry {
    /// Playback rate needed to fit a clip of the given natural length into
    /// this entry's duration.
    pub fn playback_rate(&self, natural_duration_secs: f64) -> Option<f64> {
        playback_rate(natural_duration_secs, self.duration.secs())
    }
}

/// The ordered list of segments a render will play.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub entries: Vec<TimelineEntry>,
}

impl Timeline {
    /// Pair the order with the durations, truncating to the shorter side.
    pub fn plan(order: &Order, durations: &[SegmentDuration]) -> Self {
        let entries = order
            .as_slice()
            .iter()
            .zip(durations.iter())
            .enumerate()
            .map(|(slot, (&asset_index, &duration))| TimelineEntry {
                slot,
                asset_index,
                duration,
            })
            .collect();
        Self { entries }
    }

    /// Number of segments that will be played.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the render would be a no-op.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all segment durations.
    pub fn total_secs(&self) -> f64 {
        self.entries.iter().map(|e| e.duration.secs()).sum()
    }

    /// Entries whose duration cannot be played (zero, negative, or non-finite).
    pub fn degenerate_entries(&self) -> impl Iterator<Item = &TimelineEntry> {
        self.entries.iter().filter(|e| !e.duration.is_playable())
    }
}

/// `natural / target`: above 1.0 speeds the clip up, below 1.0 slows it down.
///
/// Returns `None` when the target is not a positive finite length or the
/// natural duration is unknown.
pub fn playback_rate(natural_duration_secs: f64, target_secs: f64) -> Option<f64> {
    if !(target_secs.is_finite() && target_secs > 0.0) {
        return None;
    }
    if !(natural_duration_secs.is_finite() && natural_duration_secs > 0.0) {
        return None;
    }
    Some(natural_duration_secs / target_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamps::derive_durations;

    #[test]
    fn test_playback_rate() {
        assert_eq!(playback_rate(10.0, 5.0), Some(2.0));
        assert_eq!(playback_rate(10.0, 20.0), Some(0.5));
        assert_eq!(playback_rate(10.0, 0.0), None);
        assert_eq!(playback_rate(10.0, -1.0), None);
        assert_eq!(playback_rate(0.0, 3.0), None);
    }

    #[test]
    fn test_plan_truncates_to_shorter_side() {
        let order = Order::initialize(2);
        let durations = derive_durations("1,2,3");
        let timeline = Timeline::plan(&order, &durations);
        assert_eq!(timeline.len(), 2);
        assert!((timeline.total_secs() - 2.0).abs() < 1e-9);

        let order = Order::initialize(5);
        let timeline = Timeline::plan(&order, &durations);
        assert_eq!(timeline.len(), 3);
        assert!((timeline.total_secs() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_plan_follows_order() {
        let order = Order::from_permutation(vec![2, 0, 1]).unwrap();
        let timeline = Timeline::plan(&order, &derive_durations("1,2,3"));
        let assets: Vec<usize> = timeline.entries.iter().map(|e| e.asset_index).collect();
        assert_eq!(assets, vec![2, 0, 1]);
        let slots: Vec<usize> = timeline.entries.iter().map(|e| e.slot).collect();
        assert_eq!(slots, vec![0, 1, 2]);
    }

    #[test]
    fn test_empty_durations_give_empty_plan() {
        let timeline = Timeline::plan(&Order::initialize(4), &derive_durations(""));
        assert!(timeline.is_empty());
        assert_eq!(timeline.total_secs(), 0.0);
    }

    #[test]
    fn test_degenerate_entries() {
        let timeline = Timeline::plan(&Order::initialize(3), &derive_durations("2,2,5"));
        let degenerate: Vec<usize> = timeline.degenerate_entries().map(|e| e.slot).collect();
        assert_eq!(degenerate, vec![1]);
        assert_eq!(timeline.entries[2].playback_rate(6.0), Some(2.0));
    }
}
