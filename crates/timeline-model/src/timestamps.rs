//! Timestamp lists and segment duration derivation.
//!
//! Users mark cut points as free text (`"1, 2.5, 4"`). Each cut point closes
//! one segment, so the first segment lasts until the first timestamp and each
//! later segment lasts from the previous timestamp to its own.
//!
//! Parsing is permissive: tokens that do not start with a number are dropped
//! without complaint, and the survivors keep their relative order.

use serde::{Deserialize, Serialize};

/// Raw comma-separated timestamp text as entered by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampList {
    raw: String,
}

impl TimestampList {
    /// Wrap raw user text.
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// The text exactly as entered.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Replace the text.
    pub fn set(&mut self, raw: impl Into<String>) {
        self.raw = raw.into();
    }

    /// Append a playback position as a new cut point, formatted to
    /// hundredths of a second.
    pub fn push_position(&mut self, position_secs: f64) {
        if !self.raw.is_empty() {
            self.raw.push(',');
        }
        self.raw.push_str(&format!("{position_secs:.2}"));
    }

    /// Per-segment target durations derived from the valid timestamps.
    pub fn durations(&self) -> Vec<SegmentDuration> {
        derive_durations(&self.raw)
    }
}

/// Target length of one timeline segment, in seconds.
///
/// Values are not guaranteed positive: a non-increasing pair of timestamps
/// yields a zero or negative duration.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentDuration(pub f64);

impl SegmentDuration {
    /// Length in seconds.
    pub fn secs(self) -> f64 {
        self.0
    }

    /// Whether the segment can be played at all.
    pub fn is_playable(self) -> bool {
        self.0.is_finite() && self.0 > 0.0
    }
}

/// Split, trim and parse a comma-separated timestamp list.
///
/// Tokens are parsed by their leading numeric prefix (`"4s"` reads as `4`);
/// tokens without one, empty tokens and non-finite values are dropped.
pub fn parse_timestamps(raw: &str) -> Vec<f64> {
    raw.split(',')
        .filter_map(|token| parse_leading_float(token.trim()))
        .filter(|value| value.is_finite())
        .collect()
}

/// Derive segment durations from a raw timestamp list.
///
/// The first duration is the first timestamp itself; every later duration is
/// the delta to the immediately preceding valid timestamp.
pub fn derive_durations(raw: &str) -> Vec<SegmentDuration> {
    durations_from_timestamps(&parse_timestamps(raw))
}

/// Derive segment durations from already-parsed timestamps.
pub fn durations_from_timestamps(timestamps: &[f64]) -> Vec<SegmentDuration> {
    let mut previous: Option<f64> = None;
    timestamps
        .iter()
        .map(|&ts| {
            let duration = match previous {
                None => ts,
                Some(prev) => ts - prev,
            };
            previous = Some(ts);
            SegmentDuration(duration)
        })
        .collect()
}

/// Parse the longest prefix of `token` that forms a decimal float literal.
fn parse_leading_float(token: &str) -> Option<f64> {
    let bytes = token.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        end = frac_end;
    }

    if digits == 0 {
        return None;
    }

    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    token[..end].parse::<f64>().ok()
}
