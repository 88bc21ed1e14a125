//! Media asset descriptors.
//!
//! An asset is immutable once loaded: probing fills in its natural duration
//! and, for video, its natural pixel dimensions.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Stable identifier of a loaded asset within one studio session.
pub type AssetId = u64;

/// Whether an asset carries picture or sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Video,
    Audio,
}

/// Opaque decodable source behind an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaHandle {
    /// A media file on disk.
    File { path: PathBuf },

    /// A generated source (test patterns and tones), used by dry runs.
    Synthetic {
        /// Seed for the generated pattern or tone pitch.
        seed: u64,
    },
}

impl MediaHandle {
    /// Human-readable description for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::File { path } => path.display().to_string(),
            Self::Synthetic { seed } => format!("synthetic:{seed}"),
        }
    }
}

/// A loaded video or audio asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAsset {
    /// Identifier assigned by the studio.
    pub id: AssetId,

    /// Picture or sound.
    pub kind: AssetKind,

    /// Where the decodable data lives.
    pub handle: MediaHandle,

    /// Natural (unwarped) duration of the asset.
    pub natural_duration_secs: f64,

    /// Natural width in pixels (video only).
    pub width: Option<u32>,

    /// Natural height in pixels (video only).
    pub height: Option<u32>,
}

impl MediaAsset {
    /// Describe a video asset.
    pub fn video(
        id: AssetId,
        handle: MediaHandle,
        natural_duration_secs: f64,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            id,
            kind: AssetKind::Video,
            handle,
            natural_duration_secs,
            width: Some(width),
            height: Some(height),
        }
    }

    /// Describe an audio asset.
    pub fn audio(id: AssetId, handle: MediaHandle, natural_duration_secs: f64) -> Self {
        Self {
            id,
            kind: AssetKind::Audio,
            handle,
            natural_duration_secs,
            width: None,
            height: None,
        }
    }

    /// Natural dimensions, when known.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        Some((self.width?, self.height?))
    }
}
