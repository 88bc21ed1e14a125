//! The finished clip handed back to the caller.

use std::path::Path;

use cliploom_common::error::CliploomResult;
use serde::{Deserialize, Serialize};

/// Container/codec pairing of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerFormat {
    /// WebM with VP8 video and Opus audio.
    Webm,
    /// Uncompressed record stream written by the in-memory encoder.
    RawDump,
}

impl ContainerFormat {
    /// MIME type for playback or download.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Webm => "video/webm",
            Self::RawDump => "application/x-cliploom-dump",
        }
    }

    /// Conventional file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Webm => "webm",
            Self::RawDump => "cldump",
        }
    }
}

/// How one timeline segment was played into the capture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentSummary {
    pub slot: usize,
    pub asset_index: usize,
    pub target_secs: f64,
    pub playback_rate: f64,
    pub elapsed_secs: f64,
    pub frames_painted: u64,

    /// The segment had no playable duration and was not shown.
    pub skipped: bool,
}

/// Summary of what went into an artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureSummary {
    /// Timeline segments that were played.
    pub segments_rendered: usize,

    /// Per-segment playback, in timeline order.
    #[serde(default)]
    pub segments: Vec<SegmentSummary>,

    /// Frames forwarded to the encoder.
    pub video_frames: u64,

    /// Audio blocks forwarded to the encoder.
    pub audio_blocks: u64,

    /// Wall-clock length of the capture.
    pub duration_secs: f64,
}

/// One encoded audio+video clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Container/codec pairing of `bytes`.
    pub container: ContainerFormat,

    /// Whether an audio track was captured.
    pub has_audio: bool,

    /// Number of encoder chunks concatenated into `bytes`.
    pub chunk_count: usize,

    /// Wall-clock time the capture started (RFC 3339).
    pub started_at: String,

    /// What went into the clip.
    pub summary: CaptureSummary,

    /// The encoded clip.
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl Artifact {
    /// Size of the encoded clip.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the encoder produced nothing.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// MIME type of the clip.
    pub fn mime_type(&self) -> &'static str {
        self.container.mime_type()
    }

    /// Write the clip to disk, creating parent directories as needed.
    pub fn write_to(&self, path: &Path) -> CliploomResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, &self.bytes)?;
        tracing::info!(
            path = %path.display(),
            bytes = self.bytes.len(),
            mime = self.mime_type(),
            "Wrote artifact"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_metadata() {
        assert_eq!(ContainerFormat::Webm.mime_type(), "video/webm");
        assert_eq!(ContainerFormat::Webm.extension(), "webm");
        assert_eq!(ContainerFormat::RawDump.extension(), "cldump");
    }

    #[test]
    fn test_write_to_creates_parents() {
        let dir = std::env::temp_dir().join("cliploom_artifact_test");
        let _ = std::fs::remove_dir_all(&dir);
        let artifact = Artifact {
            container: ContainerFormat::RawDump,
            has_audio: false,
            chunk_count: 1,
            started_at: "2024-01-01T00:00:00Z".to_string(),
            summary: CaptureSummary::default(),
            bytes: vec![1, 2, 3],
        };
        let path = dir.join("nested").join("out.cldump");
        artifact.write_to(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
