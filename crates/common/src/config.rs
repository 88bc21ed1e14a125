//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CliploomError, CliploomResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory where rendered clips are written by default.
    pub output_dir: PathBuf,

    /// Default render settings.
    pub render: RenderDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default render parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderDefaults {
    /// Paint ticks per second for the compositor loop.
    pub paint_hz: u32,

    /// Frames per second forwarded from the output surface to the encoder.
    pub capture_fps: u32,

    /// Poll interval while waiting for the audio end marker.
    pub audio_poll_ms: u64,

    /// How long each segment's first frame is held during preview.
    pub preview_step_ms: u64,

    /// Route the audio track to the local output device while rendering.
    pub monitor_audio: bool,

    /// Sample rate fed to the audio encoder.
    pub audio_sample_rate: u32,

    /// Channel count fed to the audio encoder.
    pub audio_channels: u32,

    /// Target video bitrate.
    pub video_bitrate_kbps: u32,

    /// Upper bound on waiting for the encoder to flush after end-of-stream.
    pub flush_timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "cliploom=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: dirs_default_output(),
            render: RenderDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            paint_hz: 60,
            capture_fps: 30,
            audio_poll_ms: 16,
            preview_step_ms: 500,
            monitor_audio: false,
            audio_sample_rate: 48000,
            audio_channels: 2,
            video_bitrate_kbps: 2500,
            flush_timeout_secs: 10,
        }
    }
}

impl RenderDefaults {
    /// Interval between compositor paint ticks.
    pub fn paint_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.paint_hz.max(1) as u64)
    }

    /// Interval between audio position polls.
    pub fn audio_poll_interval(&self) -> Duration {
        Duration::from_millis(self.audio_poll_ms.max(1))
    }

    /// Hold time per segment in preview mode.
    pub fn preview_step(&self) -> Duration {
        Duration::from_millis(self.preview_step_ms)
    }

    /// Maximum time to wait for the encoder flush.
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.flush_timeout_secs)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location.
    ///
    /// A missing file yields the defaults; an unreadable or malformed file is
    /// an error so the caller can report it once logging is up.
    pub fn load() -> CliploomResult<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path.
    pub fn load_from(path: &Path) -> CliploomResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliploomError::config(format!("Failed to read config at {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            CliploomError::config(format!("Failed to parse config at {}: {e}", path.display()))
        })
    }

    /// Standard config file location.
    pub fn path() -> PathBuf {
        config_file_path()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("cliploom").join("config.json")
}

/// Default output directory for rendered clips.
fn dirs_default_output() -> PathBuf {
    let base = std::env::var("XDG_VIDEOS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join("Videos")
        });
    base.join("cliploom")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paint_interval_from_hz() {
        let defaults = RenderDefaults::default();
        assert_eq!(defaults.paint_interval(), Duration::from_nanos(16_666_666));

        let zero = RenderDefaults {
            paint_hz: 0,
            ..RenderDefaults::default()
        };
        assert_eq!(zero.paint_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_from_reports_malformed_file() {
        let dir = std::env::temp_dir().join("cliploom_config_test");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let missing = AppConfig::load_from(&dir.join("absent.json")).unwrap();
        assert_eq!(missing.render.paint_hz, 60);

        let broken = dir.join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        let err = AppConfig::load_from(&broken).unwrap_err();
        assert!(matches!(err, CliploomError::Config { .. }));
        assert!(err.to_string().contains("broken.json"));

        let partial = dir.join("partial.json");
        std::fs::write(
            &partial,
            r#"{"output_dir": "/tmp/out", "render": {"capture_fps": 24}, "logging": {"level": "debug", "json": false, "file": null}}"#,
        )
        .unwrap();
        let config = AppConfig::load_from(&partial).unwrap();
        assert_eq!(config.render.capture_fps, 24);
        assert_eq!(config.logging.level, "debug");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_partial_render_section_uses_defaults() {
        let parsed: RenderDefaults = serde_json::from_str(r#"{"paint_hz": 30}"#).unwrap();
        assert_eq!(parsed.paint_hz, 30);
        assert_eq!(parsed.preview_step_ms, 500);
        assert_eq!(parsed.audio_sample_rate, 48000);
    }
}
