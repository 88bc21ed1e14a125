//! Error types shared across Cliploom crates.

use std::path::PathBuf;

/// Top-level error type for Cliploom operations.
#[derive(Debug, thiserror::Error)]
pub enum CliploomError {
    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("Audio error: {message}")]
    Audio { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error("Busy: {message}")]
    Busy { message: String },

    #[error("Render cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using CliploomError.
pub type CliploomResult<T> = Result<T, CliploomError>;

impl CliploomError {
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    pub fn audio(msg: impl Into<String>) -> Self {
        Self::Audio {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    pub fn busy(msg: impl Into<String>) -> Self {
        Self::Busy {
            message: msg.into(),
        }
    }

    /// Whether this error means the render was stopped on request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CliploomError::unsupported("capture unsupported: vp8enc missing");
        assert_eq!(
            err.to_string(),
            "Unsupported operation: capture unsupported: vp8enc missing"
        );
        assert_eq!(CliploomError::Cancelled.to_string(), "Render cancelled");
    }

    #[test]
    fn test_is_cancelled() {
        assert!(CliploomError::Cancelled.is_cancelled());
        assert!(!CliploomError::busy("render in progress").is_cancelled());
    }
}
