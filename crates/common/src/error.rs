//! Error types shared across Loopforge crates.

use std::path::PathBuf;

/// Top-level error type for export operations.
///
/// Only conditions that abort an export are represented here. Recoverable
/// acquisition problems (a skipped frame, an unreachable media source, a seek
/// that never reported completion) are absorbed by the capture loop and show
/// up in its statistics instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Export cancelled")]
    Cancelled,

    #[error("Encoder error: {message}")]
    Encoder { message: String },

    #[error("No frames were acquired: {message}")]
    NoFrames { message: String },

    #[error("Invalid export settings: {message}")]
    InvalidSettings { message: String },

    #[error("Fetch error for {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder {
            message: msg.into(),
        }
    }

    pub fn no_frames(msg: impl Into<String>) -> Self {
        Self::NoFrames {
            message: msg.into(),
        }
    }

    pub fn invalid_settings(msg: impl Into<String>) -> Self {
        Self::InvalidSettings {
            message: msg.into(),
        }
    }

    pub fn fetch(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            message: msg.into(),
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Stable machine-readable code for callers that branch on failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::Encoder { .. } => "encoder_failed",
            Self::NoFrames { .. } => "no_frames",
            Self::InvalidSettings { .. } => "invalid_settings",
            Self::Fetch { .. } => "fetch_failed",
            Self::Decode { .. } => "decode_failed",
            Self::Config { .. } => "config_invalid",
            Self::FileNotFound { .. } => "file_not_found",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Other(_) => "other",
        }
    }

    /// Whether the error was caused by the caller tripping a cancel flag.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(EngineError::Cancelled.code(), "cancelled");
        assert_eq!(EngineError::encoder("boom").code(), "encoder_failed");
        assert_eq!(EngineError::no_frames("empty").code(), "no_frames");
    }

    #[test]
    fn test_error_display_includes_message() {
        let err = EngineError::fetch("https://cdn.example/a.mp4", "blocked");
        assert_eq!(
            err.to_string(),
            "Fetch error for https://cdn.example/a.mp4: blocked"
        );
        assert!(!err.is_cancelled());
        assert!(EngineError::Cancelled.is_cancelled());
    }
}
