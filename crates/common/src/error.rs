//! Error types shared across fitoverlay crates.

use std::path::PathBuf;

/// Top-level error type for fitoverlay operations.
///
/// Every variant is fatal to the job that raised it. The variants map onto
/// the pipeline stages so callers can publish a precise status message.
#[derive(Debug, thiserror::Error)]
pub enum FitoverlayError {
    #[error("Track parse error: {message}")]
    Parse { message: String },

    #[error("Alignment error: {message}")]
    Alignment { message: String },

    #[error("Render error at frame {frame}: {message}")]
    Render { frame: u64, message: String },

    #[error("Encoding error: {message}")]
    Encoding { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Job cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using FitoverlayError.
pub type FitoverlayResult<T> = Result<T, FitoverlayError>;

impl FitoverlayError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    pub fn alignment(msg: impl Into<String>) -> Self {
        Self::Alignment {
            message: msg.into(),
        }
    }

    pub fn render(frame: u64, msg: impl Into<String>) -> Self {
        Self::Render {
            frame,
            message: msg.into(),
        }
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Pipeline stage that produced this error.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse",
            Self::Alignment { .. } => "align",
            Self::Render { .. } => "render",
            Self::Encoding { .. } => "encode",
            Self::Config { .. } => "config",
            Self::FileNotFound { .. } | Self::Io(_) => "io",
            Self::Cancelled => "cancelled",
            Self::Json(_) | Self::Other(_) => "internal",
        }
    }

    /// Frame index for per-frame failures.
    pub fn frame_index(&self) -> Option<u64> {
        match self {
            Self::Render { frame, .. } => Some(*frame),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_error_carries_frame() {
        let err = FitoverlayError::render(42, "blend failed");
        assert_eq!(err.stage(), "render");
        assert_eq!(err.frame_index(), Some(42));
        assert_eq!(err.to_string(), "Render error at frame 42: blend failed");
    }

    #[test]
    fn test_io_errors_map_to_io_stage() {
        let err: FitoverlayError = std::io::Error::other("disk full").into();
        assert_eq!(err.stage(), "io");
        assert_eq!(err.frame_index(), None);

        let missing = FitoverlayError::FileNotFound {
            path: PathBuf::from("/nope.fit"),
        };
        assert_eq!(missing.stage(), "io");
    }
}
