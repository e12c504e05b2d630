//! Error types shared across Naya crates.

/// Top-level error type for Naya operations.
#[derive(Debug, thiserror::Error)]
pub enum NayaError {
    #[error("Invalid surface: {message}")]
    InvalidSurface { message: String },

    #[error("Recording produced no data: the surface never rendered a frame")]
    EmptyRecording,

    #[error("Codec unsupported: {message}")]
    CodecUnsupported { message: String },

    #[error("Clip referenced by the timeline is missing: {id}")]
    MissingClip { id: String },

    #[error("Export produced no data")]
    EmptyExport,

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Clip not found: {id}")]
    NotFound { id: String },

    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Codec error: {message}")]
    Codec { message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using NayaError.
pub type NayaResult<T> = Result<T, NayaError>;

/// Fieldless discriminant of [`NayaError`], for callers that only branch on kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidSurface,
    EmptyRecording,
    CodecUnsupported,
    MissingClip,
    EmptyExport,
    Storage,
    NotFound,
    Capture,
    Render,
    Codec,
    Cancelled,
    Config,
    Io,
    Json,
    Other,
}

impl ErrorKind {
    /// Whether the caller may reasonably retry after fixing its inputs
    /// (restarting the surface, freeing disk space).
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidSurface | ErrorKind::EmptyRecording | ErrorKind::Storage
        )
    }
}

impl NayaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSurface { .. } => ErrorKind::InvalidSurface,
            Self::EmptyRecording => ErrorKind::EmptyRecording,
            Self::CodecUnsupported { .. } => ErrorKind::CodecUnsupported,
            Self::MissingClip { .. } => ErrorKind::MissingClip,
            Self::EmptyExport => ErrorKind::EmptyExport,
            Self::Storage { .. } => ErrorKind::Storage,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Capture { .. } => ErrorKind::Capture,
            Self::Render { .. } => ErrorKind::Render,
            Self::Codec { .. } => ErrorKind::Codec,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Config { .. } => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
            Self::Json(_) => ErrorKind::Json,
            Self::Other(_) => ErrorKind::Other,
        }
    }

    pub fn invalid_surface(msg: impl Into<String>) -> Self {
        Self::InvalidSurface {
            message: msg.into(),
        }
    }

    pub fn codec_unsupported(msg: impl Into<String>) -> Self {
        Self::CodecUnsupported {
            message: msg.into(),
        }
    }

    pub fn missing_clip(id: impl Into<String>) -> Self {
        Self::MissingClip { id: id.into() }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage {
            message: msg.into(),
        }
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

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

    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(NayaError::EmptyExport.kind(), ErrorKind::EmptyExport);
        assert_eq!(NayaError::not_found("clip_1").kind(), ErrorKind::NotFound);
        assert_eq!(
            NayaError::missing_clip("clip_2").kind(),
            ErrorKind::MissingClip
        );
        let io = NayaError::from(std::io::Error::other("disk"));
        assert_eq!(io.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::InvalidSurface.is_retryable());
        assert!(ErrorKind::EmptyRecording.is_retryable());
        assert!(!ErrorKind::MissingClip.is_retryable());
        assert!(!ErrorKind::CodecUnsupported.is_retryable());
    }

    #[test]
    fn test_display_includes_id() {
        let err = NayaError::missing_clip("clip_abc");
        assert!(err.to_string().contains("clip_abc"));
    }
}
