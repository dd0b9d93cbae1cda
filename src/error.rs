//! Error handling for Tracklab
//!
//! Decode and encode failures are fatal to a run and propagate unmodified to
//! the caller. A missing drum loop is not an error (see `dsp::mixer`).

use thiserror::Error;

/// Result type alias for Tracklab operations
pub type Result<T> = std::result::Result<T, TracklabError>;

/// Main error type for Tracklab operations
#[derive(Error, Debug)]
pub enum TracklabError {
    // Decode Errors
    #[error("File not found: {path}")]
    FileNotFound {
        path: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Failed to decode audio: {reason}")]
    Decode {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    // Encode Errors
    #[error("Failed to encode audio: {reason}")]
    Encode {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("External encoder '{program}' is not available")]
    EncoderUnavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },

    // Parameter / Configuration Errors
    #[error("Invalid parameter '{param}': {value} (expected {expected})")]
    InvalidParameter {
        param: String,
        value: String,
        expected: String,
    },

    #[error("Configuration error: {reason}")]
    Config { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TracklabError {
    /// Build a decode error from any underlying error
    pub(crate) fn decode<E>(reason: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        TracklabError::Decode {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Build an encode error from any underlying error
    pub(crate) fn encode<E>(reason: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        TracklabError::Encode {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            TracklabError::FileNotFound { .. } => "FILE_NOT_FOUND",
            TracklabError::Decode { .. } => "DECODE_ERROR",
            TracklabError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            TracklabError::Encode { .. } => "ENCODE_ERROR",
            TracklabError::EncoderUnavailable { .. } => "ENCODER_UNAVAILABLE",
            TracklabError::InvalidParameter { .. } => "INVALID_PARAMETER",
            TracklabError::Config { .. } => "CONFIG_ERROR",
            TracklabError::Io(_) => "IO_ERROR",
            TracklabError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// True for failures raised while reading input audio
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            TracklabError::FileNotFound { .. }
                | TracklabError::Decode { .. }
                | TracklabError::UnsupportedFormat { .. }
        )
    }

    /// True for failures raised while exporting the result
    pub fn is_encode_error(&self) -> bool {
        matches!(
            self,
            TracklabError::Encode { .. } | TracklabError::EncoderUnavailable { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            TracklabError::FileNotFound { .. } => vec![
                "Check the file path is correct",
                "Verify the upload hasn't been moved or deleted",
            ],
            TracklabError::Decode { .. } => vec![
                "Check if the file plays in another application",
                "The file may be corrupted - try re-exporting from source",
            ],
            TracklabError::UnsupportedFormat { .. } => vec![
                "Convert to WAV, FLAC or MP3 first",
                "Supported formats: WAV, FLAC, MP3, OGG",
            ],
            TracklabError::EncoderUnavailable { .. } => vec![
                "Install ffmpeg and make sure it is on PATH",
                "Set TRACKLAB_MP3_ENCODER to the encoder binary",
                "Export as WAV instead",
            ],
            TracklabError::Encode { .. } => vec![
                "Check there is free disk space at the output location",
                "Check the output directory is writable",
            ],
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = TracklabError::FileNotFound {
            path: "track.wav".to_string(),
            source: None,
        };
        assert_eq!(err.error_code(), "FILE_NOT_FOUND");
        assert!(err.is_decode_error());
        assert!(!err.is_encode_error());
    }

    #[test]
    fn test_encoder_unavailable_is_encode_error() {
        let err = TracklabError::EncoderUnavailable {
            program: "ffmpeg".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.is_encode_error());
        assert!(!err.recovery_suggestions().is_empty());
        assert!(err.to_string().contains("ffmpeg"));
    }
}
