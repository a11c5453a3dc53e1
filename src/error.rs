//! Error types for VisionPal

use thiserror::Error;

/// Result type alias for VisionPal operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in VisionPal
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or placeholder credential, unusable configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Camera or microphone busy or absent
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Camera is open but a frame could not be grabbed
    #[error("capture failed: {0}")]
    Capture(String),

    /// Speech recognition failed
    #[error("recognition error: {0}")]
    Recognition(#[from] RecognitionError),

    /// Vision description request failed
    #[error("service error: {0}")]
    Service(String),

    /// Audio device or decoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// File picker error
    #[error("picker error: {0}")]
    Picker(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML writing error
    #[error("toml error: {0}")]
    TomlWrite(#[from] toml::ser::Error),
}

impl Error {
    /// Whether the error must abort startup or the action that needs it
    ///
    /// Only configuration and credential problems are fatal; everything else
    /// is recovered by resetting the session or continuing to listen.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Distinguishable speech recognition failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecognitionError {
    /// No speech started before the listen timeout
    #[error("no speech before timeout")]
    Timeout,

    /// Speech was captured but produced no transcript
    #[error("speech not understood")]
    Unintelligible,

    /// Microphone or recognition service unavailable
    #[error("recognition service unavailable: {0}")]
    ServiceUnavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_config_errors_are_fatal() {
        assert!(Error::Config("missing key".to_string()).is_fatal());
        assert!(!Error::DeviceUnavailable("camera 0".to_string()).is_fatal());
        assert!(!Error::Service("timeout".to_string()).is_fatal());
        assert!(!Error::Recognition(RecognitionError::Timeout).is_fatal());
    }

    #[test]
    fn recognition_error_converts() {
        let err: Error = RecognitionError::Unintelligible.into();
        assert!(matches!(
            err,
            Error::Recognition(RecognitionError::Unintelligible)
        ));
    }
}
