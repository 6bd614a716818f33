//! Error types for the whisker client

use thiserror::Error;

/// Result type alias for whisker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Sub-kinds of speech recognition failure
///
/// These map the recognizer's error events onto the retry policy in the
/// voice sessions: background modes auto-restart on `NoSpeech`/`Other`,
/// foreground modes do not, and `PermissionDenied` disables the mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    /// Microphone access was denied
    PermissionDenied,
    /// No speech was detected before the recognizer gave up
    NoSpeech,
    /// Capture was deliberately aborted during teardown
    Aborted,
    /// Any other recognizer failure
    Other(String),
}

impl std::fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "microphone access denied"),
            Self::NoSpeech => write!(f, "no speech detected"),
            Self::Aborted => write!(f, "capture aborted"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

/// Errors that can occur in the whisker client
#[derive(Debug, Error)]
pub enum Error {
    /// Non-success HTTP status or other transport-level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Speech recognition error
    #[error("recognition error: {0}")]
    Recognition(RecognitionErrorKind),

    /// Speech synthesis error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

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

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl Error {
    /// Whether this error is a transport failure (bad status or network)
    ///
    /// Sessions use this to pick the spoken apology path instead of
    /// tearing down.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Http(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(Error::Transport("status 500".to_string()).is_transport());
        assert!(!Error::Config("bad".to_string()).is_transport());
    }

    #[test]
    fn test_recognition_kind_display() {
        let err = Error::Recognition(RecognitionErrorKind::NoSpeech);
        assert_eq!(err.to_string(), "recognition error: no speech detected");
    }
}
