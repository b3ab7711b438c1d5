//! Error types for the narrator coordination core.

/// Top-level error type for the narrator.
#[derive(Debug, thiserror::Error)]
pub enum NarratorError {
    /// Missing or invalid configuration (model directory, credential file).
    ///
    /// Surfaced once and never retried; the dependent action stays blocked
    /// until the configuration is fixed.
    #[error("config error: {0}")]
    Config(String),

    /// Speech synthesis or playback failure.
    #[error("speech error: {0}")]
    Speech(String),

    /// Speech recognition failure (microphone or recognition service).
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Network failure while talking to a remote service.
    #[error("transport error: {0}")]
    Transport(String),

    /// Narration engine failure (missing image, model failure, bad output).
    #[error("narration error: {0}")]
    Narration(String),

    /// Camera capture failure.
    #[error("capture error: {0}")]
    Capture(String),

    /// The operation was cancelled before it finished.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// UI thread is gone or refused the request.
    #[error("ui error: {0}")]
    Ui(String),

    /// Persisted settings could not be read or written.
    #[error("settings error: {0}")]
    Settings(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NarratorError {
    /// Returns `true` for errors that retrying cannot fix without user action.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns `true` for network/timeout style failures.
    ///
    /// These fail the enclosing task but are never retried automatically;
    /// the user re-triggers the action.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Recognition(_))
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, NarratorError>;
