//! Speech capture boundary.

use crate::ui::console::{LineRead, LineSource};
use std::time::Duration;

/// Result of one bounded listening attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenOutcome {
    /// Recognized text.
    Command(String),
    /// Nothing was heard before the timeout.
    Timeout,
    /// Sound was heard but could not be recognized.
    Unintelligible,
    /// Microphone or recognition service failure.
    Error(String),
}

/// Blocking speech capture. Only ever called off the UI thread.
pub trait SpeechRecognizer: Send + Sync {
    fn listen(&self, timeout: Duration) -> ListenOutcome;
}

/// Treats typed lines as recognized speech.
#[derive(Clone)]
pub struct LineRecognizer {
    source: LineSource,
}

impl LineRecognizer {
    pub fn new(source: LineSource) -> Self {
        Self { source }
    }
}

impl SpeechRecognizer for LineRecognizer {
    fn listen(&self, timeout: Duration) -> ListenOutcome {
        match self.source.next_line(timeout) {
            LineRead::Line(line) if line.trim().is_empty() => ListenOutcome::Unintelligible,
            LineRead::Line(line) => ListenOutcome::Command(line.trim().to_owned()),
            LineRead::Timeout => ListenOutcome::Timeout,
            LineRead::Closed => ListenOutcome::Error("input stream closed".to_owned()),
        }
    }
}
