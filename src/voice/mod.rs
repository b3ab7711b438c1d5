//! Voice command loop: recognition boundary, intent classification, and
//! the single-shot pass state machine.

pub mod intent;
pub mod pass;
pub mod recognizer;

pub use intent::{CommandClassifier, Intent, KeywordClassifier};
pub use pass::{PassOutcome, PassState, RetryReason, VoiceHost, VoicePass};
pub use recognizer::{LineRecognizer, ListenOutcome, SpeechRecognizer};
