//! Coordination events emitted by the core for UI and observability.
//!
//! Lightweight and cloneable so they can be emitted from any thread
//! without blocking the caller.

use crate::gate::{TaskKind, TaskOrigin};
use crate::voice::pass::PassOutcome;
use std::sync::Arc;
use std::time::Duration;

/// Why a task trigger did not start a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Another task holds the busy gate.
    Busy,
    /// Model resources are still being preloaded.
    ModelsLoading,
    /// The user cancelled the input dialog or gave empty input.
    NoInput,
    /// The worker thread could not be spawned.
    SpawnFailed,
}

/// Progress of the startup resource preload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PreloadStatus {
    #[default]
    NotStarted,
    Loading,
    Ready,
    /// Preload failed with the given description.
    Failed(String),
}

/// Something the coordination core did.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    /// A task acquired the busy gate and its worker was spawned.
    TaskStarted { kind: TaskKind, origin: TaskOrigin },
    /// A trigger refused to start a task.
    TaskRejected { kind: TaskKind, reason: RejectReason },
    /// A task's epilogue ran.
    TaskFinished {
        kind: TaskKind,
        origin: TaskOrigin,
        success: bool,
    },
    /// A new voice pass was armed to start after `delay`.
    VoiceLoopArmed { delay: Duration },
    /// A voice pass terminated.
    VoicePassEnded { outcome: PassOutcome },
    /// An utterance began (synthesis requested).
    SpeechStarted { text: String },
    /// `interrupt_current` ran; `was_playing` tells whether anything stopped.
    SpeechInterrupted { was_playing: bool },
    /// Preload status changed.
    PreloadChanged { status: PreloadStatus },
}

/// Callback type for receiving core events.
pub type EventCallback = Box<dyn Fn(CoreEvent) + Send + Sync>;

/// Shared, optional event sink.
#[derive(Clone, Default)]
pub struct EventSink {
    callback: Option<Arc<EventCallback>>,
}

impl EventSink {
    pub fn new(callback: EventCallback) -> Self {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    /// A sink that drops everything.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: CoreEvent) {
        if let Some(callback) = &self.callback {
            callback(event);
        }
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("attached", &self.callback.is_some())
            .finish()
    }
}
