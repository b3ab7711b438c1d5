//! Narrator: spoken audio descriptions of images, video and live camera
//! frames, driven by voice commands or buttons.
//!
//! This crate holds the coordination core:
//! UI queue ← worker tasks ← busy gate ← voice loop → speech output
//!
//! # Architecture
//!
//! - **UI queue**: workers never touch the surface; they post closures that
//!   the UI thread drains in FIFO order
//! - **Busy gate**: at most one foreground task runs at a time
//! - **Speech**: one utterance at a time, interruptible from any thread
//! - **Voice loop**: one prompt → listen → classify → dispatch pass. Retries,
//!   refusals and voice-triggered tasks re-arm it; exit and UI-triggered
//!   tasks leave it dormant
//! - **Tasks**: image, video and live-capture narration on worker threads
//! - **Resource cache**: model resources built once and shared

pub mod cache;
pub mod cancel;
pub mod capture;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod gate;
pub mod narration;
pub mod settings;
pub mod speech;
pub mod task;
pub mod ui;
pub mod voice;

pub use cache::ResourceCache;
pub use cancel::CancelToken;
pub use config::NarratorConfig;
pub use controller::{Controller, ControllerParts};
pub use error::{NarratorError, Result};
pub use events::{CoreEvent, EventSink, PreloadStatus, RejectReason};
pub use gate::{BusyGate, BusyTicket, TaskKind, TaskOrigin, TaskState};
pub use speech::{SpeechController, SpeechOutcome};
pub use task::{TaskOutput, TaskRunner};
pub use ui::{UiLoop, UiQueue, UiSurface, UiUpdater, ui_channel};
