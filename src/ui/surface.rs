//! The UI-owned surface that queued updates are applied to.

use crate::narration::{ImageRequest, NarrationResult, VideoRequest};
use std::path::Path;

/// Everything the coordination core may change or ask of the UI.
///
/// Implementations are owned by the UI thread and are never touched from
/// a worker; workers reach them only through [`super::UiUpdater::post`].
/// The `request_*` methods may block the UI thread (they stand in for
/// modal dialogs).
pub trait UiSurface {
    /// Append a line to the log pane.
    fn append_log(&mut self, line: &str);

    /// Replace the status bar text.
    fn set_status(&mut self, text: &str);

    /// Enter or leave the busy look: competing action controls disabled and
    /// an indeterminate progress indicator running while `busy` is true.
    fn set_busy(&mut self, busy: bool);

    /// Clear previous log, narration, and preview output.
    fn clear_outputs(&mut self);

    /// Show an image preview with its narration text.
    fn show_narration(&mut self, result: &NarrationResult);

    /// Show (play) a narrated video.
    fn show_video(&mut self, path: &Path);

    /// Ask the user for an image and a description. `None` on cancel.
    fn request_image(&mut self) -> Option<ImageRequest>;

    /// Ask the user for a video and a summary. `None` on cancel.
    fn request_video(&mut self) -> Option<VideoRequest>;

    /// Ask the user to describe the photo about to be captured.
    fn request_capture_description(&mut self) -> Option<String>;

    /// Begin application shutdown.
    fn request_shutdown(&mut self);

    /// Whether the UI has been torn down.
    fn is_closed(&self) -> bool;
}
