//! Terminal stand-in for the desktop window.
//!
//! Standard input feeds two consumers: plain lines are treated as
//! recognized speech (see [`crate::voice::recognizer::LineRecognizer`]) or
//! as answers to dialog prompts, and lines starting with `:` act as button
//! presses (`:image`, `:quit`, ...) routed to the UI thread.

use super::surface::UiSurface;
use crate::narration::{ImageRequest, NarrationResult, VideoRequest};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// How long a dialog prompt waits for an answer.
const DIALOG_TIMEOUT: Duration = Duration::from_secs(120);

const BUTTON_PREFIX: char = ':';

/// Result of waiting for one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    Line(String),
    Timeout,
    Closed,
}

/// Shared reader end of the typed-input stream.
#[derive(Clone)]
pub struct LineSource {
    rx: Receiver<String>,
}

impl LineSource {
    /// Create a source plus the sender that feeds it.
    pub fn channel() -> (Sender<String>, Self) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (tx, Self { rx })
    }

    /// Wait up to `timeout` for the next line.
    pub fn next_line(&self, timeout: Duration) -> LineRead {
        match self.rx.recv_timeout(timeout) {
            Ok(line) => LineRead::Line(line),
            Err(RecvTimeoutError::Timeout) => LineRead::Timeout,
            Err(RecvTimeoutError::Disconnected) => LineRead::Closed,
        }
    }
}

/// Spawn the stdin reader thread.
///
/// Lines beginning with `:` go to `on_button` (without the colon); all other
/// lines are forwarded to `lines`. At end of input the sender is dropped,
/// closing the [`LineSource`], and `on_button("quit")` is called.
pub fn spawn_stdin_reader<F>(lines: Sender<String>, on_button: F) -> std::io::Result<()>
where
    F: Fn(&str) + Send + 'static,
{
    std::thread::Builder::new()
        .name("stdin-reader".to_owned())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("stdin read failed: {e}");
                        break;
                    }
                };
                if let Some(button) = line.trim().strip_prefix(BUTTON_PREFIX) {
                    on_button(button.trim());
                } else if lines.send(line).is_err() {
                    break;
                }
            }
            drop(lines);
            on_button("quit");
        })?;
    Ok(())
}

/// Console implementation of [`UiSurface`].
pub struct ConsoleSurface {
    input: LineSource,
    busy: bool,
    closed: bool,
}

impl ConsoleSurface {
    pub fn new(input: LineSource) -> Self {
        Self {
            input,
            busy: false,
            closed: false,
        }
    }

    fn print(&self, prefix: &str, text: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{prefix} {text}");
        let _ = out.flush();
    }

    fn ask(&mut self, question: &str) -> Option<String> {
        self.print("?", question);
        match self.input.next_line(DIALOG_TIMEOUT) {
            LineRead::Line(answer) => {
                let answer = answer.trim().to_owned();
                (!answer.is_empty()).then_some(answer)
            }
            LineRead::Timeout => None,
            LineRead::Closed => {
                self.closed = true;
                None
            }
        }
    }

    fn ask_path(&mut self, question: &str) -> Option<PathBuf> {
        self.ask(question).map(PathBuf::from)
    }
}

impl UiSurface for ConsoleSurface {
    fn append_log(&mut self, line: &str) {
        self.print("|", line);
    }

    fn set_status(&mut self, text: &str) {
        self.print("*", text);
    }

    fn set_busy(&mut self, busy: bool) {
        if self.busy != busy {
            self.busy = busy;
            self.print("*", if busy { "[working...]" } else { "[ready]" });
        }
    }

    fn clear_outputs(&mut self) {
        self.print("-", "--------------------------------");
    }

    fn show_narration(&mut self, result: &NarrationResult) {
        self.print("#", &format!("image: {}", result.image.display()));
        self.print("#", &result.text);
    }

    fn show_video(&mut self, path: &Path) {
        self.print("#", &format!("video: {}", path.display()));
    }

    fn request_image(&mut self) -> Option<ImageRequest> {
        let image = self.ask_path("image file:")?;
        let description = self.ask("description of the image:")?;
        Some(ImageRequest { image, description })
    }

    fn request_video(&mut self) -> Option<VideoRequest> {
        let video = self.ask_path("video file:")?;
        let summary = self.ask("summary of the video:")?;
        Some(VideoRequest { video, summary })
    }

    fn request_capture_description(&mut self) -> Option<String> {
        self.ask("description of the photo:")
    }

    fn request_shutdown(&mut self) {
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
