//! Narration engine boundary and the external-process narrators.
//!
//! Narration itself (vision-language captioning with retrieval) runs in
//! external programs. They are started per request, their stdout is
//! streamed line by line to the log, and the result is read back from
//! marker lines:
//!
//! ```text
//! FINAL_IMAGE: /path/to/image.jpg
//! FINAL_ANSWER: <narration text>
//! FINAL_VIDEO: /path/to/narrated.mp4
//! ```

use crate::error::{NarratorError, Result};
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::SystemTime;
use tracing::{debug, info, warn};

const ANSWER_MARKER: &str = "FINAL_ANSWER:";
const VIDEO_MARKER: &str = "FINAL_VIDEO:";
const IMAGE_MARKER: &str = "FINAL_IMAGE:";
/// Older video scripts print this line and the path on the line after.
const VIDEO_SAVED_AS: &str = "最終影片已儲存為：";

/// An image to narrate plus the user's description of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub image: PathBuf,
    pub description: String,
}

/// A video to narrate plus the user's summary of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRequest {
    pub video: PathBuf,
    pub summary: String,
}

/// Narration for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrationResult {
    pub text: String,
    /// Image the narration describes (may differ from the request, e.g. resized).
    pub image: PathBuf,
}

/// Output of a video narration run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VideoResult {
    /// The narrated video, if the program reported one.
    pub video: Option<PathBuf>,
    /// Narration text, if the program reported one.
    pub narration: Option<String>,
}

/// Heavy resources built once per model directory.
#[derive(Debug, Clone)]
pub struct ResourceBundle {
    /// Cache identity (the model directory as text).
    pub identity: String,
    pub model_dir: PathBuf,
    pub loaded_at: SystemTime,
}

/// Builds a [`ResourceBundle`]. Blocking; called only off the UI thread.
pub trait ResourceLoader: Send + Sync {
    fn load(&self, model_dir: &Path) -> Result<ResourceBundle>;
}

/// Narrates a single image.
pub trait NarrationEngine: Send + Sync {
    /// Blocking. `log` receives progress lines for the UI log.
    fn generate(
        &self,
        bundle: &ResourceBundle,
        request: &ImageRequest,
        log: &dyn Fn(&str),
    ) -> Result<NarrationResult>;
}

/// Narrates a video end to end.
pub trait VideoNarrator: Send + Sync {
    fn narrate(&self, request: &VideoRequest, log: &dyn Fn(&str)) -> Result<VideoResult>;
}

/// Checks that the model directory exists and is readable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelDirLoader;

impl ResourceLoader for ModelDirLoader {
    fn load(&self, model_dir: &Path) -> Result<ResourceBundle> {
        if !model_dir.is_dir() {
            return Err(NarratorError::Config(format!(
                "model directory not found: {}",
                model_dir.display()
            )));
        }
        let entries = std::fs::read_dir(model_dir)?.count();
        info!(
            "model directory {} ready ({entries} entries)",
            model_dir.display()
        );
        Ok(ResourceBundle {
            identity: model_dir.display().to_string(),
            model_dir: model_dir.to_path_buf(),
            loaded_at: SystemTime::now(),
        })
    }
}

/// Runs the configured external programs for images and videos.
#[derive(Debug, Clone)]
pub struct CommandNarrator {
    image_command: Vec<String>,
    video_command: Vec<String>,
}

impl CommandNarrator {
    pub fn new(image_command: Vec<String>, video_command: Vec<String>) -> Self {
        Self {
            image_command,
            video_command,
        }
    }
}

impl NarrationEngine for CommandNarrator {
    fn generate(
        &self,
        bundle: &ResourceBundle,
        request: &ImageRequest,
        log: &dyn Fn(&str),
    ) -> Result<NarrationResult> {
        if !request.image.is_file() {
            return Err(NarratorError::Narration(format!(
                "image not found: {}",
                request.image.display()
            )));
        }
        let args = [
            OsString::from("--model_path"),
            bundle.model_dir.clone().into_os_string(),
            OsString::from("--image_file"),
            request.image.clone().into_os_string(),
            OsString::from("--desc"),
            OsString::from(&request.description),
        ];
        let markers = run_streaming(&self.image_command, &args, log)?;
        let text = markers.answer.filter(|a| !a.is_empty()).ok_or_else(|| {
            NarratorError::Narration("narration program returned no answer".to_owned())
        })?;
        let image = markers
            .image
            .map(PathBuf::from)
            .unwrap_or_else(|| request.image.clone());
        Ok(NarrationResult { text, image })
    }
}

impl VideoNarrator for CommandNarrator {
    fn narrate(&self, request: &VideoRequest, log: &dyn Fn(&str)) -> Result<VideoResult> {
        if !request.video.is_file() {
            return Err(NarratorError::Narration(format!(
                "video not found: {}",
                request.video.display()
            )));
        }
        let args = [
            OsString::from("--video_file"),
            request.video.clone().into_os_string(),
            OsString::from("--summary"),
            OsString::from(&request.summary),
        ];
        let markers = run_streaming(&self.video_command, &args, log)?;
        Ok(VideoResult {
            video: markers.video.map(PathBuf::from),
            narration: markers.answer.filter(|a| !a.is_empty()),
        })
    }
}

/// Values collected from marker lines.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Markers {
    pub answer: Option<String>,
    pub video: Option<String>,
    pub image: Option<String>,
    path_on_next_line: bool,
}

impl Markers {
    /// Feed one stdout line. Later markers overwrite earlier ones.
    pub fn feed(&mut self, line: &str) {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix(ANSWER_MARKER) {
            self.answer = Some(rest.trim().to_owned());
        } else if let Some(rest) = line.strip_prefix(VIDEO_MARKER) {
            self.video = Some(rest.trim().to_owned());
        } else if let Some(rest) = line.strip_prefix(IMAGE_MARKER) {
            self.image = Some(rest.trim().to_owned());
        } else if line.contains(VIDEO_SAVED_AS) {
            self.path_on_next_line = true;
        } else if self.path_on_next_line && !line.is_empty() {
            self.video = Some(line.to_owned());
            self.path_on_next_line = false;
        }
    }
}

/// Kills the child if it is still running when dropped.
struct ChildGuard {
    child: Child,
    program: String,
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
            debug!("killed {} on drop", self.program);
        }
    }
}

/// Run `command` plus `extra` args, streaming stdout lines to `log`.
fn run_streaming(command: &[String], extra: &[OsString], log: &dyn Fn(&str)) -> Result<Markers> {
    let (program, base_args) = command
        .split_first()
        .ok_or_else(|| NarratorError::Config("narration command is empty".to_owned()))?;

    info!("running {program}");
    let child = Command::new(program)
        .args(base_args)
        .args(extra)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                NarratorError::Config(format!("narration program not found: {program}"))
            }
            _ => NarratorError::Io(e),
        })?;
    let mut guard = ChildGuard {
        child,
        program: program.clone(),
    };

    let stderr_reader = guard.child.stderr.take().map(|mut stderr| {
        std::thread::Builder::new()
            .name("narration-stderr".to_owned())
            .spawn(move || {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf);
                buf
            })
    });

    let mut markers = Markers::default();
    if let Some(stdout) = guard.child.stdout.take() {
        for line in BufReader::new(stdout).lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("{program} output unreadable: {e}");
                    break;
                }
            };
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                log(trimmed);
            }
            markers.feed(trimmed);
        }
    }

    let status = guard.child.wait()?;
    let stderr = match stderr_reader {
        Some(Ok(handle)) => handle.join().unwrap_or_default(),
        Some(Err(e)) => {
            warn!("cannot spawn stderr reader: {e}");
            String::new()
        }
        None => String::new(),
    };

    if !status.success() {
        let details = stderr.trim();
        let details = if details.is_empty() {
            "[no error output]"
        } else {
            details
        };
        return Err(NarratorError::Narration(format!(
            "{program} exited with {status}: {details}"
        )));
    }
    debug!("{program} finished");
    Ok(markers)
}
