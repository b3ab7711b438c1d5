//! Live camera capture: countdown and single-frame grab.

use crate::cancel::CancelToken;
use crate::error::{NarratorError, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info};

/// Word spoken when the shutter fires.
pub const SHUTTER_WORD: &str = "拍照";

const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Grabs one still frame to a file. Blocking.
pub trait Camera: Send + Sync {
    fn capture(&self, output: &Path) -> Result<()>;
}

/// Camera driven by an external command such as `ffmpeg`.
///
/// Every `{output}` argument is replaced by the target path; if none is
/// present the path is appended.
#[derive(Debug, Clone)]
pub struct CommandCamera {
    command: Vec<String>,
}

impl CommandCamera {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    fn build_args(&self, output: &Path) -> Vec<String> {
        let target = output.display().to_string();
        let mut args: Vec<String> = self
            .command
            .iter()
            .skip(1)
            .map(|arg| arg.replace(OUTPUT_PLACEHOLDER, &target))
            .collect();
        if !self.command.iter().any(|arg| arg.contains(OUTPUT_PLACEHOLDER)) {
            args.push(target);
        }
        args
    }
}

impl Camera for CommandCamera {
    fn capture(&self, output: &Path) -> Result<()> {
        let program = self
            .command
            .first()
            .ok_or_else(|| NarratorError::Config("camera command is empty".to_owned()))?;
        let args = self.build_args(output);
        debug!("camera: {program} {}", args.join(" "));

        let result = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    NarratorError::Config(format!("camera program not found: {program}"))
                }
                _ => NarratorError::Capture(format!("cannot start camera: {e}")),
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(NarratorError::Capture(format!(
                "camera exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }
        if !output.is_file() {
            return Err(NarratorError::Capture(format!(
                "camera produced no image at {}",
                output.display()
            )));
        }
        info!("captured frame to {}", output.display());
        Ok(())
    }
}

/// A fresh `live_capture_<uuid>.jpg` path in `dir`, creating `dir`.
pub fn capture_path(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    Ok(dir.join(format!("live_capture_{}.jpg", uuid::Uuid::new_v4())))
}

/// Announce `secs` … 1 one `tick` apart, then the shutter word.
///
/// # Errors
///
/// Returns `Cancelled` as soon as `cancel` fires.
pub fn run_countdown(
    secs: u32,
    tick: Duration,
    cancel: &CancelToken,
    announce: &dyn Fn(&str),
) -> Result<()> {
    for n in (1..=secs).rev() {
        if cancel.is_cancelled() {
            return Err(NarratorError::Cancelled("capture aborted".to_owned()));
        }
        announce(&n.to_string());
        if cancel.wait_timeout(tick) {
            return Err(NarratorError::Cancelled("capture aborted".to_owned()));
        }
    }
    if cancel.is_cancelled() {
        return Err(NarratorError::Cancelled("capture aborted".to_owned()));
    }
    announce(SHUTTER_WORD);
    Ok(())
}
