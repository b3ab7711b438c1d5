//! Persisted voice settings and the active custom-voice profile.
//!
//! Stored as a small JSON file next to the voice profiles. Failures to read
//! or write are logged and degrade to defaults; they are never fatal.

use crate::error::{NarratorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const SETTINGS_FILE_NAME: &str = "profile_settings.json";

/// User-adjustable speech settings plus the active voice profile name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    /// Speech rate multiplier (1.0 = normal).
    pub speech_rate: f32,
    /// Playback volume in `[0, 1]`.
    pub volume: f32,
    /// Append listening hints to voice prompts.
    pub beginner_mode: bool,
    /// Active custom-voice profile, if any.
    pub current_profile: Option<String>,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            speech_rate: 1.0,
            volume: 1.0,
            beginner_mode: true,
            current_profile: None,
        }
    }
}

impl VoiceSettings {
    /// Read settings from `path`, logging and returning defaults on any failure.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("voice settings unavailable, using defaults: {e}");
                Self::default()
            }
        }
    }

    /// Read settings from `path`.
    ///
    /// A missing file is not an error; it yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let mut settings: Self = serde_json::from_str(&content)
            .map_err(|e| NarratorError::Settings(format!("{}: {e}", path.display())))?;
        settings.volume = settings.volume.clamp(0.0, 1.0);
        if settings.speech_rate <= 0.0 {
            settings.speech_rate = 1.0;
        }
        Ok(settings)
    }

    /// Write settings as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| NarratorError::Settings(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Switch the active voice profile and persist the change.
    ///
    /// The in-memory value changes even if persisting fails; the failure is
    /// logged.
    pub fn set_active_profile(&mut self, name: Option<String>, path: &Path) {
        self.current_profile = name;
        match self.save(path) {
            Ok(()) => info!(
                "active voice profile set to {}",
                self.current_profile.as_deref().unwrap_or("<default>")
            ),
            Err(e) => warn!("failed to persist voice profile selection: {e}"),
        }
    }

    /// Default settings file: `<data dir>/narrator/voice_clones/profile_settings.json`.
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("narrator")
            .join("voice_clones")
            .join(SETTINGS_FILE_NAME)
    }
}
