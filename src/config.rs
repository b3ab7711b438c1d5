//! Configuration types for the narrator.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NarratorConfig {
    /// Voice command loop settings.
    pub voice: VoiceConfig,
    /// Speech synthesis and audible cue settings.
    pub speech: SpeechConfig,
    /// Model and narration command settings.
    pub models: ModelConfig,
    /// Live camera capture settings.
    pub capture: CaptureConfig,
    /// UI queue settings.
    pub ui: UiConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// Voice interaction loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Whether the voice command loop runs at all.
    pub enabled: bool,
    /// Upper bound on a single microphone capture, in ms.
    pub listen_timeout_ms: u64,
    /// Delay before re-arming the loop after a voice-triggered task, in ms.
    ///
    /// Lets the completion announcement finish so its tail is not
    /// captured as the next command.
    pub rearm_delay_ms: u64,
    /// Delay before re-arming after empty or unrecognized input, in ms.
    pub retry_delay_ms: u64,
    /// Delay before re-arming after a fatal recognition error, in ms.
    pub error_backoff_ms: u64,
    /// Pause at the start of every pass, in ms.
    pub settle_delay_ms: u64,
    /// Append a "listening, speak after the tone" hint to prompts.
    pub beginner_mode: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_timeout_ms: 15_000,
            rearm_delay_ms: 200,
            retry_delay_ms: 100,
            error_backoff_ms: 2_000,
            settle_delay_ms: 500,
            beginner_mode: true,
        }
    }
}

impl VoiceConfig {
    pub fn listen_timeout(&self) -> Duration {
        Duration::from_millis(self.listen_timeout_ms)
    }

    pub fn rearm_delay(&self) -> Duration {
        Duration::from_millis(self.rearm_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Speech synthesis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Azure region hosting the speech endpoint.
    pub region: String,
    /// File holding the subscription key.
    pub key_file: PathBuf,
    /// Voice used for text detected as Chinese.
    pub voice_zh: String,
    /// Voice used for text detected as English.
    pub voice_en: String,
    /// Speech rate multiplier (1.0 = normal).
    pub speech_rate: f32,
    /// Playback volume in `[0, 1]`.
    pub volume: f32,
    /// Play success/error/listening tones.
    pub sound_cues: bool,
    /// HTTP timeout for a single synthesis request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            region: "eastasia".to_owned(),
            key_file: PathBuf::from("ttsapi.txt"),
            voice_zh: "zh-TW-HsiaoChenNeural".to_owned(),
            voice_en: "en-US-JennyNeural".to_owned(),
            speech_rate: 1.0,
            volume: 1.0,
            sound_cues: true,
            request_timeout_secs: 45,
        }
    }
}

/// Model and narration command configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory holding the vision-language model; also the cache identity.
    pub model_dir: PathBuf,
    /// Command narrating a single image (program followed by arguments).
    pub image_command: Vec<String>,
    /// Command narrating a video end-to-end.
    pub video_command: Vec<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models").join("Llama-3.2-11B-Vision-Instruct"),
            image_command: vec!["python".to_owned(), "generate_image_ad.py".to_owned()],
            video_command: vec!["python".to_owned(), "generate_video_ad.py".to_owned()],
        }
    }
}

/// Live capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Directory captured frames are written to.
    pub captures_dir: PathBuf,
    /// Spoken countdown length in seconds.
    pub countdown_secs: u32,
    /// Command grabbing one frame; `{output}` is replaced by the target path.
    pub camera_command: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            captures_dir: PathBuf::from("captures"),
            countdown_secs: 3,
            camera_command: vec![
                "ffmpeg".to_owned(),
                "-loglevel".to_owned(),
                "error".to_owned(),
                "-y".to_owned(),
                "-f".to_owned(),
                "v4l2".to_owned(),
                "-i".to_owned(),
                "/dev/video0".to_owned(),
                "-frames:v".to_owned(),
                "1".to_owned(),
                "{output}".to_owned(),
            ],
        }
    }
}

/// UI queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Period of the UI queue drain step, in ms.
    pub drain_interval_ms: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            drain_interval_ms: 100,
        }
    }
}

impl UiConfig {
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms.max(1))
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write a daily rolling log file.
    pub file: bool,
    /// Directory for log files (None = `<data dir>/narrator/logs`).
    pub directory: Option<PathBuf>,
}

impl LoggingConfig {
    /// Resolved log directory.
    pub fn log_dir(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("narrator")
                .join("logs")
        })
    }
}

impl NarratorConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::NarratorError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::NarratorError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/narrator/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("narrator").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("narrator")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/narrator-config/config.toml")
        }
    }

    /// Model directory string used as the resource cache identity.
    pub fn model_identity(&self) -> String {
        self.models.model_dir.display().to_string()
    }
}
