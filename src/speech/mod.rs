//! Speech output: synthesis, playback, interruption, and audible cues.
//!
//! The synthesizer and the player are external collaborators behind traits;
//! [`SpeechController`] owns the single active utterance and is the only
//! place playback is started or stopped.

pub mod azure;
pub mod controller;
pub mod cues;
pub mod playback;

pub use controller::{SpeechController, SpeechOutcome};
pub use cues::AudioCue;

use crate::cancel::CancelToken;
use crate::config::SpeechConfig;
use crate::error::Result;
use std::time::Duration;

/// Synthesized mono audio ready for playback.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    /// f32 samples in `[-1, 1]`.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl SynthesizedAudio {
    /// Playback length.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// How a playback ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEnd {
    Completed,
    Interrupted,
}

/// Language used to pick a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    TraditionalChinese,
    English,
}

impl Language {
    pub fn locale(self) -> &'static str {
        match self {
            Self::TraditionalChinese => "zh-TW",
            Self::English => "en-US",
        }
    }
}

/// Pick the language of `text`: English when Latin letters outnumber CJK
/// ideographs, Chinese otherwise (including for empty text).
pub fn detect_language(text: &str) -> Language {
    let latin = text.chars().filter(char::is_ascii_alphabetic).count();
    let cjk = text
        .chars()
        .filter(|c| ('\u{4e00}'..='\u{9fff}').contains(c))
        .count();
    if latin > cjk {
        Language::English
    } else {
        Language::TraditionalChinese
    }
}

/// Voice parameters for one synthesis request.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceParams {
    /// Service voice name, e.g. `zh-TW-HsiaoChenNeural`.
    pub voice: String,
    /// Locale, e.g. `zh-TW`.
    pub locale: String,
    /// Rate multiplier (1.0 = normal).
    pub speech_rate: f32,
}

impl VoiceParams {
    /// Voice for `text` according to its detected language.
    pub fn for_text(text: &str, config: &SpeechConfig, speech_rate: f32) -> Self {
        let language = detect_language(text);
        let voice = match language {
            Language::TraditionalChinese => config.voice_zh.clone(),
            Language::English => config.voice_en.clone(),
        };
        Self {
            voice,
            locale: language.locale().to_owned(),
            speech_rate,
        }
    }
}

/// Text-to-speech backend.
///
/// Implementations return [`crate::NarratorError::Config`] when credentials
/// are missing and [`crate::NarratorError::Transport`] on network failure.
pub trait Synthesizer: Send + Sync {
    fn synthesize(&self, text: &str, params: &VoiceParams) -> Result<SynthesizedAudio>;
}

/// Audio output backend.
pub trait Player: Send + Sync {
    /// Play `audio`, blocking until it finishes or `stop` is cancelled.
    fn play(&self, audio: &SynthesizedAudio, volume: f32, stop: &CancelToken)
    -> Result<PlaybackEnd>;
}
