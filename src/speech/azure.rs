//! Azure Cognitive Services text-to-speech over REST.

use super::{SynthesizedAudio, Synthesizer, VoiceParams};
use crate::config::SpeechConfig;
use crate::error::{NarratorError, Result};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

const USER_AGENT: &str = "NarrationGeneratorApp/1.0";
const OUTPUT_FORMAT: &str = "riff-24khz-16bit-mono-pcm";

/// Rate offsets smaller than this (in percent) are sent as `0%`.
const NEGLIGIBLE_RATE_PERCENT: f32 = 0.5;
const MAX_RATE_PERCENT: f32 = 90.0;

/// Synthesizer calling the Azure speech REST endpoint.
pub struct AzureSynthesizer {
    client: reqwest::blocking::Client,
    endpoint: String,
    key_file: PathBuf,
    /// Subscription key, read from `key_file` on first use.
    key: Mutex<Option<String>>,
}

impl std::fmt::Debug for AzureSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureSynthesizer")
            .field("endpoint", &self.endpoint)
            .field("key_file", &self.key_file)
            .finish_non_exhaustive()
    }
}

impl AzureSynthesizer {
    /// Build a synthesizer for the configured region.
    ///
    /// The key file is not read until the first request.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the HTTP client cannot be built.
    pub fn new(config: &SpeechConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| NarratorError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!(
                "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
                config.region
            ),
            key_file: config.key_file.clone(),
            key: Mutex::new(None),
        })
    }

    fn subscription_key(&self) -> Result<String> {
        let mut cached = self.key.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(key) = cached.as_ref() {
            return Ok(key.clone());
        }
        let key = read_key_file(&self.key_file)?;
        info!("loaded speech subscription key from {}", self.key_file.display());
        *cached = Some(key.clone());
        Ok(key)
    }
}

impl Synthesizer for AzureSynthesizer {
    fn synthesize(&self, text: &str, params: &VoiceParams) -> Result<SynthesizedAudio> {
        let key = self.subscription_key()?;
        let ssml = build_ssml(text, &params.voice, params.speech_rate);
        debug!("requesting synthesis: {} chars, voice {}", text.chars().count(), params.voice);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", OUTPUT_FORMAT)
            .body(ssml)
            .send()
            .map_err(|e| NarratorError::Transport(format!("speech request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(NarratorError::Transport(format!(
                "speech service returned {status}: {body}"
            )));
        }

        let bytes = response
            .bytes()
            .map_err(|e| NarratorError::Transport(format!("speech response truncated: {e}")))?;
        decode_wav(&bytes)
    }
}

/// Read a subscription key, rejecting missing or blank files.
fn read_key_file(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        NarratorError::Config(format!("cannot read speech key file {}: {e}", path.display()))
    })?;
    let key = content.trim();
    if key.is_empty() {
        return Err(NarratorError::Config(format!(
            "speech key file {} is empty",
            path.display()
        )));
    }
    Ok(key.to_owned())
}

/// SSML document for one utterance.
pub fn build_ssml(text: &str, voice: &str, speech_rate: f32) -> String {
    format!(
        "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='{locale}'>\
         <voice name='{voice}'><prosody rate='{rate}'>{text}</prosody></voice></speak>",
        locale = infer_locale(voice),
        voice = escape_xml(voice),
        rate = rate_to_percent(speech_rate),
        text = escape_xml(text),
    )
}

pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Map a rate multiplier to a signed percent offset, e.g. `1.2` to `+20%`.
pub fn rate_to_percent(speech_rate: f32) -> String {
    let percent = ((speech_rate - 1.0) * 100.0).clamp(-MAX_RATE_PERCENT, MAX_RATE_PERCENT);
    if percent.abs() < NEGLIGIBLE_RATE_PERCENT || !percent.is_finite() {
        "0%".to_owned()
    } else {
        format!("{percent:+.0}%")
    }
}

/// Locale from a voice name: `zh-TW-HsiaoChenNeural` gives `zh-TW`.
pub fn infer_locale(voice: &str) -> String {
    let mut parts = voice.split('-');
    match (parts.next(), parts.next()) {
        (Some(lang), Some(region)) if !lang.is_empty() && !region.is_empty() => {
            format!("{lang}-{region}")
        }
        _ => "zh-TW".to_owned(),
    }
}

/// Decode a RIFF/WAV body into mono f32 samples.
fn decode_wav(bytes: &[u8]) -> Result<SynthesizedAudio> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| NarratorError::Speech(format!("invalid audio from speech service: {e}")))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| {
                    s.map_err(|e| NarratorError::Speech(format!("WAV read error: {e}")))
                        .map(|v| v as f32 / max)
                })
                .collect::<Result<Vec<f32>>>()?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map_err(|e| NarratorError::Speech(format!("WAV read error: {e}"))))
            .collect::<Result<Vec<f32>>>()?,
    };

    let samples = if spec.channels > 1 {
        let ch = spec.channels as usize;
        samples
            .chunks(ch)
            .map(|frame| frame.iter().sum::<f32>() / ch as f32)
            .collect()
    } else {
        samples
    };

    Ok(SynthesizedAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}
