//! Owner of the single active utterance.

use super::cues::AudioCue;
use super::{PlaybackEnd, Player, Synthesizer, VoiceParams};
use crate::cancel::CancelToken;
use crate::config::SpeechConfig;
use crate::error::{NarratorError, Result};
use crate::events::{CoreEvent, EventSink};
use crate::settings::VoiceSettings;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// How a `speak` request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// Played to the end.
    Completed,
    /// Stopped by `interrupt_current` or superseded by a newer utterance.
    Interrupted,
    /// Nothing to say (empty or whitespace-only text).
    Skipped,
    /// Non-blocking request handed to a playback thread.
    Detached,
}

#[derive(Debug)]
struct ActiveUtterance {
    id: u64,
    stop: CancelToken,
}

#[derive(Debug, Clone, Copy)]
struct Tuning {
    speech_rate: f32,
    volume: f32,
}

struct Inner {
    synthesizer: Arc<dyn Synthesizer>,
    player: Arc<dyn Player>,
    config: SpeechConfig,
    tuning: Mutex<Tuning>,
    active: Mutex<Option<ActiveUtterance>>,
    next_id: AtomicU64,
    events: EventSink,
}

/// Speech output with a single interruptible utterance.
///
/// Cloning is cheap; all clones share the active utterance, so an
/// interrupt from any thread stops whatever any clone started.
#[derive(Clone)]
pub struct SpeechController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SpeechController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechController")
            .field("speaking", &self.is_speaking())
            .finish_non_exhaustive()
    }
}

impl SpeechController {
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        player: Arc<dyn Player>,
        config: SpeechConfig,
        events: EventSink,
    ) -> Self {
        let tuning = Tuning {
            speech_rate: config.speech_rate,
            volume: config.volume.clamp(0.0, 1.0),
        };
        Self {
            inner: Arc::new(Inner {
                synthesizer,
                player,
                config,
                tuning: Mutex::new(tuning),
                active: Mutex::new(None),
                next_id: AtomicU64::new(1),
                events,
            }),
        }
    }

    /// Take rate and volume from persisted settings.
    pub fn apply_settings(&self, settings: &VoiceSettings) {
        let mut tuning = self.inner.tuning.lock().unwrap_or_else(|e| e.into_inner());
        tuning.speech_rate = settings.speech_rate;
        tuning.volume = settings.volume.clamp(0.0, 1.0);
    }

    /// Synthesize and play `text`.
    ///
    /// The new utterance replaces any utterance still playing. With
    /// `block` the call returns when playback ends; without it playback
    /// runs on its own thread and the call returns [`SpeechOutcome::Detached`].
    ///
    /// # Errors
    ///
    /// Returns the synthesizer's or player's error for a blocking request,
    /// or a `Speech` error if the playback thread cannot be spawned.
    pub fn speak(&self, text: &str, block: bool) -> Result<SpeechOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(SpeechOutcome::Skipped);
        }
        let (id, stop) = self.inner.register();
        self.inner.events.emit(CoreEvent::SpeechStarted {
            text: text.to_owned(),
        });

        if block {
            return self.inner.perform(id, &stop, text);
        }

        let inner = Arc::clone(&self.inner);
        let owned = text.to_owned();
        let spawned = std::thread::Builder::new()
            .name("speech".to_owned())
            .spawn(move || {
                if let Err(e) = inner.perform(id, &stop, &owned) {
                    error!("speech failed: {e}");
                    inner.play_cue(AudioCue::Error);
                }
            });
        match spawned {
            Ok(_) => Ok(SpeechOutcome::Detached),
            Err(e) => {
                self.inner.finish(id);
                Err(NarratorError::Speech(format!(
                    "cannot spawn playback thread: {e}"
                )))
            }
        }
    }

    /// Speak `text`, logging failures and sounding the error cue instead
    /// of returning them.
    pub fn say(&self, text: &str, block: bool) {
        if let Err(e) = self.speak(text, block) {
            error!("speech failed: {e}");
            self.inner.play_cue(AudioCue::Error);
        }
    }

    /// Stop the in-flight utterance, if any. Safe to call from any thread.
    ///
    /// Returns whether something was playing.
    pub fn interrupt_current(&self) -> bool {
        let previous = self
            .inner
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let was_playing = match previous {
            Some(utterance) => {
                utterance.stop.cancel();
                debug!("interrupted utterance #{}", utterance.id);
                true
            }
            None => false,
        };
        self.inner
            .events
            .emit(CoreEvent::SpeechInterrupted { was_playing });
        was_playing
    }

    /// Play an audible cue on the calling thread. Not interruptible.
    pub fn cue(&self, cue: AudioCue) {
        self.inner.play_cue(cue);
    }

    /// Whether an utterance is registered as playing.
    pub fn is_speaking(&self) -> bool {
        self.inner
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

impl Inner {
    /// Make a new utterance the active one, stopping its predecessor.
    fn register(&self) -> (u64, CancelToken) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let stop = CancelToken::new();
        let previous = self
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(ActiveUtterance {
                id,
                stop: stop.clone(),
            });
        if let Some(previous) = previous {
            previous.stop.cancel();
            debug!("utterance #{} superseded by #{id}", previous.id);
        }
        (id, stop)
    }

    /// Clear the active slot if it still belongs to `id`.
    fn finish(&self, id: u64) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active.as_ref().is_some_and(|a| a.id == id) {
            *active = None;
        }
    }

    fn perform(&self, id: u64, stop: &CancelToken, text: &str) -> Result<SpeechOutcome> {
        let result = self.synthesize_and_play(stop, text);
        self.finish(id);
        result
    }

    fn synthesize_and_play(&self, stop: &CancelToken, text: &str) -> Result<SpeechOutcome> {
        if stop.is_cancelled() {
            return Ok(SpeechOutcome::Interrupted);
        }
        let tuning = *self.tuning.lock().unwrap_or_else(|e| e.into_inner());
        let params = VoiceParams::for_text(text, &self.config, tuning.speech_rate);
        info!("speaking ({}): {text}", params.voice);
        let audio = self.synthesizer.synthesize(text, &params)?;
        if stop.is_cancelled() {
            return Ok(SpeechOutcome::Interrupted);
        }
        match self.player.play(&audio, tuning.volume, stop)? {
            PlaybackEnd::Completed => Ok(SpeechOutcome::Completed),
            PlaybackEnd::Interrupted => Ok(SpeechOutcome::Interrupted),
        }
    }

    fn play_cue(&self, cue: AudioCue) {
        if !self.config.sound_cues {
            return;
        }
        let volume = self.tuning.lock().unwrap_or_else(|e| e.into_inner()).volume;
        if let Err(e) = self.player.play(&cue.render(), volume, &CancelToken::new()) {
            warn!("failed to play {cue:?} cue: {e}");
        }
    }
}
