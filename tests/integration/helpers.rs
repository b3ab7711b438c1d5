//! Shared fakes and a controller rig for integration tests.
//!
//! The test thread plays the UI thread: it owns the surface and drains the
//! update queue with [`Rig::pump_until`].

use crossbeam_channel::Receiver;
use narrator::capture::Camera;
use narrator::narration::{
    ImageRequest, NarrationEngine, NarrationResult, ResourceBundle, ResourceLoader, VideoNarrator,
    VideoRequest, VideoResult,
};
use narrator::settings::VoiceSettings;
use narrator::speech::playback::SimulatedPlayer;
use narrator::speech::{PlaybackEnd, Player, SynthesizedAudio, Synthesizer, VoiceParams};
use narrator::voice::{KeywordClassifier, ListenOutcome, SpeechRecognizer};
use narrator::{
    CancelToken, Controller, ControllerParts, CoreEvent, EventSink, NarratorConfig, NarratorError, Result,
    UiQueue, UiSurface, ui_channel,
};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

pub(crate) const REARM_MS: u64 = 37;
pub(crate) const RETRY_MS: u64 = 5;
pub(crate) const BACKOFF_MS: u64 = 11;

/// Surface whose dialogs answer from scripted queues.
#[derive(Debug, Default)]
pub(crate) struct ScriptedSurface {
    pub log: Vec<String>,
    pub cleared: usize,
    pub narrations: Vec<NarrationResult>,
    pub images: VecDeque<Option<ImageRequest>>,
    pub videos: VecDeque<Option<VideoRequest>>,
    pub descriptions: VecDeque<Option<String>>,
    pub closed: bool,
}

impl UiSurface for ScriptedSurface {
    fn append_log(&mut self, line: &str) {
        self.log.push(line.to_owned());
    }

    fn set_status(&mut self, _text: &str) {}

    fn set_busy(&mut self, _busy: bool) {}

    fn clear_outputs(&mut self) {
        self.cleared += 1;
    }

    fn show_narration(&mut self, result: &NarrationResult) {
        self.narrations.push(result.clone());
    }

    fn show_video(&mut self, _path: &Path) {}

    fn request_image(&mut self) -> Option<ImageRequest> {
        self.images.pop_front().flatten()
    }

    fn request_video(&mut self) -> Option<VideoRequest> {
        self.videos.pop_front().flatten()
    }

    fn request_capture_description(&mut self) -> Option<String> {
        self.descriptions.pop_front().flatten()
    }

    fn request_shutdown(&mut self) {
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Synthesizer that records every text it is asked to speak.
///
/// Utterances last one millisecond, except `long_text` which lasts
/// `long_length`.
pub(crate) struct RecordingSynth {
    pub spoken: Arc<Mutex<Vec<String>>>,
    pub timeline: Arc<Mutex<Vec<String>>>,
    pub long_text: Option<String>,
    pub long_length: Duration,
}

impl Synthesizer for RecordingSynth {
    fn synthesize(&self, text: &str, _params: &VoiceParams) -> Result<SynthesizedAudio> {
        self.spoken.lock().unwrap().push(text.to_owned());
        self.timeline.lock().unwrap().push(format!("say:{text}"));
        let samples = if self.long_text.as_deref() == Some(text) {
            (self.long_length.as_secs_f64() * 24_000.0) as usize
        } else {
            24
        };
        Ok(SynthesizedAudio {
            samples: vec![0.0; samples],
            sample_rate: 24_000,
        })
    }
}

/// Paced player that appends how each playback ended to the timeline.
pub(crate) struct TimelinePlayer {
    pub inner: SimulatedPlayer,
    pub timeline: Arc<Mutex<Vec<String>>>,
}

impl Player for TimelinePlayer {
    fn play(
        &self,
        audio: &SynthesizedAudio,
        volume: f32,
        stop: &CancelToken,
    ) -> Result<PlaybackEnd> {
        let end = self.inner.play(audio, volume, stop)?;
        self.timeline
            .lock()
            .unwrap()
            .push(format!("end:{}:{end:?}", audio.samples.len()));
        Ok(end)
    }
}

/// Recognizer answering from a script, then timing out.
pub(crate) struct ScriptedRecognizer {
    pub script: Mutex<VecDeque<ListenOutcome>>,
}

impl SpeechRecognizer for ScriptedRecognizer {
    fn listen(&self, timeout: Duration) -> ListenOutcome {
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        std::thread::sleep(timeout);
        ListenOutcome::Timeout
    }
}

pub(crate) struct CountingLoader {
    pub loads: Arc<AtomicUsize>,
}

impl ResourceLoader for CountingLoader {
    fn load(&self, model_dir: &Path) -> Result<ResourceBundle> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        Ok(ResourceBundle {
            identity: model_dir.display().to_string(),
            model_dir: model_dir.to_path_buf(),
            loaded_at: SystemTime::now(),
        })
    }
}

/// How the fake engine behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EngineMode {
    Succeed,
    Fail,
    Panic,
}

pub(crate) struct FakeEngine {
    pub mode: EngineMode,
}

impl NarrationEngine for FakeEngine {
    fn generate(
        &self,
        _bundle: &ResourceBundle,
        request: &ImageRequest,
        log: &dyn Fn(&str),
    ) -> Result<NarrationResult> {
        log("generating");
        match self.mode {
            EngineMode::Succeed => Ok(NarrationResult {
                text: format!("畫面中有{}", request.description),
                image: request.image.clone(),
            }),
            EngineMode::Fail => Err(NarratorError::Narration("model crashed".to_owned())),
            EngineMode::Panic => panic!("engine exploded"),
        }
    }
}

pub(crate) struct NoVideo;

impl VideoNarrator for NoVideo {
    fn narrate(&self, _request: &VideoRequest, _log: &dyn Fn(&str)) -> Result<VideoResult> {
        Ok(VideoResult::default())
    }
}

pub(crate) struct FileCamera;

impl Camera for FileCamera {
    fn capture(&self, output: &Path) -> Result<()> {
        std::fs::write(output, b"jpeg")?;
        Ok(())
    }
}

pub(crate) struct Rig {
    pub controller: Controller,
    pub queue: UiQueue,
    pub surface: ScriptedSurface,
    pub events: Receiver<CoreEvent>,
    pub seen: Vec<CoreEvent>,
    pub spoken: Arc<Mutex<Vec<String>>>,
    /// Synthesis requests and playback ends, in the order they happened.
    pub timeline: Arc<Mutex<Vec<String>>>,
    pub loads: Arc<AtomicUsize>,
    pub dir: tempfile::TempDir,
}

pub(crate) struct RigOptions {
    pub voice: bool,
    pub script: Vec<ListenOutcome>,
    pub engine: EngineMode,
    pub countdown_secs: u32,
    /// Playback pace; 0 plays everything instantly.
    pub time_scale: f64,
    /// Text that synthesizes to two seconds of audio.
    pub long_text: Option<String>,
}

impl Default for RigOptions {
    fn default() -> Self {
        Self {
            voice: false,
            script: Vec::new(),
            engine: EngineMode::Succeed,
            countdown_secs: 0,
            time_scale: 0.0,
            long_text: None,
        }
    }
}

impl Rig {
    pub(crate) fn new(options: RigOptions) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut config = NarratorConfig::default();
        config.voice.enabled = options.voice;
        config.voice.listen_timeout_ms = 20;
        config.voice.rearm_delay_ms = REARM_MS;
        config.voice.retry_delay_ms = RETRY_MS;
        config.voice.error_backoff_ms = BACKOFF_MS;
        config.voice.settle_delay_ms = 0;
        config.models.model_dir = dir.path().join("model");
        config.capture.captures_dir = dir.path().join("captures");
        config.capture.countdown_secs = options.countdown_secs;

        let spoken = Arc::new(Mutex::new(Vec::new()));
        let timeline = Arc::new(Mutex::new(Vec::new()));
        let loads = Arc::new(AtomicUsize::new(0));
        let (ui, queue) = ui_channel();
        let (event_tx, events) = crossbeam_channel::unbounded();
        let settings = VoiceSettings {
            beginner_mode: false,
            ..VoiceSettings::default()
        };

        let controller = Controller::new(ControllerParts {
            config,
            settings,
            settings_path: dir.path().join("profile_settings.json"),
            ui,
            synthesizer: Arc::new(RecordingSynth {
                spoken: Arc::clone(&spoken),
                timeline: Arc::clone(&timeline),
                long_text: options.long_text,
                long_length: Duration::from_secs(2),
            }),
            player: Arc::new(TimelinePlayer {
                inner: SimulatedPlayer::with_time_scale(options.time_scale),
                timeline: Arc::clone(&timeline),
            }),
            recognizer: Arc::new(ScriptedRecognizer {
                script: Mutex::new(options.script.into()),
            }),
            classifier: Arc::new(KeywordClassifier::default()),
            loader: Arc::new(CountingLoader {
                loads: Arc::clone(&loads),
            }),
            engine: Arc::new(FakeEngine {
                mode: options.engine,
            }),
            video: Arc::new(NoVideo),
            camera: Arc::new(FileCamera),
            events: EventSink::new(Box::new(move |e: CoreEvent| {
                let _ = event_tx.send(e);
            })),
        });

        Self {
            controller,
            queue,
            surface: ScriptedSurface::default(),
            events,
            seen: Vec::new(),
            spoken,
            timeline,
            loads,
            dir,
        }
    }

    /// Act as the UI thread until an event matching `pred` arrives.
    ///
    /// Panics after five seconds.
    pub(crate) fn pump_until(&mut self, pred: impl Fn(&CoreEvent) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            self.queue.drain(&mut self.surface);
            while let Ok(event) = self.events.try_recv() {
                let done = pred(&event);
                self.seen.push(event);
                if done {
                    self.queue.drain(&mut self.surface);
                    return;
                }
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        panic!("condition not reached; events: {:#?}", self.seen);
    }

    /// Keep pumping for `period`, collecting events.
    pub(crate) fn pump_for(&mut self, period: Duration) {
        let deadline = Instant::now() + period;
        while Instant::now() < deadline {
            self.queue.drain(&mut self.surface);
            self.seen.extend(self.events.try_iter());
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    pub(crate) fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub(crate) fn timeline(&self) -> Vec<String> {
        self.timeline.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&CoreEvent) -> bool) -> usize {
        self.seen.iter().filter(|e| pred(e)).count()
    }

    pub(crate) fn position(&self, pred: impl Fn(&CoreEvent) -> bool) -> Option<usize> {
        self.seen.iter().position(pred)
    }

    /// Stop voice passes and tear down the UI side.
    pub(crate) fn shutdown(self) {
        self.controller.set_voice_enabled(false);
        self.queue.close();
    }
}

pub(crate) fn image_request(description: &str) -> ImageRequest {
    ImageRequest {
        image: "/tmp/photo.png".into(),
        description: description.to_owned(),
    }
}
