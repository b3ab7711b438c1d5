//! The coordinator: owns the gate, speech, cache and collaborators, and
//! exposes the task triggers, preload, and voice-loop arming.
//!
//! Triggers run on the UI thread (they may show blocking dialogs). Voice
//! passes and task operations run on their own worker threads and reach the
//! UI only through the update queue.

use crate::cache::ResourceCache;
use crate::cancel::CancelToken;
use crate::capture::{self, Camera};
use crate::config::NarratorConfig;
use crate::error::{NarratorError, Result};
use crate::events::{CoreEvent, EventSink, PreloadStatus, RejectReason};
use crate::gate::{BusyGate, BusyTicket, TaskKind, TaskOrigin};
use crate::narration::{
    ImageRequest, NarrationEngine, ResourceBundle, ResourceLoader, VideoNarrator,
};
use crate::settings::VoiceSettings;
use crate::speech::{AudioCue, Player, SpeechController, Synthesizer};
use crate::task::{CANCELLED_NOTICE, Operation, TaskContext, TaskOutput, TaskRunner};
use crate::ui::{UiSurface, UiUpdater};
use crate::voice::{CommandClassifier, Intent, ListenOutcome, SpeechRecognizer, VoiceHost, VoicePass};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const WELCOME: &str = "歡迎使用口述影像生成系統";
const MODELS_LOADING: &str = "模型仍在預載入中，請稍候...";
const OPERATION_CANCELLED: &str = "操作已取消";
const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// Everything the controller is built from.
pub struct ControllerParts {
    pub config: NarratorConfig,
    pub settings: VoiceSettings,
    /// Where `settings` is persisted.
    pub settings_path: PathBuf,
    pub ui: UiUpdater,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub player: Arc<dyn Player>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub classifier: Arc<dyn CommandClassifier>,
    pub loader: Arc<dyn ResourceLoader>,
    pub engine: Arc<dyn NarrationEngine>,
    pub video: Arc<dyn VideoNarrator>,
    pub camera: Arc<dyn Camera>,
    pub events: EventSink,
}

/// Model resources plus the cache that holds them.
#[derive(Clone)]
struct Resources {
    cache: Arc<ResourceCache<ResourceBundle>>,
    loader: Arc<dyn ResourceLoader>,
    identity: String,
    model_dir: PathBuf,
}

impl Resources {
    fn ensure(&self, force_reload: bool) -> Result<Arc<ResourceBundle>> {
        self.cache
            .ensure(&self.identity, force_reload, || self.loader.load(&self.model_dir))
    }
}

/// The live capture in progress, for manual abort.
struct LiveCapture {
    ticket: Arc<BusyTicket>,
    cancel: CancelToken,
}

struct Inner {
    config: NarratorConfig,
    settings: Mutex<VoiceSettings>,
    settings_path: PathBuf,
    voice_enabled: AtomicBool,
    ui: UiUpdater,
    gate: BusyGate,
    speech: SpeechController,
    runner: TaskRunner,
    recognizer: Arc<dyn SpeechRecognizer>,
    classifier: Arc<dyn CommandClassifier>,
    resources: Resources,
    engine: Arc<dyn NarrationEngine>,
    video: Arc<dyn VideoNarrator>,
    camera: Arc<dyn Camera>,
    preload: Mutex<PreloadStatus>,
    capture: Mutex<Option<LiveCapture>>,
    events: EventSink,
}

/// Single coordinator instance; cheap to clone.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("gate", &self.inner.gate)
            .field("preload", &self.preload_status())
            .finish_non_exhaustive()
    }
}

impl Controller {
    pub fn new(parts: ControllerParts) -> Self {
        let ControllerParts {
            config,
            settings,
            settings_path,
            ui,
            synthesizer,
            player,
            recognizer,
            classifier,
            loader,
            engine,
            video,
            camera,
            events,
        } = parts;

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let speech = SpeechController::new(
                synthesizer,
                player,
                config.speech.clone(),
                events.clone(),
            );
            speech.apply_settings(&settings);
            let gate = BusyGate::new(ui.clone());

            let rearm_target = weak.clone();
            let runner = TaskRunner::new(
                gate.clone(),
                ui.clone(),
                speech.clone(),
                events.clone(),
                Arc::new(move |delay| {
                    if let Some(inner) = rearm_target.upgrade() {
                        Controller { inner }.arm_voice_loop(delay);
                    }
                }),
                config.voice.rearm_delay(),
            );

            Inner {
                voice_enabled: AtomicBool::new(config.voice.enabled),
                resources: Resources {
                    cache: Arc::new(ResourceCache::new()),
                    loader,
                    identity: config.model_identity(),
                    model_dir: config.models.model_dir.clone(),
                },
                config,
                settings: Mutex::new(settings),
                settings_path,
                ui,
                gate,
                speech,
                runner,
                recognizer,
                classifier,
                engine,
                video,
                camera,
                preload: Mutex::new(PreloadStatus::NotStarted),
                capture: Mutex::new(None),
                events,
            }
        });
        Self { inner }
    }

    pub fn gate(&self) -> &BusyGate {
        &self.inner.gate
    }

    pub fn speech(&self) -> &SpeechController {
        &self.inner.speech
    }

    pub fn ui(&self) -> &UiUpdater {
        &self.inner.ui
    }

    pub fn config(&self) -> &NarratorConfig {
        &self.inner.config
    }

    pub fn voice_enabled(&self) -> bool {
        self.inner.voice_enabled.load(Ordering::SeqCst)
    }

    pub fn set_voice_enabled(&self, enabled: bool) {
        self.inner.voice_enabled.store(enabled, Ordering::SeqCst);
    }

    // ── Task triggers (UI thread) ──────────────────────────────────────

    pub fn start_image(&self, ui: &mut dyn UiSurface, origin: TaskOrigin) -> bool {
        self.trigger(ui, TaskKind::Image, origin)
    }

    pub fn start_video(&self, ui: &mut dyn UiSurface, origin: TaskOrigin) -> bool {
        self.trigger(ui, TaskKind::Video, origin)
    }

    pub fn start_live_capture(&self, ui: &mut dyn UiSurface, origin: TaskOrigin) -> bool {
        self.trigger(ui, TaskKind::LiveCapture, origin)
    }

    /// Try to start a task of `kind`. Must run on the UI thread.
    ///
    /// Returns `true` if a worker was started. A refusal never queues the
    /// request; the caller must trigger again.
    pub fn trigger(&self, ui: &mut dyn UiSurface, kind: TaskKind, origin: TaskOrigin) -> bool {
        let inner = &self.inner;
        if inner.gate.is_busy() {
            info!("{kind} refused: another task is running");
            ui.append_log("[提示] 目前已有任務執行中，請稍候。");
            inner.events.emit(CoreEvent::TaskRejected {
                kind,
                reason: RejectReason::Busy,
            });
            return false;
        }

        inner.speech.interrupt_current();
        inner.gate.revoke_permit();

        if matches!(kind, TaskKind::Image | TaskKind::LiveCapture)
            && *inner.preload.lock().unwrap_or_else(|e| e.into_inner()) == PreloadStatus::Loading
        {
            if origin.is_voice() {
                inner.speech.say(MODELS_LOADING, false);
            }
            ui.append_log(&format!("[提示] {MODELS_LOADING}"));
            self.refuse(kind, origin, RejectReason::ModelsLoading);
            return false;
        }

        let op = match self.prepare(ui, kind, origin) {
            Some(op) => op,
            None => {
                if origin.is_voice() {
                    inner.speech.say(OPERATION_CANCELLED, false);
                }
                ui.append_log(&format!("[提示] {OPERATION_CANCELLED}"));
                self.refuse(kind, origin, RejectReason::NoInput);
                return false;
            }
        };

        let Some(ticket) = inner.gate.try_acquire(kind) else {
            inner.events.emit(CoreEvent::TaskRejected {
                kind,
                reason: RejectReason::Busy,
            });
            return false;
        };
        let ticket = Arc::new(ticket);
        ui.clear_outputs();

        let cancel = CancelToken::new();
        if kind == TaskKind::LiveCapture {
            *inner.capture.lock().unwrap_or_else(|e| e.into_inner()) = Some(LiveCapture {
                ticket: Arc::clone(&ticket),
                cancel: cancel.clone(),
            });
        }

        inner.events.emit(CoreEvent::TaskStarted { kind, origin });
        match inner.runner.run(ticket, origin, cancel, op) {
            Ok(_) => true,
            Err(e) => {
                error!("{kind} could not start: {e}");
                inner.events.emit(CoreEvent::TaskRejected {
                    kind,
                    reason: RejectReason::SpawnFailed,
                });
                false
            }
        }
    }

    /// Collect input on the UI thread and build the operation.
    fn prepare(&self, ui: &mut dyn UiSurface, kind: TaskKind, origin: TaskOrigin) -> Option<Operation> {
        let inner = &self.inner;
        match kind {
            TaskKind::Image => {
                if origin.is_voice() {
                    inner.speech.say("請手動選擇圖片檔案，並輸入描述。", false);
                }
                let request = ui.request_image()?;
                if request.description.trim().is_empty() {
                    ui.append_log("[提示] 圖片描述不能為空。");
                    return None;
                }
                let resources = inner.resources.clone();
                let engine = Arc::clone(&inner.engine);
                Some(Box::new(move |ctx: &TaskContext| {
                    ctx.log("--- 開始執行圖像口述影像生成 ---");
                    let bundle = resources.ensure(false)?;
                    let result = engine.generate(&bundle, &request, &|line: &str| ctx.log(line))?;
                    Ok(TaskOutput::Narration(result))
                }))
            }
            TaskKind::Video => {
                if origin.is_voice() {
                    inner.speech.say("請手動選擇影片檔案，並輸入摘要。", false);
                }
                let request = ui.request_video()?;
                if request.summary.trim().is_empty() {
                    ui.append_log("[提示] 影片摘要不能為空。");
                    return None;
                }
                let video = Arc::clone(&inner.video);
                Some(Box::new(move |ctx: &TaskContext| {
                    ctx.log("--- 開始執行影片口述影像生成 ---");
                    let result = video.narrate(&request, &|line: &str| ctx.log(line))?;
                    Ok(TaskOutput::Video(result))
                }))
            }
            TaskKind::LiveCapture => {
                if origin.is_voice() {
                    inner.speech.say("請輸入相片的描述。", false);
                }
                let description = ui.request_capture_description()?;
                if description.trim().is_empty() {
                    ui.append_log("[提示] 相片描述不能為空。");
                    return None;
                }
                let resources = inner.resources.clone();
                let engine = Arc::clone(&inner.engine);
                let camera = Arc::clone(&inner.camera);
                let captures_dir = inner.config.capture.captures_dir.clone();
                let countdown = inner.config.capture.countdown_secs;
                Some(Box::new(move |ctx: &TaskContext| {
                    capture::run_countdown(countdown, COUNTDOWN_TICK, ctx.cancel(), &|word: &str| {
                        ctx.speech().say(word, true)
                    })?;
                    let image = capture::capture_path(&captures_dir)?;
                    camera.capture(&image)?;
                    ctx.log(&format!("影像已儲存至: {}", image.display()));
                    if ctx.cancel().is_cancelled() {
                        return Err(NarratorError::Cancelled("capture aborted".to_owned()));
                    }
                    let bundle = resources.ensure(false)?;
                    let request = ImageRequest { image, description };
                    let result = engine.generate(&bundle, &request, &|line: &str| ctx.log(line))?;
                    Ok(TaskOutput::Narration(result))
                }))
            }
        }
    }

    /// A trigger ended without starting a task: give the permit back, and
    /// re-arm the voice loop if a voice command asked for it.
    fn refuse(&self, kind: TaskKind, origin: TaskOrigin, reason: RejectReason) {
        info!("{kind} not started: {reason:?}");
        self.inner.events.emit(CoreEvent::TaskRejected { kind, reason });
        self.inner.gate.grant_permit();
        if origin.is_voice() {
            self.arm_voice_loop(self.inner.config.voice.retry_delay());
        }
    }

    /// Manual close of the live-capture window.
    ///
    /// Cancels the worker, releases the gate and grants the permit. The
    /// worker later finishes without rendering or speaking its result.
    /// Safe to race with the task epilogue: both sides are idempotent.
    /// Returns `false` if no live capture was running.
    pub fn abort_live_capture(&self) -> bool {
        let Some(capture) = self
            .inner
            .capture
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        else {
            return false;
        };
        if capture.ticket.is_released() {
            return false;
        }
        info!("live capture aborted by user");
        capture.cancel.cancel();
        self.inner.speech.interrupt_current();
        capture.ticket.release();
        self.inner.gate.grant_permit_if_idle();
        self.inner.ui.status("即時拍照 已取消");
        self.inner.speech.say(CANCELLED_NOTICE, false);
        true
    }

    // ── Resources ──────────────────────────────────────────────────────

    pub fn preload_status(&self) -> PreloadStatus {
        self.inner
            .preload
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_preload(&self, status: PreloadStatus) {
        *self.inner.preload.lock().unwrap_or_else(|e| e.into_inner()) = status.clone();
        self.inner.events.emit(CoreEvent::PreloadChanged { status });
    }

    /// Build the model resources on the background preload thread.
    pub fn start_preload(&self) -> bool {
        self.spawn_preload(false)
    }

    /// Rebuild the model resources, replacing the cached bundle.
    pub fn reload_resources(&self) -> bool {
        self.spawn_preload(true)
    }

    fn spawn_preload(&self, force_reload: bool) -> bool {
        {
            let mut status = self.inner.preload.lock().unwrap_or_else(|e| e.into_inner());
            if *status == PreloadStatus::Loading {
                debug!("preload already running");
                return false;
            }
            *status = PreloadStatus::Loading;
        }
        self.inner.events.emit(CoreEvent::PreloadChanged {
            status: PreloadStatus::Loading,
        });
        self.inner.ui.status("正在預載入模型...");

        let controller = self.clone();
        let spawned = std::thread::Builder::new()
            .name("preload".to_owned())
            .spawn(move || {
                let resources = &controller.inner.resources;
                match resources.ensure(force_reload) {
                    Ok(bundle) => {
                        controller.inner.ui.log(format!(
                            "[提示] 模型已載入: {}",
                            bundle.model_dir.display()
                        ));
                        controller.inner.ui.status("系統準備就緒");
                        controller.set_preload(PreloadStatus::Ready);
                    }
                    Err(e) => {
                        error!("preload failed: {e}");
                        controller.inner.ui.log(format!("[錯誤] 模型預載入失敗: {e}"));
                        controller.inner.ui.status("模型預載入失敗");
                        controller.set_preload(PreloadStatus::Failed(e.to_string()));
                    }
                }
            });
        if let Err(e) = spawned {
            error!("cannot spawn preload thread: {e}");
            self.set_preload(PreloadStatus::Failed(e.to_string()));
            return false;
        }
        true
    }

    // ── Voice loop ─────────────────────────────────────────────────────

    /// Start a fresh voice pass after `delay` on its own thread.
    ///
    /// Returns `false` (arming nothing) if voice is disabled or the UI is gone.
    pub fn arm_voice_loop(&self, delay: Duration) -> bool {
        if !self.voice_enabled() || !self.inner.ui.is_alive() {
            return false;
        }
        self.inner.events.emit(CoreEvent::VoiceLoopArmed { delay });
        let controller = self.clone();
        let mut voice = self.inner.config.voice.clone();
        voice.beginner_mode = self
            .inner
            .settings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .beginner_mode;
        let spawned = std::thread::Builder::new()
            .name("voice-pass".to_owned())
            .spawn(move || {
                std::thread::sleep(delay);
                let mut pass = VoicePass::new(voice);
                let outcome = pass.run(&controller);
                controller
                    .inner
                    .events
                    .emit(CoreEvent::VoicePassEnded { outcome });
            });
        if let Err(e) = spawned {
            error!("cannot spawn voice pass: {e}");
            return false;
        }
        true
    }

    /// Re-activate a dormant voice loop (after UI-triggered tasks).
    pub fn resume_voice(&self) -> bool {
        if self.inner.gate.is_busy() {
            return false;
        }
        self.inner.gate.grant_permit();
        self.arm_voice_loop(self.inner.config.voice.retry_delay())
    }

    /// Switch the custom voice profile and persist it.
    pub fn set_voice_profile(&self, name: Option<String>) {
        let mut settings = self.inner.settings.lock().unwrap_or_else(|e| e.into_inner());
        settings.set_active_profile(name, &self.inner.settings_path);
        self.inner.ui.log(format!(
            "[提示] 語音設定檔: {}",
            settings.current_profile.as_deref().unwrap_or("預設")
        ));
    }

    /// Speak the welcome text without blocking.
    pub fn welcome(&self) {
        self.inner.speech.say(WELCOME, false);
    }

    // ── Buttons ────────────────────────────────────────────────────────

    fn post_trigger_from(&self, kind: TaskKind, origin: TaskOrigin) -> bool {
        let controller = self.clone();
        self.inner
            .ui
            .post(move |ui| {
                controller.trigger(ui, kind, origin);
            })
            .is_some()
    }

    /// Handle a named button press from any thread.
    ///
    /// Returns `false` for unknown buttons.
    pub fn handle_button(&self, button: &str) -> bool {
        let (name, arg) = match button.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, Some(arg.trim())),
            None => (button, None),
        };
        match name.to_lowercase().as_str() {
            "image" => self.post_trigger_from(TaskKind::Image, TaskOrigin::Ui),
            "video" => self.post_trigger_from(TaskKind::Video, TaskOrigin::Ui),
            "live" | "camera" => self.post_trigger_from(TaskKind::LiveCapture, TaskOrigin::Ui),
            "close" => {
                let controller = self.clone();
                self.inner
                    .ui
                    .post(move |_| {
                        controller.abort_live_capture();
                    })
                    .is_some()
            }
            "stop" => {
                self.inner.speech.interrupt_current();
                true
            }
            "reload" => self.reload_resources(),
            "voice" => self.resume_voice(),
            "profile" => {
                self.set_voice_profile(arg.filter(|a| !a.is_empty()).map(str::to_owned));
                true
            }
            "quit" | "exit" => self.inner.ui.post(|ui| ui.request_shutdown()).is_some(),
            other => {
                warn!("unknown button: {other}");
                self.inner.ui.log(format!("[提示] 未知的指令: :{other}"));
                false
            }
        }
    }
}

impl VoiceHost for Controller {
    fn may_listen(&self) -> bool {
        self.voice_enabled() && self.inner.ui.is_alive() && self.inner.gate.may_start_voice_pass()
    }

    fn speak(&self, text: &str) {
        self.inner.speech.say(text, true);
    }

    fn cue(&self, cue: AudioCue) {
        self.inner.speech.cue(cue);
    }

    fn listen(&self, timeout: Duration) -> ListenOutcome {
        self.inner.recognizer.listen(timeout)
    }

    fn classify(&self, raw: &str) -> Intent {
        self.inner.classifier.classify(raw)
    }

    fn revoke_permit(&self) {
        self.inner.gate.revoke_permit();
    }

    fn post_trigger(&self, kind: TaskKind) {
        if !self.post_trigger_from(kind, TaskOrigin::Voice) {
            warn!("UI gone; voice command for {kind} dropped");
        }
    }

    fn request_rearm(&self, delay: Duration) {
        self.arm_voice_loop(delay);
    }

    fn request_shutdown(&self) {
        self.inner.ui.post(|ui| ui.request_shutdown());
    }
}
