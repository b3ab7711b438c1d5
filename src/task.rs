//! Worker-thread execution of one foreground task and the shared epilogue.
//!
//! Every task kind goes through [`TaskRunner::run`]. The worker reports
//! through the UI queue, speaks the outcome, and then always runs the
//! epilogue: release the busy gate, grant the voice permit, and re-arm the
//! voice loop if the task came from a voice command. Panics in the
//! operation or in reporting are caught so the epilogue still runs.

use crate::cancel::CancelToken;
use crate::error::{NarratorError, Result};
use crate::events::{CoreEvent, EventSink};
use crate::gate::{BusyGate, BusyTicket, TaskKind, TaskOrigin};
use crate::narration::{NarrationResult, VideoResult};
use crate::speech::{AudioCue, SpeechController};
use crate::ui::UiUpdater;
use crate::ui::updater::panic_message;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};

/// What a successful operation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutput {
    Narration(NarrationResult),
    Video(VideoResult),
}

/// The long-running work of a task. Runs on the worker thread.
pub type Operation = Box<dyn FnOnce(&TaskContext) -> Result<TaskOutput> + Send + 'static>;

/// Requests a new voice pass after the given delay.
pub type RearmHook = Arc<dyn Fn(Duration) + Send + Sync>;

/// Handles an operation may use while it runs.
pub struct TaskContext {
    kind: TaskKind,
    origin: TaskOrigin,
    ui: UiUpdater,
    speech: SpeechController,
    cancel: CancelToken,
}

impl TaskContext {
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn origin(&self) -> TaskOrigin {
        self.origin
    }

    /// Append a line to the UI log (via the queue).
    pub fn log(&self, line: &str) {
        self.ui.log(line);
    }

    pub fn status(&self, text: &str) {
        self.ui.status(text);
    }

    pub fn speech(&self) -> &SpeechController {
        &self.speech
    }

    /// Fires when the user aborts the task (live capture only).
    pub fn cancel(&self) -> &CancelToken {
        &self.cancel
    }
}

/// Name of the task kind as spoken and shown to the user.
pub fn display_name(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::Image => "圖像",
        TaskKind::Video => "影片",
        TaskKind::LiveCapture => "即時拍照",
    }
}

pub const CANCELLED_NOTICE: &str = "取消操作";

/// Runs operations on worker threads and owns the task epilogue.
#[derive(Clone)]
pub struct TaskRunner {
    gate: BusyGate,
    ui: UiUpdater,
    speech: SpeechController,
    events: EventSink,
    rearm: RearmHook,
    rearm_delay: Duration,
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("rearm_delay", &self.rearm_delay)
            .finish_non_exhaustive()
    }
}

impl TaskRunner {
    pub fn new(
        gate: BusyGate,
        ui: UiUpdater,
        speech: SpeechController,
        events: EventSink,
        rearm: RearmHook,
        rearm_delay: Duration,
    ) -> Self {
        Self {
            gate,
            ui,
            speech,
            events,
            rearm,
            rearm_delay,
        }
    }

    /// Run `op` on a new worker thread.
    ///
    /// The caller has already acquired `ticket` and interrupted speech.
    /// If the thread cannot be spawned the epilogue runs here and the
    /// spawn error is returned.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error if the worker thread cannot be spawned.
    pub fn run(
        &self,
        ticket: Arc<BusyTicket>,
        origin: TaskOrigin,
        cancel: CancelToken,
        op: Operation,
    ) -> Result<JoinHandle<()>> {
        let kind = ticket.kind();
        let runner = self.clone();
        let worker_ticket = Arc::clone(&ticket);
        let spawned = std::thread::Builder::new()
            .name(format!("task-{}", kind.label().replace(' ', "-")))
            .spawn(move || runner.work(&worker_ticket, origin, cancel, op));
        match spawned {
            Ok(handle) => Ok(handle),
            Err(e) => {
                error!("cannot spawn worker for {kind}: {e}");
                self.epilogue(&ticket, origin, false);
                Err(NarratorError::Io(e))
            }
        }
    }

    fn work(&self, ticket: &BusyTicket, origin: TaskOrigin, cancel: CancelToken, op: Operation) {
        let kind = ticket.kind();
        let ctx = TaskContext {
            kind,
            origin,
            ui: self.ui.clone(),
            speech: self.speech.clone(),
            cancel,
        };
        info!("{kind} started ({origin:?})");
        ctx.status(&format!("正在執行 {} 程序...", display_name(kind)));

        let mut outcome = catch_unwind(AssertUnwindSafe(|| op(&ctx)));
        let already_cancelled = matches!(outcome, Ok(Err(NarratorError::Cancelled(_))));
        if ctx.cancel.is_cancelled() && !already_cancelled {
            info!("{kind} finished after cancellation; result discarded");
            outcome = Ok(Err(NarratorError::Cancelled("cancelled while running".to_owned())));
        }
        let aborted = ticket.is_released();
        let reported = catch_unwind(AssertUnwindSafe(|| self.report(&ctx, outcome, aborted)));
        let success = match reported {
            Ok(success) => success,
            Err(payload) => {
                error!("{kind} reporting panicked: {}", panic_message(payload.as_ref()));
                false
            }
        };
        self.epilogue(ticket, origin, success);
    }

    /// Deliver the outcome to the user. Returns whether the task succeeded.
    ///
    /// `aborted` means the gate was already handed back by the user; the
    /// cancel notice was spoken then and is not repeated here.
    fn report(
        &self,
        ctx: &TaskContext,
        outcome: std::thread::Result<Result<TaskOutput>>,
        aborted: bool,
    ) -> bool {
        let kind = ctx.kind;
        let name = display_name(kind);
        match outcome {
            Ok(Ok(output)) => {
                info!("{kind} succeeded");
                ctx.log(&format!("--- {name}口述影像生成成功 ---"));
                ctx.status(&format!("{name} 完成"));
                self.render(ctx, output);
                true
            }
            Ok(Err(NarratorError::Cancelled(reason))) => {
                info!("{kind} cancelled: {reason}");
                ctx.log(&format!("[提示] {name}已取消"));
                if !aborted {
                    ctx.status(&format!("{name} 已取消"));
                    self.speech.say(CANCELLED_NOTICE, true);
                }
                false
            }
            Ok(Err(e)) => {
                error!("{kind} failed: {e}");
                ctx.log(&format!("[錯誤] {e}"));
                let notice = if e.is_configuration() {
                    ctx.status(&format!("{name} 失敗 (設定錯誤)"));
                    format!("啟動{name}失敗，找不到檔案或設定")
                } else {
                    ctx.status(&format!("{name} 執行失敗"));
                    format!("{name}處理時發生錯誤")
                };
                self.speech.say(&notice, true);
                self.speech.cue(AudioCue::Error);
                false
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("{kind} panicked: {message}");
                ctx.log(&format!("[錯誤] {name}發生未預期的錯誤: {message}"));
                ctx.status(&format!("{name} 失敗 (未知錯誤)"));
                self.speech.say(&format!("{name}時發生未知錯誤"), true);
                self.speech.cue(AudioCue::Error);
                false
            }
        }
    }

    /// Post the result to the UI, then announce it.
    fn render(&self, ctx: &TaskContext, output: TaskOutput) {
        let name = display_name(ctx.kind);
        match output {
            TaskOutput::Narration(result) => {
                let text = result.text.clone();
                self.ui.post(move |ui| ui.show_narration(&result));
                self.speech.cue(AudioCue::Success);
                self.speech.say(&format!("{name} 處理完成"), true);
                self.speech.say(&text, true);
            }
            TaskOutput::Video(result) => {
                match result.video.filter(|p| p.is_file()) {
                    Some(path) => {
                        ctx.log(&format!("[提示] 影片已生成: {}", path.display()));
                        self.ui.post(move |ui| ui.show_video(&path));
                    }
                    None => {
                        warn!("video narration reported no playable file");
                        ctx.log("[警告] 未找到生成的影片檔案路徑或檔案不存在。");
                    }
                }
                self.speech.cue(AudioCue::Success);
                self.speech.say(&format!("{name} 處理完成"), true);
                if let Some(text) = result.narration {
                    ctx.log(&text);
                    self.speech.say(&text, true);
                }
            }
        }
    }

    /// Terminal cleanup shared by every task kind. Idempotent per ticket.
    ///
    /// A task that lost the gate to an abort leaves the permit alone while
    /// a newer task runs; its voice re-arm passes to that task's cleanup.
    pub fn epilogue(&self, ticket: &BusyTicket, origin: TaskOrigin, success: bool) {
        let kind = ticket.kind();
        ticket.release();
        let rearm = self.gate.finish_task(origin.is_voice());
        self.events.emit(CoreEvent::TaskFinished {
            kind,
            origin,
            success,
        });
        if rearm {
            (self.rearm)(self.rearm_delay);
        }
    }
}
