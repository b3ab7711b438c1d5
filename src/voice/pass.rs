//! One single-shot pass of the voice interaction loop.
//!
//! A pass never loops on itself. It either declines to start, dispatches a
//! task trigger (the task's epilogue re-arms the loop), schedules shutdown,
//! or explicitly asks its host for a fresh pass after a delay.

use super::intent::Intent;
use super::recognizer::ListenOutcome;
use crate::config::VoiceConfig;
use crate::gate::TaskKind;
use crate::speech::AudioCue;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const COMMAND_PROMPT: &str = "請說出指令：生成圖像、生成影片、即時拍照，或 結束";
pub const BEGINNER_HINT: &str = "。聆聽中，請在提示音後說話";
pub const NO_SOUND_PROMPT: &str = "沒有聽到聲音，請再說一次";
pub const UNINTELLIGIBLE_PROMPT: &str = "聽不清楚，請大聲一點";
pub const RECOGNITION_ERROR_PROMPT: &str = "語音辨識時發生錯誤，請檢查麥克風或網路連線。";
pub const UNRECOGNIZED_PROMPT: &str = "無法辨識指令，請重新說一次";
pub const FAREWELL: &str = "感謝您的使用，系統即將關閉";

/// Spoken before posting the trigger for `kind`.
pub fn starting_notice(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::Image => "正在啟動圖像口述影像生成程序。",
        TaskKind::Video => "正在啟動影片口述影像生成程序，請稍後片刻。",
        TaskKind::LiveCapture => "正在啟動即時拍照功能。",
    }
}

/// States of a pass, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    WaitingForPermit,
    Listening,
    Classifying,
    Dispatching,
    Terminated,
}

/// Why a pass asked for a retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryReason {
    Timeout,
    Unintelligible,
    /// Recognized text matched no keyword.
    Unrecognized(String),
    RecognitionFailed(String),
}

/// How a pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Permit revoked, task running, voice disabled, or UI gone.
    Declined,
    /// A task trigger was posted to the UI thread.
    Dispatched(TaskKind),
    /// A fresh pass was requested.
    Retry(RetryReason),
    /// Shutdown was requested.
    Exit,
}

/// What a pass needs from the coordinator.
pub trait VoiceHost {
    /// Voice enabled, UI alive, permit granted and no task running.
    fn may_listen(&self) -> bool;
    /// Speak and wait for playback to end.
    fn speak(&self, text: &str);
    fn cue(&self, cue: AudioCue);
    fn listen(&self, timeout: Duration) -> ListenOutcome;
    fn classify(&self, raw: &str) -> Intent;
    fn revoke_permit(&self);
    /// Post the trigger for `kind` to the UI thread as a voice-originated task.
    fn post_trigger(&self, kind: TaskKind);
    /// Arm a fresh pass after `delay`.
    fn request_rearm(&self, delay: Duration);
    fn request_shutdown(&self);
}

/// A single pass through the voice state machine.
#[derive(Debug)]
pub struct VoicePass {
    config: VoiceConfig,
    state: PassState,
    history: Vec<PassState>,
}

impl VoicePass {
    pub fn new(config: VoiceConfig) -> Self {
        Self {
            config,
            state: PassState::WaitingForPermit,
            history: vec![PassState::WaitingForPermit],
        }
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    /// Every state entered so far, starting with `WaitingForPermit`.
    pub fn history(&self) -> &[PassState] {
        &self.history
    }

    fn enter(&mut self, state: PassState) {
        debug!("voice pass: {:?} -> {state:?}", self.state);
        self.state = state;
        self.history.push(state);
    }

    fn terminate(&mut self, outcome: PassOutcome) -> PassOutcome {
        self.enter(PassState::Terminated);
        info!("voice pass ended: {outcome:?}");
        outcome
    }

    /// Drive the pass to `Terminated`.
    pub fn run(&mut self, host: &dyn VoiceHost) -> PassOutcome {
        if !host.may_listen() {
            return self.terminate(PassOutcome::Declined);
        }
        std::thread::sleep(self.config.settle_delay());
        if !host.may_listen() {
            return self.terminate(PassOutcome::Declined);
        }

        if self.config.beginner_mode {
            host.speak(&format!("{COMMAND_PROMPT}{BEGINNER_HINT}"));
        } else {
            host.speak(COMMAND_PROMPT);
        }
        // A UI-triggered task may have started while the prompt played.
        if !host.may_listen() {
            return self.terminate(PassOutcome::Declined);
        }

        host.cue(AudioCue::Listening);
        self.enter(PassState::Listening);
        let heard = match host.listen(self.config.listen_timeout()) {
            ListenOutcome::Command(text) => text,
            ListenOutcome::Timeout => {
                self.enter(PassState::Dispatching);
                host.speak(NO_SOUND_PROMPT);
                host.request_rearm(self.config.retry_delay());
                return self.terminate(PassOutcome::Retry(RetryReason::Timeout));
            }
            ListenOutcome::Unintelligible => {
                self.enter(PassState::Dispatching);
                host.speak(UNINTELLIGIBLE_PROMPT);
                host.request_rearm(self.config.retry_delay());
                return self.terminate(PassOutcome::Retry(RetryReason::Unintelligible));
            }
            ListenOutcome::Error(message) => {
                warn!("speech recognition failed: {message}");
                self.enter(PassState::Dispatching);
                host.speak(RECOGNITION_ERROR_PROMPT);
                host.cue(AudioCue::Error);
                host.request_rearm(self.config.error_backoff());
                return self.terminate(PassOutcome::Retry(RetryReason::RecognitionFailed(
                    message,
                )));
            }
        };

        self.enter(PassState::Classifying);
        let intent = host.classify(&heard);
        info!("voice command {heard:?} classified as {intent:?}");

        self.enter(PassState::Dispatching);
        match intent {
            Intent::Exit => {
                host.speak(FAREWELL);
                host.cue(AudioCue::Success);
                host.request_shutdown();
                self.terminate(PassOutcome::Exit)
            }
            Intent::Unrecognized(text) => {
                host.speak(UNRECOGNIZED_PROMPT);
                host.cue(AudioCue::Error);
                host.request_rearm(self.config.retry_delay());
                self.terminate(PassOutcome::Retry(RetryReason::Unrecognized(text)))
            }
            action => match action.task_kind() {
                Some(kind) => {
                    host.revoke_permit();
                    host.speak(starting_notice(kind));
                    host.post_trigger(kind);
                    self.terminate(PassOutcome::Dispatched(kind))
                }
                None => self.terminate(PassOutcome::Declined),
            },
        }
    }
}
