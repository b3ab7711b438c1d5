//! Single-flight task state and the voice interaction permit.
//!
//! [`BusyGate`] owns both pieces of process-wide coordination state behind
//! one lock, so "may a voice pass start?" is answered atomically against
//! the task state. A task is started only through [`BusyGate::try_acquire`],
//! which hands out a [`BusyTicket`]; the ticket is the only way to release,
//! so a release without a matching acquire cannot be expressed.

use crate::ui::UiUpdater;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Execution state for foreground tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Busy,
}

/// The foreground task kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Image,
    Video,
    LiveCapture,
}

impl TaskKind {
    /// Human-readable label used in log and status lines.
    pub fn label(self) -> &'static str {
        match self {
            Self::Image => "image narration",
            Self::Video => "video narration",
            Self::LiveCapture => "live capture",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Who asked for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOrigin {
    /// Dispatched by a voice pass; completion re-arms the voice loop.
    Voice,
    /// Direct UI interaction; completion leaves the voice loop dormant.
    Ui,
}

impl TaskOrigin {
    pub fn is_voice(self) -> bool {
        matches!(self, Self::Voice)
    }
}

#[derive(Debug)]
struct GateState {
    task: TaskState,
    /// Ticket id of the outstanding busy period.
    active: Option<u64>,
    next_ticket: u64,
    permit: bool,
    /// A voice re-arm owed by a task that finished after losing the gate.
    deferred_rearm: bool,
}

#[derive(Debug)]
struct GateShared {
    state: Mutex<GateState>,
    ui: UiUpdater,
}

impl GateShared {
    fn lock(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Mutual-exclusion gate for foreground tasks plus the voice permit.
///
/// Busy transitions mirror into the UI (controls disabled, progress
/// indicator running) through the update queue; if the UI is gone those
/// side effects are dropped and the state transition still happens.
#[derive(Debug, Clone)]
pub struct BusyGate {
    shared: Arc<GateShared>,
}

impl BusyGate {
    /// Create an idle gate with the permit granted.
    pub fn new(ui: UiUpdater) -> Self {
        Self {
            shared: Arc::new(GateShared {
                state: Mutex::new(GateState {
                    task: TaskState::Idle,
                    active: None,
                    next_ticket: 1,
                    permit: true,
                    deferred_rearm: false,
                }),
                ui,
            }),
        }
    }

    /// Transition Idle→Busy and revoke the voice permit, atomically.
    ///
    /// Returns `None` (and changes nothing) if a task is already running.
    pub fn try_acquire(&self, kind: TaskKind) -> Option<BusyTicket> {
        let id = {
            let mut state = self.shared.lock();
            if state.task == TaskState::Busy {
                debug!("busy gate refused {kind}: ticket #{:?} outstanding", state.active);
                return None;
            }
            let id = state.next_ticket;
            state.next_ticket += 1;
            state.task = TaskState::Busy;
            state.active = Some(id);
            state.permit = false;
            id
        };
        info!("busy gate acquired for {kind} (ticket #{id})");
        self.shared.ui.post(|ui| ui.set_busy(true));
        Some(BusyTicket {
            id,
            kind,
            shared: Arc::clone(&self.shared),
            released: AtomicBool::new(false),
        })
    }

    pub fn state(&self) -> TaskState {
        self.shared.lock().task
    }

    pub fn is_busy(&self) -> bool {
        self.state() == TaskState::Busy
    }

    pub fn permit_granted(&self) -> bool {
        self.shared.lock().permit
    }

    /// Forbid new voice passes (a task-starting action has begun).
    pub fn revoke_permit(&self) {
        self.shared.lock().permit = false;
    }

    /// Allow new voice passes again. Idempotent.
    pub fn grant_permit(&self) {
        self.shared.lock().permit = true;
    }

    /// Grant the permit only if no task holds the gate.
    ///
    /// Returns whether the permit was granted.
    pub fn grant_permit_if_idle(&self) -> bool {
        let mut state = self.shared.lock();
        if state.active.is_some() {
            return false;
        }
        state.permit = true;
        true
    }

    /// Terminal bookkeeping for a finished task, after its ticket released.
    ///
    /// If the gate is idle the permit is granted and the return value says
    /// whether to arm a voice pass: `wants_rearm`, or a re-arm deferred by
    /// an earlier task. If a newer task holds the gate nothing is granted;
    /// a wanted re-arm is deferred to that task's cleanup instead.
    pub fn finish_task(&self, wants_rearm: bool) -> bool {
        let mut state = self.shared.lock();
        if state.active.is_some() {
            if wants_rearm {
                debug!("re-arm deferred to ticket #{:?}", state.active);
                state.deferred_rearm = true;
            }
            return false;
        }
        state.permit = true;
        let deferred = std::mem::take(&mut state.deferred_rearm);
        wants_rearm || deferred
    }

    /// Whether a voice pass may start: permit granted and no task running.
    pub fn may_start_voice_pass(&self) -> bool {
        let state = self.shared.lock();
        state.permit && state.task == TaskState::Idle
    }
}

/// Proof of an outstanding busy period.
///
/// Releasing is idempotent; dropping the ticket releases it, so a worker
/// that unwinds still returns the gate to Idle.
#[derive(Debug)]
pub struct BusyTicket {
    id: u64,
    kind: TaskKind,
    shared: Arc<GateShared>,
    released: AtomicBool,
}

impl BusyTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Transition Busy→Idle if this ticket still owns the gate.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        {
            let mut state = self.shared.lock();
            if state.active != Some(self.id) {
                return false;
            }
            state.task = TaskState::Idle;
            state.active = None;
        }
        info!("busy gate released by {} (ticket #{})", self.kind, self.id);
        self.shared.ui.post(|ui| ui.set_busy(false));
        true
    }
}

impl Drop for BusyTicket {
    fn drop(&mut self) {
        self.release();
    }
}
