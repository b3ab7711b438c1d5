//! Marshalling of UI updates from worker threads onto the UI thread.
//!
//! Workers hold a cloneable [`UiUpdater`] and post closures; the UI thread
//! owns the single [`UiQueue`] consumer and drains it periodically. Updates
//! are stamped with a sequence number at enqueue time and applied strictly
//! in that order.

use super::surface::UiSurface;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

/// A unit of UI work created off the UI thread.
pub type UiOperation = Box<dyn FnOnce(&mut dyn UiSurface) + Send + 'static>;

/// A queued update waiting for the next drain.
pub struct PendingUiUpdate {
    /// Monotonic enqueue stamp.
    pub seq: u64,
    op: UiOperation,
}

impl std::fmt::Debug for PendingUiUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingUiUpdate")
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

/// Result of one drain step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Updates that ran to completion.
    pub applied: usize,
    /// Updates that panicked (logged and skipped).
    pub failed: usize,
    /// Stamp of the last update taken off the queue.
    pub last_seq: Option<u64>,
}

struct Shared {
    /// Next stamp; held while sending so stamp order equals queue order.
    next_seq: Mutex<u64>,
    alive: AtomicBool,
}

/// Producer handle: post UI work from any thread.
#[derive(Clone)]
pub struct UiUpdater {
    tx: Sender<PendingUiUpdate>,
    shared: Arc<Shared>,
}

/// Consumer handle: owned by the UI thread.
pub struct UiQueue {
    rx: Receiver<PendingUiUpdate>,
    shared: Arc<Shared>,
}

/// Create a connected updater/queue pair.
pub fn ui_channel() -> (UiUpdater, UiQueue) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let shared = Arc::new(Shared {
        next_seq: Mutex::new(0),
        alive: AtomicBool::new(true),
    });
    (
        UiUpdater {
            tx,
            shared: Arc::clone(&shared),
        },
        UiQueue { rx, shared },
    )
}

impl std::fmt::Debug for UiUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiUpdater")
            .field("alive", &self.is_alive())
            .field("queued", &self.tx.len())
            .finish()
    }
}

impl UiUpdater {
    /// Enqueue `op` for the UI thread. Never runs it synchronously.
    ///
    /// Returns the enqueue stamp, or `None` if the UI is gone (the update is
    /// dropped silently).
    pub fn post<F>(&self, op: F) -> Option<u64>
    where
        F: FnOnce(&mut dyn UiSurface) + Send + 'static,
    {
        if !self.is_alive() {
            return None;
        }
        let mut next = self.shared.next_seq.lock().unwrap_or_else(|e| e.into_inner());
        let seq = *next;
        let update = PendingUiUpdate {
            seq,
            op: Box::new(op),
        };
        if self.tx.send(update).is_err() {
            self.shared.alive.store(false, Ordering::SeqCst);
            return None;
        }
        *next += 1;
        Some(seq)
    }

    /// Post a log line.
    pub fn log(&self, line: impl Into<String>) {
        let line = line.into();
        self.post(move |ui| ui.append_log(&line));
    }

    /// Post a status bar change.
    pub fn status(&self, text: impl Into<String>) {
        let text = text.into();
        self.post(move |ui| ui.set_status(&text));
    }

    /// Whether the UI side still exists.
    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }
}

impl UiQueue {
    /// Apply every update queued at the time of the call, in FIFO order.
    ///
    /// Updates posted while draining wait for the next drain, so a
    /// self-reposting update cannot starve the UI thread. A panicking
    /// update is logged and skipped; the rest still run.
    pub fn drain(&self, surface: &mut dyn UiSurface) -> DrainReport {
        let mut report = DrainReport::default();
        if !self.is_alive() {
            return report;
        }
        let queued = self.rx.len();
        for _ in 0..queued {
            let update = match self.rx.try_recv() {
                Ok(update) => update,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            };
            report.last_seq = Some(update.seq);
            let op = update.op;
            match catch_unwind(AssertUnwindSafe(|| op(&mut *surface))) {
                Ok(()) => report.applied += 1,
                Err(payload) => {
                    report.failed += 1;
                    error!(
                        "UI update #{} failed: {}",
                        update.seq,
                        panic_message(payload.as_ref())
                    );
                }
            }
            if surface.is_closed() {
                self.close();
                break;
            }
        }
        report
    }

    /// Number of updates waiting.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }

    /// Tear down: refuse further posts and discard what is queued.
    pub fn close(&self) {
        if self.shared.alive.swap(false, Ordering::SeqCst) {
            let dropped = self.rx.try_iter().count();
            debug!("UI queue closed, {dropped} pending updates dropped");
        }
    }
}

impl Drop for UiQueue {
    fn drop(&mut self) {
        self.shared.alive.store(false, Ordering::SeqCst);
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic>".to_owned()
    }
}
