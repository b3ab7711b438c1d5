//! UI thread plumbing: the surface trait, the update queue, and the loop
//! that drains it.

pub mod console;
pub mod surface;
pub mod updater;

pub use surface::UiSurface;
pub use updater::{DrainReport, PendingUiUpdate, UiQueue, UiUpdater, ui_channel};

use std::time::Duration;
use tracing::info;

/// Cooperative UI event loop: drain, then sleep one interval.
///
/// Owns the surface and the queue consumer, so every surface mutation
/// happens on the thread that calls [`UiLoop::run`].
pub struct UiLoop {
    surface: Box<dyn UiSurface>,
    queue: UiQueue,
    interval: Duration,
}

impl UiLoop {
    pub fn new(surface: Box<dyn UiSurface>, queue: UiQueue, interval: Duration) -> Self {
        Self {
            surface,
            queue,
            interval,
        }
    }

    /// Run one drain step.
    pub fn tick(&mut self) -> DrainReport {
        self.queue.drain(self.surface.as_mut())
    }

    /// Drain periodically until the surface closes or the queue is torn down.
    pub fn run(mut self) {
        loop {
            self.tick();
            if self.surface.is_closed() || !self.queue.is_alive() {
                break;
            }
            std::thread::sleep(self.interval);
        }
        self.queue.close();
        info!("UI loop stopped");
    }
}


#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::ui::testing::RecordingSurface;

    #[test]
    fn loop_exits_when_surface_requests_shutdown() {
        let (ui, queue) = ui_channel();
        ui.status("ready");
        ui.post(|s| s.request_shutdown());

        let handle = std::thread::spawn(move || {
            UiLoop::new(
                Box::new(RecordingSurface::default()),
                queue,
                Duration::from_millis(5),
            )
            .run();
        });
        handle.join().unwrap();

        assert!(!ui.is_alive());
    }
}
