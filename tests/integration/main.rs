//! Integration test binary: all integration tests in one target.

// Allow unwrap/expect in test code
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod helpers;

mod resources;
mod task_flow;
mod ui_queue;
mod voice_flow;
