//! End-to-end voice passes against scripted recognition.

use crate::helpers::{REARM_MS, RETRY_MS, Rig, RigOptions, image_request};
use narrator::voice::pass::{COMMAND_PROMPT, FAREWELL, UNRECOGNIZED_PROMPT, starting_notice};
use narrator::voice::{ListenOutcome, PassOutcome, RetryReason};
use narrator::{CoreEvent, TaskKind, TaskOrigin};
use std::time::Duration;

fn armed_with(delay_ms: u64) -> impl Fn(&CoreEvent) -> bool {
    move |e| {
        *e == CoreEvent::VoiceLoopArmed {
            delay: Duration::from_millis(delay_ms),
        }
    }
}

#[test]
fn spoken_image_command_runs_one_task_and_rearms_once() {
    let mut rig = Rig::new(RigOptions {
        voice: true,
        script: vec![ListenOutcome::Command("生成圖像".to_owned())],
        ..RigOptions::default()
    });
    rig.surface.images.push_back(Some(image_request("一隻貓")));

    assert!(rig.controller.arm_voice_loop(Duration::ZERO));
    rig.pump_until(|e| matches!(e, CoreEvent::TaskFinished { .. }));
    rig.pump_until(armed_with(REARM_MS));
    rig.controller.set_voice_enabled(false);
    rig.pump_for(Duration::from_millis(60));

    assert!(rig.seen.contains(&CoreEvent::VoicePassEnded {
        outcome: PassOutcome::Dispatched(TaskKind::Image),
    }));
    assert!(rig.seen.contains(&CoreEvent::TaskStarted {
        kind: TaskKind::Image,
        origin: TaskOrigin::Voice,
    }));
    assert!(rig.seen.contains(&CoreEvent::TaskFinished {
        kind: TaskKind::Image,
        origin: TaskOrigin::Voice,
        success: true,
    }));
    assert_eq!(rig.count(armed_with(REARM_MS)), 1);

    let started = rig
        .position(|e| matches!(e, CoreEvent::TaskStarted { .. }))
        .unwrap();
    let finished = rig
        .position(|e| matches!(e, CoreEvent::TaskFinished { .. }))
        .unwrap();
    assert!(
        rig.seen[started..finished]
            .iter()
            .all(|e| !matches!(e, CoreEvent::VoiceLoopArmed { .. })),
        "no pass armed while the task runs"
    );

    let spoken = rig.spoken();
    assert_eq!(spoken[0], COMMAND_PROMPT);
    assert!(spoken.iter().any(|t| t == starting_notice(TaskKind::Image)));
    assert_eq!(rig.surface.narrations.len(), 1);
    rig.shutdown();
}

#[test]
fn gibberish_is_rejected_and_retried() {
    let mut rig = Rig::new(RigOptions {
        voice: true,
        script: vec![ListenOutcome::Command("asdjkl".to_owned())],
        ..RigOptions::default()
    });

    assert!(rig.controller.arm_voice_loop(Duration::ZERO));
    rig.pump_until(|e| matches!(e, CoreEvent::VoicePassEnded { .. }));
    rig.controller.set_voice_enabled(false);

    let ended = rig
        .position(|e| matches!(e, CoreEvent::VoicePassEnded { .. }))
        .unwrap();
    assert!(
        rig.seen[..ended].iter().any(armed_with(RETRY_MS)),
        "retry armed before the pass ends"
    );

    assert_eq!(
        rig.seen
            .iter()
            .find(|e| matches!(e, CoreEvent::VoicePassEnded { .. })),
        Some(&CoreEvent::VoicePassEnded {
            outcome: PassOutcome::Retry(RetryReason::Unrecognized("asdjkl".to_owned())),
        })
    );
    assert!(rig.spoken().iter().any(|t| t == UNRECOGNIZED_PROMPT));
    assert_eq!(
        rig.count(|e| matches!(e, CoreEvent::TaskStarted { .. })),
        0
    );
    rig.shutdown();
}

#[test]
fn exit_command_says_goodbye_and_closes_the_window() {
    let mut rig = Rig::new(RigOptions {
        voice: true,
        script: vec![ListenOutcome::Command("結束".to_owned())],
        ..RigOptions::default()
    });

    assert!(rig.controller.arm_voice_loop(Duration::ZERO));
    rig.pump_until(|e| {
        *e == CoreEvent::VoicePassEnded {
            outcome: PassOutcome::Exit,
        }
    });
    rig.pump_for(Duration::from_millis(20));

    assert!(rig.surface.closed);
    assert!(rig.spoken().iter().any(|t| t == FAREWELL));
    assert_eq!(
        rig.count(|e| matches!(e, CoreEvent::VoiceLoopArmed { .. })),
        1,
        "only the initial arm"
    );
    rig.shutdown();
}

#[test]
fn cancelled_voice_dialog_rearms_the_loop() {
    let mut rig = Rig::new(RigOptions {
        voice: true,
        script: vec![ListenOutcome::Command("生成影片".to_owned())],
        ..RigOptions::default()
    });
    rig.surface.videos.push_back(None);

    assert!(rig.controller.arm_voice_loop(Duration::ZERO));
    rig.pump_until(|e| matches!(e, CoreEvent::TaskRejected { .. }));
    rig.pump_until(armed_with(RETRY_MS));
    rig.controller.set_voice_enabled(false);

    assert!(rig.seen.contains(&CoreEvent::SpeechStarted {
        text: "操作已取消".to_owned(),
    }));
    assert!(rig.controller.gate().permit_granted());
    rig.shutdown();
}

#[test]
fn no_pass_listens_once_the_ui_is_gone() {
    let rig = Rig::new(RigOptions {
        voice: true,
        ..RigOptions::default()
    });
    rig.queue.close();
    assert!(!rig.controller.arm_voice_loop(Duration::ZERO));
}
