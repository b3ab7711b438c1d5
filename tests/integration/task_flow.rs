//! Task triggers, single-flight gating and the task epilogue.

use crate::helpers::{EngineMode, Rig, RigOptions, image_request};
use narrator::controller::WELCOME;
use narrator::{CoreEvent, RejectReason, SpeechOutcome, TaskKind, TaskOrigin, TaskState};
use std::time::{Duration, Instant};

fn finished(e: &CoreEvent) -> bool {
    matches!(e, CoreEvent::TaskFinished { .. })
}

#[test]
fn concurrent_button_presses_start_one_task() {
    let mut rig = Rig::new(RigOptions::default());
    rig.surface.images.push_back(Some(image_request("一隻貓")));
    rig.surface.images.push_back(Some(image_request("一隻狗")));

    let presses: Vec<_> = (0..2)
        .map(|_| {
            let controller = rig.controller.clone();
            std::thread::spawn(move || controller.handle_button("image"))
        })
        .collect();
    for press in presses {
        assert!(press.join().unwrap());
    }

    rig.pump_until(finished);
    assert_eq!(
        rig.count(|e| matches!(e, CoreEvent::TaskStarted { .. })),
        1
    );
    assert!(rig.seen.contains(&CoreEvent::TaskRejected {
        kind: TaskKind::Image,
        reason: RejectReason::Busy,
    }));
    assert_eq!(rig.surface.images.len(), 1, "second dialog never shown");
    rig.shutdown();
}

#[test]
fn speech_is_interrupted_before_the_task_speaks() {
    let mut rig = Rig::new(RigOptions {
        time_scale: 1.0,
        long_text: Some(WELCOME.to_owned()),
        ..RigOptions::default()
    });
    rig.surface.images.push_back(Some(image_request("一隻貓")));

    let speech = rig.controller.speech().clone();
    let welcome = std::thread::spawn(move || speech.speak(WELCOME, true).unwrap());
    let deadline = Instant::now() + Duration::from_secs(5);
    while !rig.spoken().iter().any(|t| t == WELCOME) {
        assert!(Instant::now() < deadline, "welcome never synthesized");
        std::thread::sleep(Duration::from_millis(2));
    }
    std::thread::sleep(Duration::from_millis(50));

    assert!(
        rig.controller
            .start_image(&mut rig.surface, TaskOrigin::Ui)
    );
    assert_eq!(welcome.join().unwrap(), SpeechOutcome::Interrupted);
    rig.pump_until(finished);

    let interrupted = rig
        .position(|e| *e == CoreEvent::SpeechInterrupted { was_playing: true })
        .expect("welcome was still playing when the task started");
    let started = rig
        .position(|e| matches!(e, CoreEvent::TaskStarted { .. }))
        .unwrap();
    let task_speech = rig
        .seen
        .iter()
        .enumerate()
        .skip(started)
        .find(|(_, e)| matches!(e, CoreEvent::SpeechStarted { .. }))
        .map(|(i, _)| i)
        .unwrap();
    assert!(interrupted < started);
    assert!(interrupted < task_speech);

    let timeline = rig.timeline();
    let welcome_end = timeline
        .iter()
        .position(|line| line.starts_with("end:") && line.ends_with(":Interrupted"))
        .expect("welcome playback ended interrupted");
    let first_task_say = timeline
        .iter()
        .position(|line| line.starts_with("say:") && line != &format!("say:{WELCOME}"))
        .unwrap();
    assert!(welcome_end < first_task_say, "timeline: {timeline:?}");
    rig.shutdown();
}

#[test]
fn successful_image_task_renders_then_announces() {
    let mut rig = Rig::new(RigOptions::default());
    rig.surface.images.push_back(Some(image_request("一隻貓")));

    assert!(
        rig.controller
            .start_image(&mut rig.surface, TaskOrigin::Ui)
    );
    rig.pump_until(finished);

    assert_eq!(rig.surface.cleared, 1);
    assert_eq!(rig.surface.narrations.len(), 1);
    assert_eq!(rig.surface.narrations[0].text, "畫面中有一隻貓");
    let spoken = rig.spoken();
    let done = spoken.iter().position(|t| t == "圖像 處理完成").unwrap();
    assert_eq!(spoken[done + 1], "畫面中有一隻貓");
    assert_eq!(rig.controller.gate().state(), TaskState::Idle);
    rig.shutdown();
}

#[test]
fn failing_task_restores_idle_and_permit() {
    let mut rig = Rig::new(RigOptions {
        engine: EngineMode::Fail,
        ..RigOptions::default()
    });
    rig.surface.images.push_back(Some(image_request("一隻貓")));

    assert!(
        rig.controller
            .start_image(&mut rig.surface, TaskOrigin::Ui)
    );
    rig.pump_until(finished);

    assert!(rig.seen.contains(&CoreEvent::TaskFinished {
        kind: TaskKind::Image,
        origin: TaskOrigin::Ui,
        success: false,
    }));
    assert_eq!(rig.controller.gate().state(), TaskState::Idle);
    assert!(rig.controller.gate().permit_granted());
    assert!(rig.surface.log.iter().any(|l| l.contains("model crashed")));
    assert!(rig.surface.narrations.is_empty());
    rig.shutdown();
}

#[test]
fn panicking_task_restores_idle_and_permit() {
    let mut rig = Rig::new(RigOptions {
        engine: EngineMode::Panic,
        ..RigOptions::default()
    });
    rig.surface.images.push_back(Some(image_request("一隻貓")));

    assert!(
        rig.controller
            .start_image(&mut rig.surface, TaskOrigin::Ui)
    );
    rig.pump_until(finished);

    assert_eq!(rig.controller.gate().state(), TaskState::Idle);
    assert!(rig.controller.gate().permit_granted());

    rig.surface.images.push_back(Some(image_request("再一次")));
    assert!(
        rig.controller
            .start_image(&mut rig.surface, TaskOrigin::Ui),
        "gate usable after a panic"
    );
    rig.shutdown();
}

#[test]
fn ui_task_never_arms_the_voice_loop() {
    let mut rig = Rig::new(RigOptions {
        voice: true,
        ..RigOptions::default()
    });
    rig.surface.images.push_back(Some(image_request("一隻貓")));

    assert!(
        rig.controller
            .start_image(&mut rig.surface, TaskOrigin::Ui)
    );
    rig.pump_until(finished);
    rig.pump_for(Duration::from_millis(100));

    assert_eq!(
        rig.count(|e| matches!(e, CoreEvent::VoiceLoopArmed { .. })),
        0
    );
    rig.shutdown();
}

#[test]
fn aborted_voice_capture_rearms_exactly_once() {
    let mut rig = Rig::new(RigOptions {
        voice: true,
        countdown_secs: 3,
        ..RigOptions::default()
    });
    rig.surface.descriptions.push_back(Some("桌上的杯子".to_owned()));

    assert!(
        rig.controller
            .start_live_capture(&mut rig.surface, TaskOrigin::Voice)
    );
    assert!(rig.controller.abort_live_capture());
    assert!(!rig.controller.abort_live_capture());
    assert_eq!(rig.controller.gate().state(), TaskState::Idle);

    rig.pump_until(finished);
    rig.pump_until(|e| matches!(e, CoreEvent::VoiceLoopArmed { .. }));
    rig.controller.set_voice_enabled(false);
    rig.pump_for(Duration::from_millis(80));

    assert_eq!(
        rig.count(|e| matches!(e, CoreEvent::VoiceLoopArmed { .. })),
        1
    );
    assert!(rig.surface.narrations.is_empty());
    assert!(
        !rig.dir.path().join("captures").exists(),
        "no frame captured after abort"
    );
    rig.shutdown();
}

#[test]
fn empty_description_is_treated_as_cancel() {
    let mut rig = Rig::new(RigOptions::default());
    rig.surface.images.push_back(Some(image_request("   ")));

    assert!(
        !rig.controller
            .start_image(&mut rig.surface, TaskOrigin::Ui)
    );
    rig.pump_for(Duration::from_millis(20));
    assert!(rig.seen.contains(&CoreEvent::TaskRejected {
        kind: TaskKind::Image,
        reason: RejectReason::NoInput,
    }));
    assert_eq!(rig.surface.cleared, 0);
    assert!(rig.controller.gate().permit_granted());
    rig.shutdown();
}
