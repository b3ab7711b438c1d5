//! Model resource preload and reuse.

use crate::helpers::{Rig, RigOptions, image_request};
use narrator::{CoreEvent, PreloadStatus, ResourceCache, TaskOrigin};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Barrier};

#[test]
fn concurrent_ensure_builds_once() {
    let cache = Arc::new(ResourceCache::<String>::new());
    let builds = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(6));
    let handles: Vec<_> = (0..6)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let builds = Arc::clone(&builds);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                cache
                    .ensure("models/vision", false, || {
                        builds.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(20));
                        Ok("bundle".to_owned())
                    })
                    .unwrap()
            })
        })
        .collect();
    let bundles: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert!(bundles.iter().all(|b| Arc::ptr_eq(b, &bundles[0])));
}

#[test]
fn tasks_after_preload_reuse_the_bundle() {
    let mut rig = Rig::new(RigOptions::default());
    assert!(rig.controller.start_preload());
    rig.pump_until(|e| {
        *e == CoreEvent::PreloadChanged {
            status: PreloadStatus::Ready,
        }
    });

    for description in ["一隻貓", "一隻狗"] {
        rig.surface.images.push_back(Some(image_request(description)));
        assert!(
            rig.controller
                .start_image(&mut rig.surface, TaskOrigin::Ui)
        );
        rig.pump_until(|e| matches!(e, CoreEvent::TaskFinished { .. }));
    }
    assert_eq!(rig.loads.load(Ordering::SeqCst), 1);
    assert_eq!(rig.surface.narrations.len(), 2);
    rig.shutdown();
}

#[test]
fn reload_rebuilds_the_bundle() {
    let mut rig = Rig::new(RigOptions::default());
    let ready = |e: &CoreEvent| {
        *e == CoreEvent::PreloadChanged {
            status: PreloadStatus::Ready,
        }
    };
    assert!(rig.controller.start_preload());
    rig.pump_until(ready);
    assert!(rig.controller.handle_button("reload"));
    rig.pump_until(ready);
    assert_eq!(rig.loads.load(Ordering::SeqCst), 2);
    rig.shutdown();
}
