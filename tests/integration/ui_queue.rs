//! Cross-thread UI update ordering.

use crate::helpers::ScriptedSurface;
use narrator::ui_channel;

#[test]
fn updates_from_each_thread_apply_in_post_order() {
    let (ui, queue) = ui_channel();
    let posters: Vec<_> = (0..4)
        .map(|t| {
            let ui = ui.clone();
            std::thread::spawn(move || {
                (0..50)
                    .map(|i| {
                        let line = format!("{t}:{i}");
                        let copy = line.clone();
                        let seq = ui.post(move |s| s.append_log(&copy)).unwrap();
                        (seq, line)
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let mut stamped: Vec<(u64, String)> = posters
        .into_iter()
        .flat_map(|poster| poster.join().unwrap())
        .collect();

    let mut surface = ScriptedSurface::default();
    let report = queue.drain(&mut surface);
    assert_eq!(report.applied, 200);

    for t in 0..4 {
        let mine: Vec<usize> = surface
            .log
            .iter()
            .filter_map(|l| l.strip_prefix(&format!("{t}:")))
            .map(|i| i.parse().unwrap())
            .collect();
        assert_eq!(mine, (0..50).collect::<Vec<_>>());
    }

    stamped.sort_by_key(|(seq, _)| *seq);
    assert_eq!(report.last_seq, stamped.last().map(|(seq, _)| *seq));
    let by_stamp: Vec<String> = stamped.into_iter().map(|(_, line)| line).collect();
    assert_eq!(surface.log, by_stamp, "drain order follows the global stamp");
}

#[test]
fn posts_after_close_are_dropped() {
    let (ui, queue) = ui_channel();
    queue.close();
    assert!(!ui.is_alive());
    assert_eq!(ui.post(|s| s.append_log("late")), None);
}
