//! End-to-end: `cat` over a 200-file glob bounded by a cat-admission limit
//! of 2 never opens more than 2 files at once, yet still delivers every
//! file's content and completes.

mod common;

use dtail::session::codec::{Command, Options, Payload, Verb};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn cat_over_many_files_respects_the_admission_limit() {
    let dir = tempfile::tempdir().unwrap();
    let mut expected_lines = Vec::new();
    for i in 0..200 {
        let path = dir.path().join(format!("part-{:03}.log", i));
        let line = format!("line from file {}\n", i);
        fs::write(&path, &line).unwrap();
        expected_lines.push(line);
    }
    expected_lines.sort();

    let server = common::spawn_server("h1", 2, 4);
    let cat_admission = Arc::clone(&server.cat_admission);
    let peak = Arc::new(AtomicUsize::new(0));
    let stop = Arc::new(AtomicUsize::new(0));

    let peak_clone = Arc::clone(&peak);
    let stop_clone = Arc::clone(&stop);
    let sampler = thread::spawn(move || {
        while stop_clone.load(Ordering::SeqCst) == 0 {
            let in_use = cat_admission.in_use();
            peak_clone.fetch_max(in_use, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(2));
        }
    });

    let glob = dir.path().join("*.log").to_string_lossy().into_owned();
    let cmd = Command {
        verb: Verb::Cat,
        options: Options { plain: true, ..Default::default() },
        glob,
        payload: Payload::None,
    };
    let frames = common::run_command(&server.addr, cmd);

    stop.store(1, Ordering::SeqCst);
    sampler.join().unwrap();

    let mut got = frames;
    got.sort();
    assert_eq!(got, expected_lines);
    assert!(peak.load(Ordering::SeqCst) <= 2, "observed concurrency exceeded the admission limit");
}
