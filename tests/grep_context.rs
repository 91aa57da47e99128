//! End-to-end: `grep` with a one-line before/after context window emits
//! exactly the matching line plus its immediate neighbours, framed as
//! `REMOTE` records, and nothing else.

mod common;

use dtail::regexspec::RegexSpec;
use dtail::session::codec::{Command, Options, Payload, Verb};
use std::fs;

#[test]
fn grep_emits_match_with_surrounding_context() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    fs::write(&path, "L1\nL2\nL3 ERROR\nL4\nL5\n").unwrap();

    let server = common::spawn_server("h1", 4, 4);
    let cmd = Command {
        verb: Verb::Grep,
        options: Options { before: 1, after: 1, ..Default::default() },
        glob: path.to_string_lossy().into_owned(),
        payload: Payload::Regex(RegexSpec::detect("ERROR")),
    };
    let frames = common::run_command(&server.addr, cmd);

    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0], "REMOTE|h1|100|2|||L2\n");
    assert_eq!(frames[1], "REMOTE|h1|100|3|||L3 ERROR\n");
    assert_eq!(frames[2], "REMOTE|h1|100|4|||L4\n");
}
