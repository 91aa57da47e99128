//! End-to-end: a `map` query run against two independent servers, each
//! holding half the matching records, merges into one row whose `avg` is
//! computed from the pooled sum and count, not the average of two averages.

mod common;

use dtail::aggregate::merge::Merger;
use dtail::query;
use dtail::session::codec::{Command, Options, Payload, Verb};
use std::fs;

const QUERY: &str = r#"select count($user),avg($latency_ms) from events where $status = "ok" group by $user logformat logfmt"#;

fn write_logfmt(path: &std::path::Path, latencies: &[u32]) {
    let mut body = String::new();
    for latency in latencies {
        body.push_str(&format!("status=ok user=alice latency_ms={}\n", latency));
    }
    fs::write(path, body).unwrap();
}

#[test]
fn aggregates_merge_across_servers() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let path_a = dir_a.path().join("events.log");
    let path_b = dir_b.path().join("events.log");
    write_logfmt(&path_a, &[10, 20, 30, 40, 50]);
    write_logfmt(&path_b, &[10, 20, 30, 40, 50]);

    let server_a = common::spawn_server("h1", 4, 4);
    let server_b = common::spawn_server("h2", 4, 4);

    let cmd_for = |path: &std::path::Path| Command {
        verb: Verb::Map,
        options: Options::default(),
        glob: path.to_string_lossy().into_owned(),
        payload: Payload::Query(QUERY.to_string()),
    };

    let frames_a = common::run_command(&server_a.addr, cmd_for(&path_a));
    let frames_b = common::run_command(&server_b.addr, cmd_for(&path_b));

    let query = query::parse(QUERY).unwrap();
    let mut merger = Merger::new(query.select.clone());
    for frame in frames_a.iter().chain(frames_b.iter()) {
        if let Some(rest) = frame.strip_prefix("AGGREGATE|") {
            let payload = rest.splitn(2, '|').nth(1).unwrap();
            merger.ingest(payload);
        }
    }

    assert_eq!(merger.group_keys(), vec!["alice".to_string()]);
    assert_eq!(merger.samples("alice"), 10);
    let count_spec = &query.select[0];
    let avg_spec = &query.select[1];
    assert_eq!(merger.render_value("alice", count_spec).unwrap(), "10");
    assert_eq!(merger.render_value("alice", avg_spec).unwrap(), "30");
}
