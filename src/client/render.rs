//! Renders demultiplexed records to the terminal, and merged aggregate
//! snapshots to a table or CSV outfile.
//!
//! Grounded on `sink::Console`'s plain stdout writer for the line-oriented
//! path; the table renderer itself has no teacher precedent in this crate
//! (cernan never prints tabular output), so it is written from scratch in
//! the crate's existing terse style rather than pulled from elsewhere.

use crate::aggregate::merge::Merger;
use crate::query::SelectSpec;
use std::io::Write;

/// One record received from a server, already stripped of its tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// `host`, `transmitted_perc`, `line_num`, `source_id`, `content`.
    Remote {
        host: String,
        transmitted_perc: u8,
        line_num: u64,
        source_id: String,
        content: String,
    },
    /// `host`, message text.
    Server { host: String, message: String },
    /// `host`, raw serialized aggregate snapshot line.
    Aggregate { host: String, payload: String },
    /// A `.`-prefixed control message.
    Hidden(String),
}

/// Parse one already-unframed line from a server into a [`Record`].
pub fn parse_record(line: &str) -> Option<Record> {
    if line.starts_with('.') {
        return Some(Record::Hidden(line.to_string()));
    }
    let mut parts = line.splitn(2, '|');
    let tag = parts.next()?;
    let rest = parts.next().unwrap_or("");
    match tag {
        "REMOTE" => {
            let mut fields = rest.splitn(5, '|');
            let host = fields.next()?.to_string();
            let transmitted_perc: u8 = fields.next()?.parse().ok()?;
            let line_num: u64 = fields.next()?.parse().ok()?;
            let source_id = fields.next()?.to_string();
            let content = fields.next().unwrap_or("").to_string();
            Some(Record::Remote {
                host,
                transmitted_perc,
                line_num,
                source_id,
                content,
            })
        }
        "SERVER" => {
            let mut fields = rest.splitn(2, '|');
            let host = fields.next()?.to_string();
            let message = fields.next().unwrap_or("").to_string();
            Some(Record::Server { host, message })
        }
        "AGGREGATE" => {
            let mut fields = rest.splitn(2, '|');
            let host = fields.next()?.to_string();
            let payload = fields.next().unwrap_or("").to_string();
            Some(Record::Aggregate { host, payload })
        }
        _ => None,
    }
}

/// Write a `REMOTE`/`SERVER` record to `out` the way an interactive user
/// expects: `[host] content` for lines, `[host] ! message` for notices.
pub fn write_record(out: &mut impl Write, record: &Record) -> std::io::Result<()> {
    match record {
        Record::Remote { host, content, .. } => writeln!(out, "[{}] {}", host, content),
        Record::Server { host, message } => writeln!(out, "[{}] ! {}", host, message),
        Record::Aggregate { .. } | Record::Hidden(_) => Ok(()),
    }
}

/// Render a merger's current state as an aligned table, sorted by
/// `order_by` (if given) and truncated to `limit` rows.
pub fn render_table(
    merger: &Merger,
    select: &[SelectSpec],
    group_by: &[String],
    order_by: Option<&str>,
    reverse: bool,
    limit: Option<usize>,
) -> String {
    let mut keys = merger.group_keys();
    if let Some(order_field) = order_by {
        let order_idx = select.iter().position(|s| s.alias == order_field);
        keys.sort_by(|a, b| {
            let va = order_idx
                .and_then(|i| merger.render_value(a, &select[i]))
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(0.0);
            let vb = order_idx
                .and_then(|i| merger.render_value(b, &select[i]))
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(0.0);
            va.partial_cmp(&vb).unwrap_or(std::cmp::Ordering::Equal)
        });
        if reverse {
            keys.reverse();
        }
    }
    if let Some(limit) = limit {
        keys.truncate(limit);
    }

    let mut header: Vec<String> = group_by.to_vec();
    header.extend(select.iter().map(|s| s.alias.clone()));
    header.push("samples".to_string());

    let mut rows = vec![header];
    for key in &keys {
        let mut row: Vec<String> = Merger::split_group_key(key).iter().map(|s| s.to_string()).collect();
        for spec in select {
            row.push(merger.render_value(key, spec).unwrap_or_default());
        }
        row.push(merger.samples(key).to_string());
        rows.push(row);
    }

    render_aligned(&rows)
}

fn render_aligned(rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return String::new();
    }
    let cols = rows[0].len();
    let mut widths = vec![0usize; cols];
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }
    let mut out = String::new();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            out.push_str(&format!("{:width$}  ", cell, width = widths[i]));
        }
        out.push('\n');
    }
    out
}

/// Render a merger's current state as CSV, for `--outfile`/`outfile`.
/// `include_header` is `false` when appending to a file that already has one.
pub fn render_csv(merger: &Merger, select: &[SelectSpec], group_by: &[String], include_header: bool) -> String {
    let mut out = String::new();
    if include_header {
        let mut header: Vec<String> = group_by.to_vec();
        header.extend(select.iter().map(|s| s.alias.clone()));
        header.push("samples".to_string());
        out.push_str(&header.join(","));
        out.push('\n');
    }
    for key in merger.group_keys() {
        let mut row: Vec<String> = Merger::split_group_key(&key).iter().map(|s| s.to_string()).collect();
        for spec in select {
            row.push(merger.render_value(&key, spec).unwrap_or_default());
        }
        row.push(merger.samples(&key).to_string());
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_a_remote_record() {
        let record = parse_record("REMOTE|hostA|100|3|hostA|hello world").unwrap();
        match record {
            Record::Remote { host, transmitted_perc, line_num, content, .. } => {
                assert_eq!(host, "hostA");
                assert_eq!(transmitted_perc, 100);
                assert_eq!(line_num, 3);
                assert_eq!(content, "hello world");
            }
            _ => panic!("expected a remote record"),
        }
    }

    #[test]
    fn parses_a_hidden_control_message() {
        let record = parse_record(".syn close connection").unwrap();
        assert_eq!(record, Record::Hidden(".syn close connection".to_string()));
    }

    #[test]
    fn parses_a_server_message() {
        let record = parse_record("SERVER|hostA|disk full").unwrap();
        assert_eq!(
            record,
            Record::Server { host: "hostA".to_string(), message: "disk full".to_string() }
        );
    }

    #[test]
    fn csv_includes_header_and_group_rows() {
        use crate::query::SelectOp;

        let specs = vec![SelectSpec { op: SelectOp::Count, field: None, alias: "count".to_string() }];
        let mut merger = Merger::new(specs.clone());
        merger.ingest("hostA∥samples≔1∥count≔1");

        let csv = render_csv(&merger, &specs, &["host".to_string()], true);
        assert!(csv.starts_with("host,count,samples\n"));
        assert!(csv.contains("hostA,1,1"));
    }

    #[test]
    fn csv_omits_header_in_append_mode() {
        use crate::query::SelectOp;

        let specs = vec![SelectSpec { op: SelectOp::Count, field: None, alias: "count".to_string() }];
        let mut merger = Merger::new(specs.clone());
        merger.ingest("hostA∥samples≔1∥count≔1");

        let csv = render_csv(&merger, &specs, &["host".to_string()], false);
        assert!(!csv.contains("host,count,samples"));
        assert!(csv.starts_with("hostA,1,1"));
    }
}
