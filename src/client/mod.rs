//! The client side of a session: one thread per target server, demuxing its
//! record stream and either printing lines as they arrive or folding
//! aggregate snapshots into a shared [`Merger`].
//!
//! Grounded on the same thread-per-connection shape the server's
//! [`crate::session`] module uses, mirrored for the fan-out direction: dtail
//! opens one outbound connection per server rather than accepting many.

pub mod render;

use crate::aggregate::merge::Merger;
use crate::query::{SelectSpec, Query};
use crate::session::codec::{Command, MESSAGE_DELIM_BYTES};
use render::Record;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// How long the client waits for a server's `ack close connection` before
/// giving up and tearing the socket down anyway.
const CLOSE_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect to `host`, issue `cmd`, and stream its decoded records back over
/// `tx` until the server requests close or the connection drops.
pub fn run_session(host: String, cmd: Command, tx: mpsc::Sender<Record>) {
    let mut stream = match TcpStream::connect(&host) {
        Ok(s) => s,
        Err(e) => {
            let _ = tx.send(Record::Server { host: host.clone(), message: format!("connect failed: {}", e) });
            return;
        }
    };
    let wire = format!("{};", cmd.encode());
    if let Err(e) = stream.write_all(wire.as_bytes()) {
        let _ = tx.send(Record::Server { host: host.clone(), message: format!("write failed: {}", e) });
        return;
    }

    let mut pending = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };
        pending.extend_from_slice(&chunk[..n]);
        while let Some(pos) = find_delim(&pending) {
            let frame = pending[..pos].to_vec();
            pending.drain(..pos + MESSAGE_DELIM_BYTES.len());
            let text = String::from_utf8_lossy(&frame).into_owned();
            if text.is_empty() {
                continue;
            }
            match render::parse_record(&text) {
                Some(Record::Hidden(msg)) if msg.trim() == ".syn close connection" => {
                    let ack = format!("{};", Command::close_request().encode());
                    let _ = stream.write_all(ack.as_bytes());
                    return;
                }
                Some(record) => {
                    if tx.send(record).is_err() {
                        return;
                    }
                }
                None => {}
            }
        }
    }
}

fn find_delim(buf: &[u8]) -> Option<usize> {
    if MESSAGE_DELIM_BYTES.is_empty() || buf.len() < MESSAGE_DELIM_BYTES.len() {
        return None;
    }
    buf.windows(MESSAGE_DELIM_BYTES.len()).position(|w| w == MESSAGE_DELIM_BYTES)
}

/// Fan `cmd` out to every host in `servers`, returning the receiving half
/// every session thread reports records on.
pub fn fan_out(servers: Vec<String>, cmd: Command) -> mpsc::Receiver<Record> {
    let (tx, rx) = mpsc::channel();
    for host in servers {
        let tx = tx.clone();
        let cmd = cmd.clone();
        thread::spawn(move || run_session(host, cmd, tx));
    }
    rx
}

/// Drive a `cat`/`grep`/`tail` fan-out: print every line and server message
/// as it arrives, in whatever order it is received.
pub fn run_line_command(servers: Vec<String>, cmd: Command) {
    let rx = fan_out(servers, cmd);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for record in rx {
        let _ = render::write_record(&mut out, &record);
    }
}

/// Drive a `map` fan-out: fold every server's aggregate snapshots into one
/// [`Merger`] and render its table to `out` once the fan-out finishes (or
/// the caller otherwise decides it has enough data).
pub fn run_map_command(servers: Vec<String>, cmd: Command, query: &Query) -> Merger {
    let rx = fan_out(servers, cmd);
    let mut merger = Merger::new(query.select.clone());
    let deadline = query.interval.unwrap_or(Duration::from_secs(5)) * 3;
    let started = std::time::Instant::now();
    while started.elapsed() < deadline.max(CLOSE_ACK_TIMEOUT) {
        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(Record::Aggregate { payload, .. }) => merger.ingest(&payload),
            Ok(Record::Server { host, message }) => log::warn!("{}: {}", host, message),
            Ok(_) => {}
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    merger
}

/// Render `merger` either to stdout as a table or to `outfile` as CSV.
///
/// A fresh outfile is written via a temp-file-then-rename so a reader never
/// observes a partial file; `append` instead opens the existing file (or
/// creates it) and writes the rows only, skipping the header once one is
/// already on disk.
pub fn emit_result(
    merger: &Merger,
    select: &[SelectSpec],
    group_by: &[String],
    order_by: Option<&str>,
    reverse: bool,
    limit: Option<usize>,
    outfile: Option<&std::path::Path>,
    append: bool,
) -> std::io::Result<()> {
    match outfile {
        Some(path) if append => {
            let header_needed = !path.exists();
            let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
            file.write_all(render::render_csv(merger, select, group_by, header_needed).as_bytes())?;
            Ok(())
        }
        Some(path) => {
            let mut tmp = tempfile::NamedTempFile::new_in(path.parent().unwrap_or_else(|| std::path::Path::new(".")))?;
            tmp.write_all(render::render_csv(merger, select, group_by, true).as_bytes())?;
            tmp.persist(path).map_err(|e| e.error)?;
            Ok(())
        }
        None => {
            print!("{}", render::render_table(merger, select, group_by, order_by, reverse, limit));
            Ok(())
        }
    }
}
