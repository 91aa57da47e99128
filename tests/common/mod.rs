//! Shared end-to-end harness: a real `dtaild` session handler bound to an
//! ephemeral loopback port, driven by a real `TcpStream` the way `dtail`
//! itself would drive it.

use dtail::cancel::CancelToken;
use dtail::permission::AllowAll;
use dtail::pool::BufferPool;
use dtail::reader::admission::Admission;
use dtail::session::codec::{Command, MESSAGE_DELIM_BYTES};
use dtail::session::{SessionContext, SessionHandler};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A running server bound to `127.0.0.1` on an OS-assigned port, accepting
/// sessions on a background thread until dropped.
pub struct TestServer {
    pub addr: String,
    pub cat_admission: Arc<Admission>,
    pub tail_admission: Arc<Admission>,
    cancel: CancelToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Start a server with the given admission limits. `host` is the identity
/// it reports on `REMOTE`/`SERVER` records.
pub fn spawn_server(host: &str, cat_limit: usize, tail_limit: usize) -> TestServer {
    spawn_server_with_max_line(host, cat_limit, tail_limit, 1024 * 1024)
}

/// Like [`spawn_server`], with an explicit `max_line_length` (the default
/// 1 MiB is too large for tests exercising the long-line split policy).
pub fn spawn_server_with_max_line(host: &str, cat_limit: usize, tail_limit: usize, max_line_length: usize) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback listener");
    let addr = listener.local_addr().expect("local addr").to_string();
    let cancel = CancelToken::new();
    let cat_admission = Arc::new(Admission::new(cat_limit));
    let tail_admission = Arc::new(Admission::new(tail_limit));
    let ctx = Arc::new(SessionContext {
        host: host.to_string(),
        user: "test".to_string(),
        oracle: Arc::new(AllowAll),
        cat_admission: Arc::clone(&cat_admission),
        tail_admission: Arc::clone(&tail_admission),
        pool: Arc::new(BufferPool::new()),
        max_line_length,
        cancel: cancel.clone(),
    });

    thread::spawn(move || {
        for incoming in listener.incoming() {
            let stream = match incoming {
                Ok(s) => s,
                Err(_) => break,
            };
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || SessionHandler::new(stream, ctx).run());
        }
    });

    TestServer {
        addr,
        cat_admission,
        tail_admission,
        cancel,
    }
}

/// One demultiplexed, still-tagged line received from a session (`REMOTE|...`,
/// `SERVER|...`, `AGGREGATE|...` or a hidden `.`-prefixed control message).
pub type RawFrame = String;

/// Connect to `addr`, send `cmd`, and collect every frame the server sends
/// back until it emits the hidden close syn (which this collects and then
/// acks, exactly as the real client does) or the connection otherwise
/// closes.
pub fn run_command(addr: &str, cmd: Command) -> Vec<RawFrame> {
    let mut stream = TcpStream::connect(addr).expect("connect to test server");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("set read timeout");
    let wire = format!("{};", cmd.encode());
    stream.write_all(wire.as_bytes()).expect("write command");

    let mut frames = Vec::new();
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
            if text.trim() == ".syn close connection" {
                let ack = format!("{};", Command::close_request().encode());
                let _ = stream.write_all(ack.as_bytes());
                return frames;
            }
            if !text.is_empty() {
                frames.push(text);
            }
        }
    }
    frames
}

/// Like [`run_command`], but for sessions that never self-terminate (a
/// `tail -f` with no `max_count`): returns as soon as `want` frames have
/// been collected, without waiting for or acking a close syn. Dropping the
/// returned stream ends the session's reader threads on their next write.
pub fn run_command_take(addr: &str, cmd: Command, want: usize) -> Vec<RawFrame> {
    let mut stream = TcpStream::connect(addr).expect("connect to test server");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("set read timeout");
    let wire = format!("{};", cmd.encode());
    stream.write_all(wire.as_bytes()).expect("write command");

    let mut frames = Vec::new();
    let mut pending = Vec::new();
    let mut chunk = [0u8; 8192];
    while frames.len() < want {
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
            if !text.is_empty() && text.trim() != ".syn close connection" {
                frames.push(text);
            }
            if frames.len() >= want {
                break;
            }
        }
    }
    frames
}

fn find_delim(buf: &[u8]) -> Option<usize> {
    if buf.len() < MESSAGE_DELIM_BYTES.len() {
        return None;
    }
    buf.windows(MESSAGE_DELIM_BYTES.len()).position(|w| w == MESSAGE_DELIM_BYTES)
}
