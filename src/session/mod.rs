//! One accepted connection: inbound command decoding, per-file dispatch and
//! the outbound sink, tied together on a handful of threads per session.
//!
//! Grounded on the thread-per-connection pattern of the legacy `server.rs`
//! (`TcpListener::incoming()` + `thread::spawn` per stream) rather than
//! `source::tcp`'s mio event loop: every other concurrent component in this
//! crate (one thread per file reader, one actor thread per aggregate query)
//! already follows thread-per-unit-of-work, and a session's command count is
//! small enough that the cost of a blocking thread per file is acceptable.

pub mod codec;
pub mod writer;

use crate::aggregate::engine::{self, AggregateMsg};
use crate::cancel::CancelToken;
use crate::line::{LContext, LineRecord, Stats};
use crate::permission::PermissionOracle;
use crate::pool::BufferPool;
use crate::processor::cat::CatProcessor;
use crate::processor::grep::GrepProcessor;
use crate::processor::mapreduce::MapReduceProcessor;
use crate::processor::tail::TailProcessor;
use crate::processor::{Outcome, Processor};
use crate::query;
use crate::reader::admission::Admission;
use crate::reader::dispatcher::{self, CommandKind};
use crate::reader::watcher::Polled;
use codec::{Command, Payload, Verb};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use writer::{ChannelSink, OutputSink, TurboSink, CHANNEL_DEPTH_LINE, CHANNEL_DEPTH_MAP};

/// How long the server waits for the peer's `ack close connection` once it
/// has sent its own close request.
const CLOSE_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared, session-scoped dependencies handed down to every file reader and
/// aggregate thread a command spawns.
pub struct SessionContext {
    pub host: String,
    pub user: String,
    pub oracle: Arc<dyn PermissionOracle>,
    pub cat_admission: Arc<Admission>,
    pub tail_admission: Arc<Admission>,
    pub pool: Arc<BufferPool>,
    pub max_line_length: usize,
    pub cancel: CancelToken,
}

/// Drives one accepted TCP connection end to end.
pub struct SessionHandler {
    stream: TcpStream,
    ctx: Arc<SessionContext>,
}

impl SessionHandler {
    pub fn new(stream: TcpStream, ctx: Arc<SessionContext>) -> SessionHandler {
        SessionHandler { stream, ctx }
    }

    /// Run the session to completion: decode commands until the peer closes
    /// or the close handshake finishes.
    pub fn run(mut self) {
        let write_half = match self.stream.try_clone() {
            Ok(s) => s,
            Err(e) => {
                log::error!("failed to clone session socket: {}", e);
                return;
            }
        };
        let (close_tx, close_rx) = mpsc::channel::<()>();
        let active_commands = Arc::new(AtomicUsize::new(0));
        let writer_thread = {
            let write_half = write_half;
            let active = Arc::clone(&active_commands);
            thread::spawn(move || writer_loop(write_half, close_rx, active))
        };

        let reader = BufReader::new(match self.stream.try_clone() {
            Ok(s) => s,
            Err(_) => return,
        });
        let mut buf = Vec::new();
        let mut reader = reader;

        loop {
            buf.clear();
            match read_until_command_delim(&mut reader, &mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(_) => break,
            }
            let line = String::from_utf8_lossy(&buf).into_owned();
            if line.trim().is_empty() {
                continue;
            }
            let cmd = match codec::decode(&line) {
                Ok(cmd) => cmd,
                Err(e) => {
                    log::warn!("dropping malformed command: {}", e);
                    continue;
                }
            };
            if codec::is_close_ack(&cmd) {
                let _ = close_tx.send(());
                break;
            }
            if matches!(cmd.verb, Verb::Ack | Verb::AckClose) {
                continue;
            }
            self.dispatch(cmd, Arc::clone(&active_commands));
        }

        let _ = writer_thread.join();
    }

    fn dispatch(&mut self, cmd: Command, active_commands: Arc<AtomicUsize>) {
        let kind = match cmd.verb {
            Verb::Cat => CommandKind::Cat,
            Verb::Grep => CommandKind::Grep,
            Verb::Tail => CommandKind::Tail,
            Verb::Map => CommandKind::Map,
            Verb::Ack | Verb::AckClose => return,
        };

        let targets = match dispatcher::expand(&cmd.glob, &self.ctx.user, self.ctx.oracle.as_ref()) {
            Ok(t) => t,
            Err(e) => {
                log::warn!("command glob {} failed: {}", cmd.glob, e);
                return;
            }
        };

        let sink: Arc<dyn OutputSink> = if kind == CommandKind::Cat {
            let (sink, rx) = TurboSink::with_format(cmd.options.plain);
            spawn_drain(rx, self.stream.try_clone().ok());
            Arc::new(sink)
        } else {
            let depth = if kind == CommandKind::Map {
                CHANNEL_DEPTH_MAP
            } else {
                CHANNEL_DEPTH_LINE
            };
            let (sink, rx) = ChannelSink::with_format(depth, cmd.options.plain);
            spawn_drain(rx, self.stream.try_clone().ok());
            Arc::new(sink)
        };

        active_commands.fetch_add(targets.len().max(1), Ordering::SeqCst);

        if kind == CommandKind::Map {
            self.dispatch_map(cmd, targets, sink, active_commands);
        } else {
            self.dispatch_lines(cmd, kind, targets, sink, active_commands);
        }
    }

    fn dispatch_lines(
        &mut self,
        cmd: Command,
        kind: CommandKind,
        targets: Vec<dispatcher::Target>,
        sink: Arc<dyn OutputSink>,
        active_commands: Arc<AtomicUsize>,
    ) {
        if let Payload::Regex(spec) = &cmd.payload {
            if let Err(e) = spec.compile() {
                sink.write_server_message(&self.ctx.host, &e.to_string());
                return;
            }
        }
        let ctx_window = LContext {
            before_context: cmd.options.before,
            after_context: cmd.options.after,
            max_count: cmd.options.max_count,
        };

        for target in targets {
            let ctx = Arc::clone(&self.ctx);
            let sink = Arc::clone(&sink);
            let active = Arc::clone(&active_commands);
            let host = ctx.host.clone();
            let source_id = target.source_id.clone();
            let last_n = cmd.options.last_n.max(1);
            let matcher_kind = kind;
            let compiled = matcher_clone_for(matcher_kind, &cmd.payload);
            thread::spawn(move || {
                let mut processor: Box<dyn Processor> = match matcher_kind {
                    CommandKind::Cat => Box::new(CatProcessor::default()),
                    CommandKind::Grep => Box::new(GrepProcessor::new(compiled, ctx_window)),
                    CommandKind::Tail => Box::new(TailProcessor::new(compiled, ctx_window, last_n)),
                    CommandKind::Map => unreachable!(),
                };
                run_file_reader(&ctx, target, matcher_kind, processor.as_mut(), sink.as_ref(), &host, &source_id);
                active.fetch_sub(1, Ordering::SeqCst);
            });
        }
    }

    fn dispatch_map(
        &mut self,
        cmd: Command,
        targets: Vec<dispatcher::Target>,
        sink: Arc<dyn OutputSink>,
        active_commands: Arc<AtomicUsize>,
    ) {
        let query_text = match &cmd.payload {
            Payload::Query(q) => q.clone(),
            _ => return,
        };
        let query = match query::parse(&query_text) {
            Ok(q) => q,
            Err(e) => {
                sink.write_server_message(&self.ctx.host, &e.to_string());
                return;
            }
        };
        let host = self.ctx.host.clone();
        let tick_interval = query.interval.unwrap_or(Duration::from_secs(5));
        let engine = engine::AggregateEngine::new(query.select.clone(), query.group_by.clone());
        let emit_sink = Arc::clone(&sink);
        let emit_host = host.clone();
        let (tx, handle) = engine::spawn(engine, move |line| emit_sink.write_aggregate(&emit_host, &line));

        {
            let tx = tx.clone();
            let cancel = self.ctx.cancel.clone();
            thread::spawn(move || loop {
                thread::sleep(tick_interval);
                if cancel.is_cancelled() || tx.send(AggregateMsg::Tick).is_err() {
                    break;
                }
            });
        }

        let eof_tx = tx.clone();
        let mut readers = Vec::with_capacity(targets.len());
        for target in targets {
            let ctx = Arc::clone(&self.ctx);
            let active = Arc::clone(&active_commands);
            let tx = tx.clone();
            let processor = MapReduceProcessor::new(query.clone());
            readers.push(thread::spawn(move || {
                run_map_file_reader(&ctx, target, &processor, &tx);
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        drop(tx);
        // Once every file feeding this engine has hit EOF, ask it for a
        // final snapshot before dropping the last sender and letting the
        // engine thread exit.
        thread::spawn(move || {
            for reader in readers {
                let _ = reader.join();
            }
            let _ = eof_tx.send(AggregateMsg::Eof);
            let _ = handle.join();
        });
    }
}

fn matcher_clone_for(kind: CommandKind, payload: &Payload) -> crate::regexspec::CompiledMatcher {
    let spec = match payload {
        Payload::Regex(spec) => spec.clone(),
        _ => crate::regexspec::RegexSpec::noop(),
    };
    let _ = kind;
    spec.compile().unwrap_or_else(|_| crate::regexspec::RegexSpec::noop().compile().unwrap())
}

fn run_file_reader(
    ctx: &SessionContext,
    target: dispatcher::Target,
    kind: CommandKind,
    processor: &mut dyn Processor,
    sink: &dyn OutputSink,
    host: &str,
    source_id: &str,
) {
    let (mut watcher, _permit) = match dispatcher::open_watcher(
        &target,
        kind,
        &ctx.cat_admission,
        &ctx.tail_admission,
        ctx.max_line_length,
        Arc::clone(&ctx.pool),
    ) {
        Ok(w) => w,
        Err(e) => {
            sink.write_server_message(host, &e.to_string());
            return;
        }
    };

    let mut stats = Stats::default();
    let mut line_num = 0u64;
    let mut caught_up = false;
    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }
        match watcher.poll() {
            Ok(Polled::Frame(crate::framer::Frame::Line(content))) => {
                line_num += 1;
                let outcome = processor.process(&content, line_num);
                ctx.pool.release(content);
                emit_outcome(outcome, &mut stats, sink, host, source_id, &ctx.pool);
            }
            Ok(Polled::Frame(crate::framer::Frame::LongLineWarning)) => {
                sink.write_server_message(host, "line exceeded the configured maximum length and was dropped");
            }
            Ok(Polled::Idle) => {
                if kind == CommandKind::Tail && !caught_up {
                    caught_up = true;
                    let flushed = processor.begin_streaming();
                    if !flushed.is_empty() {
                        emit_outcome(Outcome::Emit(flushed), &mut stats, sink, host, source_id, &ctx.pool);
                    }
                }
                if watcher.finished() {
                    break;
                }
                if kind != CommandKind::Tail {
                    break;
                }
                thread::sleep(Duration::from_millis(200));
            }
            Ok(Polled::Dead) => break,
            Err(e) => {
                sink.write_server_message(host, &e.to_string());
                break;
            }
        }
    }
    for line in processor.close() {
        let perc = stats.transmitted_perc();
        let record = LineRecord::new(line.content, line.line_num, perc, source_id);
        let sent = sink.write_line(host, &record);
        stats.record(sent);
        ctx.pool.release(record.content);
    }
}

fn emit_outcome(
    outcome: Outcome,
    stats: &mut Stats,
    sink: &dyn OutputSink,
    host: &str,
    source_id: &str,
    pool: &BufferPool,
) {
    match outcome {
        Outcome::None => {}
        Outcome::Emit(lines) => {
            for line in lines {
                let perc = stats.transmitted_perc();
                let record = LineRecord::new(line.content, line.line_num, perc, source_id);
                let sent = sink.write_line(host, &record);
                stats.record(sent);
                pool.release(record.content);
            }
        }
    }
}

fn run_map_file_reader(
    ctx: &SessionContext,
    target: dispatcher::Target,
    processor: &MapReduceProcessor,
    tx: &mpsc::Sender<AggregateMsg>,
) {
    let (mut watcher, _permit) = match dispatcher::open_watcher(
        &target,
        CommandKind::Map,
        &ctx.cat_admission,
        &ctx.tail_admission,
        ctx.max_line_length,
        Arc::clone(&ctx.pool),
    ) {
        Ok(w) => w,
        Err(e) => {
            log::warn!("map reader failed to open {}: {}", target.path.display(), e);
            return;
        }
    };
    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }
        match watcher.poll() {
            Ok(Polled::Frame(crate::framer::Frame::Line(content))) => {
                let fields = processor.process(&content);
                ctx.pool.release(content);
                if let Some(fields) = fields {
                    if tx
                        .send(AggregateMsg::Update {
                            group_key_fields: fields,
                        })
                        .is_err()
                    {
                        break;
                    }
                }
            }
            Ok(Polled::Frame(crate::framer::Frame::LongLineWarning)) => {}
            Ok(Polled::Idle) => {
                if watcher.finished() {
                    break;
                }
                thread::sleep(Duration::from_millis(200));
            }
            Ok(Polled::Dead) | Err(_) => break,
        }
    }
}

/// Accumulate bytes from `reader` until the `;` command delimiter, writing
/// them (minus the delimiter) into `buf`. Returns the number of bytes read,
/// `0` on EOF.
fn read_until_command_delim(reader: &mut impl BufRead, buf: &mut Vec<u8>) -> std::io::Result<usize> {
    let n = reader.read_until(codec::COMMAND_DELIM, buf)?;
    if n == 0 {
        return Ok(0);
    }
    if buf.last() == Some(&codec::COMMAND_DELIM) {
        buf.pop();
    }
    Ok(n)
}

/// Drain a sink's receiver into `stream`, one frame at a time, until the
/// channel closes.
fn spawn_drain(rx: mpsc::Receiver<Vec<u8>>, stream: Option<TcpStream>) {
    if let Some(mut stream) = stream {
        thread::spawn(move || {
            for bytes in rx {
                if stream.write_all(&bytes).is_err() {
                    break;
                }
            }
        });
    }
}

/// Runs on the session's dedicated writer thread: after every dispatched
/// command's reader threads have finished (`active_commands` back at zero),
/// send the hidden close request and wait up to [`CLOSE_ACK_TIMEOUT`] for the
/// peer's ack before returning.
fn writer_loop(mut stream: TcpStream, close_rx: mpsc::Receiver<()>, active_commands: Arc<AtomicUsize>) {
    loop {
        match close_rx.recv_timeout(Duration::from_secs(1)) {
            Ok(()) => return,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if active_commands.load(Ordering::SeqCst) == 0 {
                    let mut msg = b".syn close connection".to_vec();
                    msg.extend_from_slice(codec::MESSAGE_DELIM_BYTES);
                    if stream.write_all(&msg).is_err() {
                        return;
                    }
                    let _ = close_rx.recv_timeout(CLOSE_ACK_TIMEOUT);
                    return;
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn read_until_command_delim_strips_the_delimiter() {
        let mut cursor = std::io::Cursor::new(b"protocol 4.1 ack close connection;".to_vec());
        let mut buf = Vec::new();
        let n = read_until_command_delim(&mut cursor, &mut buf).unwrap();
        assert!(n > 0);
        assert_eq!(buf, b"protocol 4.1 ack close connection");
    }

    #[test]
    fn read_until_command_delim_reports_eof_as_zero() {
        let mut cursor = std::io::Cursor::new(Vec::new());
        let mut buf = Vec::new();
        let n = read_until_command_delim(&mut cursor, &mut buf).unwrap();
        assert_eq!(n, 0);
    }
}
