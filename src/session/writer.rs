//! The two outbound channel strategies, unified behind one trait so the
//! per-line hot path never branches on which mode a session picked.
//!
//! Grounded on `sink::Sink`'s `deliver()`/channel-depth split between
//! `sink::mpsc`'s bounded hopper and the firehose sinks' larger buffers:
//! here the split is between a shallow channel for ordinary line/aggregate
//! traffic (`ChannelSink`) and a deep, pre-framed channel for `cat`'s
//! high-throughput path (`TurboSink`). Both ends of either channel carry
//! already-framed bytes, so the writer thread never re-serializes.

use crate::error::CoreError;
use crate::line::LineRecord;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::Arc;

/// Regular per-line and per-aggregate-tick traffic.
pub const CHANNEL_DEPTH_LINE: usize = 100;
/// Depth used for a session whose only traffic is aggregate snapshots.
pub const CHANNEL_DEPTH_MAP: usize = 10_000;
/// `cat`'s pre-framed, high-throughput path.
pub const TURBO_DEPTH: usize = 1_000;

fn frame(mut body: Vec<u8>) -> Vec<u8> {
    body.extend_from_slice(crate::session::codec::MESSAGE_DELIM_BYTES);
    body
}

/// Where a session handler sends everything destined for its peer. Multiple
/// concrete strategies share this trait so dispatch can pick one without the
/// per-line code ever knowing which.
pub trait OutputSink: Send + Sync {
    /// One matched, processed line from a `cat`/`grep`/`tail` command.
    /// Returns `false` if the line was dropped because the outbound channel
    /// was full, so the caller can fold that into its back-pressure stats.
    fn write_line(&self, host: &str, record: &LineRecord) -> bool;
    /// A human-readable server-side notice (errors, warnings).
    fn write_server_message(&self, host: &str, msg: &str);
    /// One aggregate snapshot line from a `map` command.
    fn write_aggregate(&self, host: &str, payload: &str);
    /// A `.`-prefixed control message invisible to the end user.
    fn write_hidden(&self, msg: &str);
    /// Block until every queued message has left the sink (best effort).
    fn flush(&self);
    /// Total messages dropped because the channel was full.
    fn dropped(&self) -> u64;
}

struct Outbox {
    tx: SyncSender<Vec<u8>>,
    dropped: Arc<AtomicU64>,
}

impl Outbox {
    /// Returns `true` if `bytes` was handed to the channel, `false` if it was
    /// dropped (channel full or the draining end is gone).
    fn send(&self, bytes: Vec<u8>) -> bool {
        match self.tx.try_send(bytes) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("{}", CoreError::ChannelFull);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Render one line for the wire. `plain` commands send the content
/// verbatim, exactly as read from the file; framed commands wrap it in a
/// `REMOTE|host|perc|lineNum|sourceID|content` envelope the client can
/// demultiplex against other hosts. The choice is made once, at sink
/// construction, never per line.
fn record_line(host: &str, record: &LineRecord, plain: bool) -> Vec<u8> {
    if plain {
        return record.content.clone();
    }
    format!(
        "REMOTE|{}|{}|{}|{}|{}",
        host,
        record.transmitted_perc,
        record.line_num,
        record.source_id,
        String::from_utf8_lossy(&record.content),
    )
    .into_bytes()
}

fn record_server_message(host: &str, msg: &str) -> Vec<u8> {
    format!("SERVER|{}|{}", host, msg).into_bytes()
}

fn record_aggregate(host: &str, payload: &str) -> Vec<u8> {
    format!("AGGREGATE|{}|{}", host, payload).into_bytes()
}

/// The shallow channel used by `grep`/`tail`/`map`, where back-pressure
/// should be visible (lines drop and `transmitted_perc` reflects it) rather
/// than buffered away.
pub struct ChannelSink {
    outbox: Outbox,
    plain: bool,
}

impl ChannelSink {
    /// Build a sink and its receiving half. `depth` should be
    /// [`CHANNEL_DEPTH_LINE`] for line traffic or [`CHANNEL_DEPTH_MAP`] for
    /// aggregate-only traffic. Framed output (`REMOTE|...`) is used unless
    /// `plain` is set, in which case [`OutputSink::write_line`] sends each
    /// line's content verbatim.
    pub fn new(depth: usize) -> (ChannelSink, Receiver<Vec<u8>>) {
        ChannelSink::with_format(depth, false)
    }

    pub fn with_format(depth: usize, plain: bool) -> (ChannelSink, Receiver<Vec<u8>>) {
        let (tx, rx) = sync_channel(depth);
        (
            ChannelSink {
                outbox: Outbox {
                    tx,
                    dropped: Arc::new(AtomicU64::new(0)),
                },
                plain,
            },
            rx,
        )
    }
}

impl OutputSink for ChannelSink {
    fn write_line(&self, host: &str, record: &LineRecord) -> bool {
        self.outbox.send(frame(record_line(host, record, self.plain)))
    }

    fn write_server_message(&self, host: &str, msg: &str) {
        self.outbox.send(frame(record_server_message(host, msg)));
    }

    fn write_aggregate(&self, host: &str, payload: &str) {
        self.outbox.send(frame(record_aggregate(host, payload)));
    }

    fn write_hidden(&self, msg: &str) {
        self.outbox.send(frame(msg.as_bytes().to_vec()));
    }

    fn flush(&self) {}

    fn dropped(&self) -> u64 {
        self.outbox.dropped.load(Ordering::Relaxed)
    }
}

/// The deep, pre-framed channel used by `cat`. Lines are framed once, here,
/// so the writer thread on the other end does nothing but copy bytes to the
/// socket.
pub struct TurboSink {
    outbox: Outbox,
    plain: bool,
}

impl TurboSink {
    pub fn new() -> (TurboSink, Receiver<Vec<u8>>) {
        TurboSink::with_format(false)
    }

    pub fn with_format(plain: bool) -> (TurboSink, Receiver<Vec<u8>>) {
        let (tx, rx) = sync_channel(TURBO_DEPTH);
        (
            TurboSink {
                outbox: Outbox {
                    tx,
                    dropped: Arc::new(AtomicU64::new(0)),
                },
                plain,
            },
            rx,
        )
    }
}

impl OutputSink for TurboSink {
    fn write_line(&self, host: &str, record: &LineRecord) -> bool {
        self.outbox.send(frame(record_line(host, record, self.plain)))
    }

    fn write_server_message(&self, host: &str, msg: &str) {
        self.outbox.send(frame(record_server_message(host, msg)));
    }

    fn write_aggregate(&self, host: &str, payload: &str) {
        self.outbox.send(frame(record_aggregate(host, payload)));
    }

    fn write_hidden(&self, msg: &str) {
        self.outbox.send(frame(msg.as_bytes().to_vec()));
    }

    fn flush(&self) {}

    fn dropped(&self) -> u64 {
        self.outbox.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn channel_sink_frames_with_message_delimiter() {
        let (sink, rx) = ChannelSink::new(4);
        sink.write_hidden(".syn close connection");
        let bytes = rx.recv().unwrap();
        assert!(bytes.ends_with(crate::session::codec::MESSAGE_DELIM_BYTES));
    }

    #[test]
    fn line_record_renders_as_remote_record() {
        let (sink, rx) = ChannelSink::new(4);
        let record = LineRecord::new(b"hello".to_vec(), 3, 100, "hostA");
        assert!(sink.write_line("hostA", &record));
        let bytes = rx.recv().unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.starts_with("REMOTE|hostA|100|3|hostA|hello"));
    }

    #[test]
    fn full_channel_increments_dropped_counter() {
        let (sink, _rx) = ChannelSink::new(1);
        sink.write_hidden("a");
        sink.write_hidden("b");
        sink.write_hidden("c");
        assert!(sink.dropped() >= 1);
    }

    #[test]
    fn write_line_reports_drop_when_channel_is_full() {
        let (sink, _rx) = ChannelSink::new(1);
        let record = LineRecord::new(b"hello".to_vec(), 1, 100, "hostA");
        sink.write_hidden("fill the one slot");
        assert!(!sink.write_line("hostA", &record));
    }

    #[test]
    fn aggregate_and_server_messages_carry_their_tag() {
        let (sink, rx) = ChannelSink::new(4);
        sink.write_server_message("hostA", "file rotated");
        sink.write_aggregate("hostA", "hostA∥samples≔1");
        let first = String::from_utf8_lossy(&rx.recv().unwrap()).into_owned();
        let second = String::from_utf8_lossy(&rx.recv().unwrap()).into_owned();
        assert!(first.starts_with("SERVER|hostA|file rotated"));
        assert!(second.starts_with("AGGREGATE|hostA|hostA"));
    }
}
