//! Converts a byte stream into line-terminated chunks.
//!
//! Reads in bulk (at least [`READ_CHUNK`] bytes at a time, never
//! byte-by-byte) and splits on `\n`. A chunk that grows past
//! `max_line_length` without a newline is cut short and given a synthesized
//! `\n`; a one-shot [`Frame::LongLineWarning`] accompanies the first such
//! cut, and no further warning fires until a real newline is seen. Original
//! line endings (`\n` or `\r\n`) are preserved verbatim in the emitted
//! bytes — stripping them, where a consumer needs that, is the consumer's
//! job (see [`strip_newline`]). A trailing partial line is never flushed
//! automatically; callers that know no more bytes are coming (one-shot
//! reads) call [`Framer::take_residual`] explicitly.

use crate::pool::BufferPool;
use std::collections::VecDeque;
use std::io::Read;
use std::sync::Arc;

/// Bulk read size; chosen to amortize syscall overhead under a busy tail.
pub const READ_CHUNK: usize = 64 * 1024;

/// One unit of framer output.
#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    /// A line's bytes, including its original or synthesized terminator,
    /// except for the final residual line at true EOF which has none.
    Line(Vec<u8>),
    /// Raised once when a line is forcibly split for exceeding
    /// `max_line_length`; suppressed until the next real newline.
    LongLineWarning,
}

/// Strip a trailing `\r\n` or `\n` from `line`, returning the content only.
/// Used by consumers (the MapReduce processor) that must not see the
/// terminator.
pub fn strip_newline(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    if end > 0 && line[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && line[end - 1] == b'\r' {
            end -= 1;
        }
    }
    &line[..end]
}

/// Splits a byte stream into line [`Frame`]s.
pub struct Framer<R> {
    reader: R,
    raw: Vec<u8>,
    raw_len: usize,
    raw_pos: usize,
    pending: Vec<u8>,
    max_line_length: usize,
    warned_since_newline: bool,
    outbox: VecDeque<Frame>,
    pool: Arc<BufferPool>,
}

impl<R: Read> Framer<R> {
    /// Build a framer over `reader`, cutting lines longer than
    /// `max_line_length` bytes.
    pub fn new(reader: R, max_line_length: usize, pool: Arc<BufferPool>) -> Framer<R> {
        let pending = pool.checkout(64);
        Framer {
            reader,
            raw: vec![0u8; READ_CHUNK],
            raw_len: 0,
            raw_pos: 0,
            pending,
            max_line_length,
            warned_since_newline: false,
            outbox: VecDeque::new(),
            pool,
        }
    }

    /// Access the underlying reader, e.g. to check a file's metadata for
    /// rotation detection without tearing the framer down.
    pub fn reader(&self) -> &R {
        &self.reader
    }

    fn fill_more(&mut self) -> std::io::Result<bool> {
        if self.raw_pos < self.raw_len {
            return Ok(true);
        }
        self.raw_len = self.reader.read(&mut self.raw)?;
        self.raw_pos = 0;
        Ok(self.raw_len > 0)
    }

    /// Produce the next frame, or `None` if nothing more is available right
    /// now — for a plain file this means EOF; for a followed file it means
    /// "no new data yet", and the caller should poll again later. A partial
    /// line sitting in the pending buffer is never flushed here, since a
    /// followed file may still be mid-write; call [`Framer::take_residual`]
    /// once the caller knows no more bytes are coming.
    pub fn next_frame(&mut self) -> std::io::Result<Option<Frame>> {
        if let Some(frame) = self.outbox.pop_front() {
            return Ok(Some(frame));
        }
        loop {
            if !self.fill_more()? {
                return Ok(None);
            }
            while self.raw_pos < self.raw_len {
                let b = self.raw[self.raw_pos];
                self.raw_pos += 1;
                self.pending.push(b);
                if b == b'\n' {
                    self.warned_since_newline = false;
                    let content =
                        std::mem::replace(&mut self.pending, self.pool.checkout(64));
                    return Ok(Some(Frame::Line(content)));
                }
                if self.pending.len() >= self.max_line_length {
                    self.pending.push(b'\n');
                    let content =
                        std::mem::replace(&mut self.pending, self.pool.checkout(64));
                    if !self.warned_since_newline {
                        self.warned_since_newline = true;
                        self.outbox.push_back(Frame::Line(content));
                        return Ok(Some(Frame::LongLineWarning));
                    }
                    return Ok(Some(Frame::Line(content)));
                }
            }
        }
    }

    /// Flush a trailing partial line with no terminator, if any is pending.
    /// Only meaningful once the caller is certain no more bytes will arrive
    /// (one-shot reads at true EOF; a followed file should never call this).
    pub fn take_residual(&mut self) -> Option<Frame> {
        if self.pending.is_empty() {
            None
        } else {
            let content = std::mem::replace(&mut self.pending, Vec::new());
            Some(Frame::Line(content))
        }
    }
}
