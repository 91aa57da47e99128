//! Polling state machine that reads one file, transparently reopening it
//! when it has been rotated or truncated.
//!
//! Generalizes cernan's `source::file::file_watcher` (itself a polling
//! `(dev, ino)`-tracking reader) from a single always-follow mode into two
//! explicit modes: [`Mode::OneShot`] reads to EOF and stops (`cat`/`grep`),
//! [`Mode::Follow`] keeps polling for appended data after EOF and also
//! periodically restats the file to notice truncation (`tail -f`).

use crate::error::CoreError;
use crate::framer::{Frame, Framer};
use crate::pool::BufferPool;
use std::fs::{self, File};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How a [`FileWatcher`] behaves once it reaches the current end of file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Read to EOF, flush any trailing partial line, then report done.
    OneShot,
    /// Keep polling for appended data; detect rotation and truncation.
    Follow,
}

/// How often a followed file's metadata is rechecked for truncation.
pub const STAT_INTERVAL: Duration = Duration::from_secs(3);

/// The outcome of one `poll` call.
pub enum Polled {
    /// A line frame was produced.
    Frame(Frame),
    /// Nothing available right now; in `Follow` mode, try again later. In
    /// `OneShot` mode this means the file is exhausted.
    Idle,
    /// The file disappeared or rotated away entirely and is not coming back
    /// (no target to reopen into, e.g. genuinely removed).
    Dead,
}

/// Tracks one file through rotations and truncations.
pub struct FileWatcher {
    path: PathBuf,
    mode: Mode,
    framer: Option<Framer<File>>,
    file_id: Option<(u64, u64)>,
    last_stat_check: Instant,
    last_known_len: u64,
    max_line_length: usize,
    pool: Arc<BufferPool>,
    finished: bool,
}

fn file_id_of(path: &PathBuf) -> Option<(u64, u64)> {
    fs::metadata(path).ok().map(|m| (m.dev(), m.ino()))
}

impl FileWatcher {
    /// Open `path` fresh, reading from its beginning.
    pub fn new(
        path: PathBuf,
        mode: Mode,
        max_line_length: usize,
        pool: Arc<BufferPool>,
    ) -> io::Result<FileWatcher> {
        let mut watcher = FileWatcher {
            path,
            mode,
            framer: None,
            file_id: None,
            last_stat_check: Instant::now(),
            last_known_len: 0,
            max_line_length,
            pool,
            finished: false,
        };
        watcher.open_at_start()?;
        Ok(watcher)
    }

    fn open_at_start(&mut self) -> io::Result<()> {
        match File::open(&self.path) {
            Ok(f) => {
                self.file_id = file_id_of(&self.path);
                self.last_known_len = f.metadata().map(|m| m.len()).unwrap_or(0);
                self.framer = Some(Framer::new(f, self.max_line_length, Arc::clone(&self.pool)));
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.framer = None;
                self.file_id = None;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// True once the watcher has nothing left to say: a `OneShot` file fully
    /// drained, or a file that vanished with nothing to reopen into.
    pub fn finished(&self) -> bool {
        self.finished
    }

    fn maybe_detect_rotation_or_truncation(&mut self) -> io::Result<()> {
        if self.last_stat_check.elapsed() < STAT_INTERVAL {
            return Ok(());
        }
        self.last_stat_check = Instant::now();
        let current_id = file_id_of(&self.path);
        if current_id != self.file_id {
            // Rotated (or replaced): reopen at the new inode's start.
            return self.open_at_start();
        }
        if let Ok(metadata) = fs::metadata(&self.path) {
            let len = metadata.len();
            if len < self.last_known_len {
                // Truncated in place (`> file.log`): reopen from the start.
                return self.open_at_start();
            }
            self.last_known_len = len;
        }
        Ok(())
    }

    /// Attempt to read one frame. Never blocks longer than a single
    /// buffered-read syscall; returns [`Polled::Idle`] when there is nothing
    /// to report right now.
    pub fn poll(&mut self) -> Result<Polled, CoreError> {
        if self.finished {
            return Ok(Polled::Idle);
        }
        if self.mode == Mode::Follow {
            self.maybe_detect_rotation_or_truncation()
                .map_err(|e| self.io_err(e))?;
        }
        let framer = match &mut self.framer {
            Some(f) => f,
            None => {
                // File does not exist (yet, or ever again). In follow mode we
                // keep waiting for it to appear; in one-shot mode there is
                // nothing to read.
                if self.mode == Mode::OneShot {
                    self.finished = true;
                    return Ok(Polled::Dead);
                }
                self.open_at_start().map_err(|e| self.io_err(e))?;
                return Ok(Polled::Idle);
            }
        };
        match framer.next_frame() {
            Ok(Some(frame)) => Ok(Polled::Frame(frame)),
            Ok(None) => {
                if self.mode == Mode::OneShot {
                    if let Some(frame) = framer.take_residual() {
                        return Ok(Polled::Frame(frame));
                    }
                    self.finished = true;
                }
                Ok(Polled::Idle)
            }
            Err(e) => {
                if e.kind() == io::ErrorKind::NotFound {
                    self.framer = None;
                    self.file_id = None;
                    return Ok(Polled::Idle);
                }
                Err(self.io_err(e))
            }
        }
    }

    fn io_err(&self, source: io::Error) -> CoreError {
        CoreError::ReaderIo {
            path: self.path.clone(),
            source,
        }
    }
}
