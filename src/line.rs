//! The line record and per-reader statistics, as consumed by processors and
//! serialized onto the wire by the session handler.

use std::collections::VecDeque;

/// One line read from a file, on its way through a processor to the wire.
///
/// `line_num` is monotonically increasing within one `(host, source_id)`
/// pair. `transmitted_perc` tells the client what fraction of *matched*
/// lines this server actually sent, so the client can surface back-pressure
/// loss rather than silently under-reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord {
    /// The raw bytes of the line, original terminator stripped by the framer
    /// per the processor's declared need.
    pub content: Vec<u8>,
    /// 1-indexed position of this line within its source file.
    pub line_num: u64,
    /// Percentage (1..=100) of matched lines this server has transmitted in
    /// its trailing stats window.
    pub transmitted_perc: u8,
    /// Identifies which glob-branch produced this file: the wildcard
    /// components of the glob, joined by `/`.
    pub source_id: String,
}

impl LineRecord {
    /// Build a new line record. `transmitted_perc` is clamped into `1..=100`
    /// since `0` is never a meaningful value on the wire (spec invariant:
    /// every emitted record has `1 <= transmitted_perc <= 100`).
    pub fn new(content: Vec<u8>, line_num: u64, transmitted_perc: u8, source_id: impl Into<String>) -> LineRecord {
        LineRecord {
            content,
            line_num,
            transmitted_perc: transmitted_perc.clamp(1, 100),
            source_id: source_id.into(),
        }
    }
}

/// A circular window over the last `CAPACITY` processed lines, tracking how
/// many were matched by a processor's filter and how many were actually
/// transmitted (the rest dropped by back-pressure). `transmitted_perc` is
/// `100` whenever nothing has matched yet, by definition.
#[derive(Debug)]
pub struct Stats {
    window: VecDeque<bool>,
    matched: u64,
    transmitted: u64,
    capacity: usize,
}

const DEFAULT_WINDOW: usize = 10_000;

impl Default for Stats {
    fn default() -> Stats {
        Stats::with_capacity(DEFAULT_WINDOW)
    }
}

impl Stats {
    /// Build a stats window holding up to `capacity` matched-line outcomes.
    pub fn with_capacity(capacity: usize) -> Stats {
        Stats {
            window: VecDeque::with_capacity(capacity),
            matched: 0,
            transmitted: 0,
            capacity,
        }
    }

    /// Record that a line matched the processor's filter, and whether it was
    /// transmitted (as opposed to dropped for back-pressure or suppressed by
    /// `max_count`).
    pub fn record(&mut self, transmitted: bool) {
        if self.window.len() == self.capacity {
            if let Some(oldest) = self.window.pop_front() {
                self.matched -= 1;
                if oldest {
                    self.transmitted -= 1;
                }
            }
        }
        self.window.push_back(transmitted);
        self.matched += 1;
        if transmitted {
            self.transmitted += 1;
        }
    }

    /// The percentage of matched lines, within the trailing window, that
    /// were actually transmitted. Defined as `100` when nothing has matched.
    pub fn transmitted_perc(&self) -> u8 {
        if self.matched == 0 {
            100
        } else {
            ((self.transmitted * 100) / self.matched) as u8
        }
    }
}

/// Per-command local context: before/after line windows and a match cap,
/// shared by the grep and tail processors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LContext {
    /// Lines of context to emit before a match.
    pub before_context: usize,
    /// Lines of context to emit after a match.
    pub after_context: usize,
    /// Stop accepting new matches once this many have been seen. `0` means
    /// unlimited.
    pub max_count: usize,
}

impl LContext {
    /// True when any field asks for non-default behaviour.
    pub fn has(&self) -> bool {
        self.before_context != 0 || self.after_context != 0 || self.max_count != 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stats_default_perc_is_100() {
        let stats = Stats::default();
        assert_eq!(stats.transmitted_perc(), 100);
    }

    #[test]
    fn stats_tracks_partial_transmission() {
        let mut stats = Stats::with_capacity(10);
        for _ in 0..5 {
            stats.record(true);
        }
        for _ in 0..5 {
            stats.record(false);
        }
        assert_eq!(stats.transmitted_perc(), 50);
    }

    #[test]
    fn stats_window_evicts_oldest() {
        let mut stats = Stats::with_capacity(4);
        stats.record(true);
        stats.record(true);
        stats.record(true);
        stats.record(true);
        assert_eq!(stats.transmitted_perc(), 100);
        // Pushes out one `true`, pulls in a `false`: 3/4 transmitted.
        stats.record(false);
        assert_eq!(stats.transmitted_perc(), 75);
    }

    #[test]
    fn lcontext_has_detects_any_field() {
        assert!(!LContext::default().has());
        assert!(LContext { before_context: 1, ..Default::default() }.has());
        assert!(LContext { max_count: 1, ..Default::default() }.has());
    }

    #[test]
    fn line_record_clamps_perc() {
        let rec = LineRecord::new(vec![1], 1, 0, "src");
        assert_eq!(rec.transmitted_perc, 1);
        let rec = LineRecord::new(vec![1], 1, 255, "src");
        assert_eq!(rec.transmitted_perc, 100);
    }
}
