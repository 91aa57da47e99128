//! `tail -n <last_n> -f`: buffer the last `last_n` matching lines from the
//! initial read, emit them once as a block when the file's current content
//! has been fully scanned, then pass through everything matched afterward
//! as it streams in.

use crate::line::LContext;
use crate::processor::grep::GrepProcessor;
use crate::processor::{MatchedLine, Outcome, Processor};
use crate::regexspec::CompiledMatcher;
use std::collections::VecDeque;

pub struct TailProcessor {
    grep: GrepProcessor,
    ring: VecDeque<MatchedLine>,
    capacity: usize,
    streaming: bool,
}

impl TailProcessor {
    pub fn new(matcher: CompiledMatcher, ctx: LContext, last_n: usize) -> TailProcessor {
        TailProcessor {
            grep: GrepProcessor::new(matcher, ctx),
            ring: VecDeque::with_capacity(last_n),
            capacity: last_n,
            streaming: false,
        }
    }

    /// Drain the last-N ring buffer and switch to pass-through mode. Call
    /// this exactly once, when the watcher driving this processor first
    /// reports it has caught up to the live end of the file.
    pub fn begin_streaming(&mut self) -> Vec<MatchedLine> {
        self.streaming = true;
        self.ring.drain(..).collect()
    }
}

impl Processor for TailProcessor {
    fn process(&mut self, content: &[u8], line_num: u64) -> Outcome {
        match self.grep.process(content, line_num) {
            Outcome::None => Outcome::None,
            Outcome::Emit(lines) => {
                if self.streaming {
                    Outcome::Emit(lines)
                } else {
                    for line in lines {
                        if self.ring.len() == self.capacity {
                            self.ring.pop_front();
                        }
                        self.ring.push_back(line);
                    }
                    Outcome::None
                }
            }
        }
    }

    fn begin_streaming(&mut self) -> Vec<MatchedLine> {
        TailProcessor::begin_streaming(self)
    }
}
