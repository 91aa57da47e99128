//! Regex/literal line filtering with before/after context windows and a
//! match cap, shared (via composition) with [`crate::processor::tail`].

use crate::line::LContext;
use crate::processor::{MatchedLine, Outcome, Processor};
use crate::regexspec::CompiledMatcher;
use std::collections::VecDeque;

pub struct GrepProcessor {
    matcher: CompiledMatcher,
    ctx: LContext,
    before_buf: VecDeque<MatchedLine>,
    after_remaining: usize,
    matches_emitted: usize,
    done: bool,
}

impl GrepProcessor {
    pub fn new(matcher: CompiledMatcher, ctx: LContext) -> GrepProcessor {
        GrepProcessor {
            matcher,
            before_buf: VecDeque::with_capacity(ctx.before_context),
            ctx,
            after_remaining: 0,
            matches_emitted: 0,
            done: false,
        }
    }

    fn push_before(&mut self, line: MatchedLine) {
        if self.ctx.before_context == 0 {
            return;
        }
        if self.before_buf.len() == self.ctx.before_context {
            self.before_buf.pop_front();
        }
        self.before_buf.push_back(line);
    }

    fn max_count_reached(&self) -> bool {
        self.ctx.max_count != 0 && self.matches_emitted >= self.ctx.max_count
    }
}

impl Processor for GrepProcessor {
    fn process(&mut self, content: &[u8], line_num: u64) -> Outcome {
        if self.done {
            return Outcome::None;
        }
        let line = MatchedLine {
            content: content.to_vec(),
            line_num,
        };
        if self.matcher.matches(content) {
            if self.max_count_reached() {
                self.done = true;
                return Outcome::None;
            }
            self.matches_emitted += 1;
            let mut out: Vec<MatchedLine> = self.before_buf.drain(..).collect();
            out.push(line);
            self.after_remaining = self.ctx.after_context;
            if self.after_remaining == 0 && self.max_count_reached() {
                self.done = true;
            }
            Outcome::Emit(out)
        } else if self.after_remaining > 0 {
            self.after_remaining -= 1;
            if self.after_remaining == 0 && self.max_count_reached() {
                self.done = true;
            }
            Outcome::Emit(vec![line])
        } else {
            self.push_before(line);
            Outcome::None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::regexspec::RegexSpec;

    fn matcher(pattern: &str) -> CompiledMatcher {
        RegexSpec::detect(pattern).compile().unwrap()
    }

    #[test]
    fn emits_only_matching_lines_with_no_context() {
        let mut p = GrepProcessor::new(matcher("ERROR"), LContext::default());
        assert_eq!(p.process(b"info", 1), Outcome::None);
        match p.process(b"an ERROR occurred", 2) {
            Outcome::Emit(lines) => assert_eq!(lines, vec![MatchedLine { content: b"an ERROR occurred".to_vec(), line_num: 2 }]),
            Outcome::None => panic!("expected a match"),
        }
    }

    #[test]
    fn before_context_is_flushed_with_the_match() {
        let ctx = LContext { before_context: 2, ..Default::default() };
        let mut p = GrepProcessor::new(matcher("ERROR"), ctx);
        assert_eq!(p.process(b"a", 1), Outcome::None);
        assert_eq!(p.process(b"b", 2), Outcome::None);
        assert_eq!(p.process(b"c", 3), Outcome::None); // evicts "a"
        match p.process(b"ERROR here", 4) {
            Outcome::Emit(lines) => {
                let nums: Vec<u64> = lines.iter().map(|l| l.line_num).collect();
                assert_eq!(nums, vec![2, 3, 4]);
            }
            Outcome::None => panic!("expected match with context"),
        }
    }

    #[test]
    fn after_context_follows_a_match() {
        let ctx = LContext { after_context: 2, ..Default::default() };
        let mut p = GrepProcessor::new(matcher("ERROR"), ctx);
        match p.process(b"ERROR", 1) {
            Outcome::Emit(lines) => assert_eq!(lines.len(), 1),
            Outcome::None => panic!(),
        }
        match p.process(b"after one", 2) {
            Outcome::Emit(lines) => assert_eq!(lines[0].line_num, 2),
            Outcome::None => panic!("expected after-context line"),
        }
        match p.process(b"after two", 3) {
            Outcome::Emit(lines) => assert_eq!(lines[0].line_num, 3),
            Outcome::None => panic!("expected after-context line"),
        }
        assert_eq!(p.process(b"after window closed", 4), Outcome::None);
    }

    #[test]
    fn max_count_stops_further_matches() {
        let ctx = LContext { max_count: 1, ..Default::default() };
        let mut p = GrepProcessor::new(matcher("ERROR"), ctx);
        assert!(matches!(p.process(b"ERROR one", 1), Outcome::Emit(_)));
        assert_eq!(p.process(b"ERROR two", 2), Outcome::None);
    }
}
