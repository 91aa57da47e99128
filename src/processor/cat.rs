//! The trivial processor: every line is emitted, unfiltered.

use crate::processor::{MatchedLine, Outcome, Processor};

#[derive(Debug, Default)]
pub struct CatProcessor;

impl Processor for CatProcessor {
    fn process(&mut self, content: &[u8], line_num: u64) -> Outcome {
        Outcome::Emit(vec![MatchedLine {
            content: content.to_vec(),
            line_num,
        }])
    }
}
