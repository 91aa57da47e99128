//! The aggregate engine as a single-owner actor thread.
//!
//! Grounded on `sink::RunnableSink`'s `consume()` loop and
//! `filter::Filter::run`'s shutdown-counting pattern: one thread owns every
//! group's state outright, so updates never need a lock, matching the
//! spec's "actor (one owner task, message-passing updates)" alternative for
//! the concurrency model rather than a lock-guarded concurrent map.

use crate::aggregate::{group_key, GroupAccumulator};
use crate::query::SelectSpec;
use indexmap::IndexMap;
use std::sync::mpsc::Receiver;
use std::thread;

/// A message the session handler or dispatcher sends to a running
/// aggregate engine.
pub enum AggregateMsg {
    /// One line's extracted fields, after `WHERE` has already passed and
    /// `SET` has already been applied.
    Update {
        group_key_fields: IndexMap<String, String>,
    },
    /// Emit a snapshot of every group's current state now.
    Tick,
    /// The source file(s) feeding this engine have reached EOF; emit a
    /// final snapshot and stop.
    Eof,
}

/// Owns every group's running accumulators for one query.
pub struct AggregateEngine {
    select: Vec<SelectSpec>,
    group_by: Vec<String>,
    groups: IndexMap<String, GroupAccumulator>,
}

impl AggregateEngine {
    pub fn new(select: Vec<SelectSpec>, group_by: Vec<String>) -> AggregateEngine {
        AggregateEngine {
            select,
            group_by,
            groups: IndexMap::new(),
        }
    }

    /// Fold one line's fields into its group.
    pub fn apply(&mut self, fields: &IndexMap<String, String>) {
        let key = group_key(&self.group_by, fields);
        let select = &self.select;
        self.groups
            .entry(key)
            .or_insert_with(|| GroupAccumulator::new(select))
            .apply(select, fields);
    }

    /// Serialize every group's current snapshot, one line per group.
    pub fn snapshot(&self) -> Vec<String> {
        self.groups
            .iter()
            .map(|(key, group)| group.serialize(key))
            .collect()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

/// Drive `engine` from `rx` until [`AggregateMsg::Eof`] or the channel
/// closes, calling `emit` with each serialized snapshot line.
pub fn run(mut engine: AggregateEngine, rx: Receiver<AggregateMsg>, mut emit: impl FnMut(String)) {
    for msg in rx {
        match msg {
            AggregateMsg::Update { group_key_fields } => engine.apply(&group_key_fields),
            AggregateMsg::Tick => {
                for line in engine.snapshot() {
                    emit(line);
                }
            }
            AggregateMsg::Eof => {
                for line in engine.snapshot() {
                    emit(line);
                }
                break;
            }
        }
    }
}

/// Spawn [`run`] on its own thread, returning the sender side of its
/// channel and the join handle.
pub fn spawn(
    engine: AggregateEngine,
    emit: impl FnMut(String) + Send + 'static,
) -> (std::sync::mpsc::Sender<AggregateMsg>, thread::JoinHandle<()>) {
    let (tx, rx) = std::sync::mpsc::channel();
    let handle = thread::spawn(move || run(engine, rx, emit));
    (tx, handle)
}
