//! File discovery, admission and polling: turning a command's glob pattern
//! into a stream of [`crate::framer::Frame`]s per matched file.

pub mod admission;
pub mod dispatcher;
pub mod watcher;

pub use admission::{Admission, Permit};
pub use dispatcher::{expand, open_watcher, source_id_for, CommandKind, Target};
pub use watcher::{FileWatcher, Mode, Polled};
