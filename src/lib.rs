//! dtail is a distributed log-reading and streaming-aggregation system.
//!
//! A client issues `cat`/`grep`/`tail`/`map` commands against a glob
//! pattern; the command fans out over a session protocol to every
//! configured server, each of which reads and filters its local matches of
//! the glob and streams results (or, for `map`, pre-aggregated snapshots)
//! back to the client, which merges the per-server streams into one view.
//!
//! Module map:
//!
//!  * [`error`] - the shared error/disposition vocabulary.
//!  * [`pool`], [`framer`] - pooled buffers and the line-framing state
//!    machine reading off of them.
//!  * [`line`], [`cancel`], [`permission`], [`regexspec`] - small shared
//!    types used throughout the reader, processor and session layers.
//!  * [`reader`] - glob expansion, admission control and the polling file
//!    watcher.
//!  * [`processor`] - `cat`/`grep`/`tail` line filtering and the MapReduce
//!    per-line field extractor.
//!  * [`query`] - the MapReduce query language: lexer, parser, log formats
//!    and scalar functions.
//!  * [`aggregate`] - per-server pre-aggregation and client-side merge.
//!  * [`session`] - the wire protocol and the server-side session handler.
//!  * [`client`] - the client-side fan-out and rendering.
//!  * [`config`] - CLI and TOML configuration for both binaries.
#![deny(unstable_features, unused_import_braces)]

pub mod aggregate;
pub mod cancel;
pub mod client;
pub mod config;
pub mod error;
pub mod framer;
pub mod line;
pub mod permission;
pub mod pool;
pub mod processor;
pub mod query;
pub mod reader;
pub mod regexspec;
pub mod session;
