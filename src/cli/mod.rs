//! Program-level CLI plumbing: a `clap`-independent `Command` enum plus a
//! `run` dispatcher, so `src/bin/cairn.rs` stays a thin argument-parsing
//! shell.

mod command;
mod runner;
mod util;

pub use command::Command;
pub use runner::{run, OutputMode};
pub use util::{parse_composite, DEFAULT_CONCURRENCY, DEFAULT_MANIFEST_LABEL};
