//! Replay pipeline
//!
//! Turns a persisted [`SessionRecord`](crate::record::SessionRecord) back
//! into injected input: per-channel players reconstruct the recorded
//! inter-action timing against a shared zero point and feed an [`InputSink`]
//! or [`CommandRunner`]. Sinks shell out to OS injection commands; dry runs
//! swap in logging sinks.

pub mod player;
pub mod sink;

pub use player::{CodePlayer, KeyboardPlayer, MousePlayer, Replayer, ReplayStats};
pub use sink::{
    CommandRunner, InputSink, LogRunner, LogSink, MemoryRunner, MemorySink, ShellRunner,
    ShellSink, SinkCommands,
};
