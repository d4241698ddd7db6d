//! Timing module
//!
//! Wall-clock timestamps for recorded events and sleep-based pacing for the
//! capture and replay loops.

pub mod clock;

pub use clock::{wait_for_offset, wall_time, FramePacer};
