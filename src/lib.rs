//! # Deskbench
//!
//! A desktop task benchmark harness core: it records human or agent
//! demonstrations (screen frames plus input events), replays recorded
//! sessions with reconstructed timing, and scores task completion against
//! declarative task configs.
//!
//! ## Overview
//!
//! The library has two halves. The recording half captures screen frames and
//! keyboard/mouse events on background threads, windows and prunes the event
//! streams, and persists a session record. The evaluation half builds
//! composable evaluators from data-driven task configs, resets external
//! state to a baseline, runs named checks, and returns a score/feedback
//! pair. Destructive operations can be gated behind asynchronous human
//! confirmation shared across threads.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use deskbench::eval::{build_comb, ConfirmationGate, TaskConfig, TaskState};
//!
//! fn main() -> deskbench::Result<()> {
//!     let config: TaskConfig = serde_json::from_str(
//!         r#"{
//!             "task_id": "touch-marker",
//!             "evals": [{
//!                 "eval_type": "filesystem",
//!                 "reset_procedure": [{"create_file": {"path": "/tmp/marker"}}],
//!                 "eval_procedure": [{"exists": {"/tmp/marker": true}}]
//!             }]
//!         }"#,
//!     )?;
//!
//!     let state = Arc::new(TaskState::new());
//!     let gate = Arc::new(ConfirmationGate::new(state, false));
//!     let comb = build_comb(&config, gate)?;
//!
//!     comb.reset()?;
//!     let (score, feedback) = comb.evaluate()?;
//!     println!("score={score} feedback={feedback}");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The system is organized into the following modules:
//!
//! - [`record`]: multi-threaded screen/input capture, event pruning, and
//!   session persistence
//! - [`replay`]: per-channel players re-injecting recorded events at
//!   reconstructed timing
//! - [`eval`]: evaluators, handler registries, task configs, and the
//!   human-confirmation gate
//! - [`time`]: wall-clock timestamps and pacing helpers
//! - [`app`]: CLI and configuration management
//!
//! ## Recording pipeline
//!
//! ```text
//! ┌─────────────┐    ┌─────────────┐    ┌─────────────┐    ┌─────────────┐
//! │ Input feeds │───▶│ Ring Buffer │───▶│  Event log  │───▶│   Session   │
//! │ (callbacks) │    │ (lock-free) │    │ (win+prune) │    │   record    │
//! └─────────────┘    └─────────────┘    └─────────────┘    └─────────────┘
//!                                                                 │
//! ┌─────────────┐    ┌─────────────┐                              ▼
//! │ FrameSource │───▶│ FrameBuffer │────────────────────▶ video + actions
//! │ (paced grab)│    │  (locked)   │                        on disk
//! └─────────────┘    └─────────────┘
//! ```

pub mod time;
pub mod record;
pub mod replay;
pub mod eval;
pub mod app;

// Re-export commonly used types
pub use eval::{build_comb, ConfirmationGate, Evaluator, EvaluatorComb, TaskConfig, TaskState};
pub use record::{Event, EventData, EventKind, FrameBuffer, Recorder, SessionRecord};
pub use replay::Replayer;

/// Result type alias for the harness
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the harness
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Recorder error: {0}")]
    Record(String),

    #[error("Replay error: {0}")]
    Replay(String),

    #[error("Evaluation error: {0}")]
    Eval(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}
