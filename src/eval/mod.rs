//! Task evaluation
//!
//! Data-driven verification of task outcomes. A task config names evaluator
//! types and their reset/eval procedures; [`build_comb`] turns it into an
//! [`EvaluatorComb`] whose score is the product of every check (AND
//! semantics). Reset procedures mutate external state to a baseline, with
//! destructive steps gated behind the human [`ConfirmationGate`].

pub mod confirm;
pub mod evaluator;
pub mod fs_eval;
pub mod proc_eval;
pub mod registry;
pub mod task;

pub use confirm::{ConfirmationGate, TaskPhase, TaskState, POLL_INTERVAL};
pub use evaluator::{build_comb, Evaluator, EvaluatorComb};
pub use fs_eval::fs_evaluator;
pub use proc_eval::proc_evaluator;
pub use registry::{CheckError, Handler, HandlerRegistry};
pub use task::{EvalSpec, Step, TaskConfig};
