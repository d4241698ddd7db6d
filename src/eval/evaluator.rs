//! Evaluator execution
//!
//! An [`Evaluator`] owns a handler registry plus the reset and eval
//! procedures from one eval spec. Reset steps mutate external state to a
//! known baseline and any failure is fatal; eval steps are checks whose
//! failures are recoverable: a failed check zeroes the step score, captures
//! feedback, and execution continues. Unknown action names are always fatal,
//! in either procedure, because they mean the task config is broken.
//!
//! [`EvaluatorComb`] aggregates evaluators with AND semantics: the overall
//! score is the product of per-evaluator scores, so one failing check
//! anywhere zeroes the run.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::eval::confirm::ConfirmationGate;
use crate::eval::fs_eval::fs_evaluator;
use crate::eval::proc_eval::proc_evaluator;
use crate::eval::registry::{CheckError, HandlerRegistry};
use crate::eval::task::{EvalSpec, Step, TaskConfig};

/// Runs one eval spec's procedures through its handler registry.
pub struct Evaluator {
    name: String,
    reset_procedure: Vec<Step>,
    eval_procedure: Vec<Step>,
    registry: HandlerRegistry,
}

impl Evaluator {
    pub fn new(name: &str, spec: &EvalSpec, registry: HandlerRegistry) -> Self {
        Self {
            name: name.to_string(),
            reset_procedure: spec.reset_procedure.clone(),
            eval_procedure: spec.eval_procedure.clone(),
            registry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the reset procedure in order, mutating external state to the
    /// task baseline. Unknown actions and handler failures are both fatal:
    /// continuing after a partial reset would score against a dirty
    /// baseline.
    pub fn reset(&self) -> crate::Result<()> {
        for step in &self.reset_procedure {
            let handler = self.registry.reset_handler(&step.action).ok_or_else(|| {
                crate::Error::Config(format!(
                    "unknown reset action '{}' for evaluator '{}'",
                    step.action, self.name
                ))
            })?;
            info!(evaluator = %self.name, action = %step.action, "running reset step");
            handler(&step.params).map_err(|e| {
                crate::Error::Eval(format!(
                    "reset step '{}' of evaluator '{}' failed: {e}",
                    step.action, self.name
                ))
            })?;
        }
        Ok(())
    }

    /// Run every check in the eval procedure.
    ///
    /// The score starts at 1.0 and is multiplied by each step's pass/fail
    /// score, so the result is 1.0 exactly when every check passed. Failed
    /// checks append their message to the feedback and execution continues.
    pub fn evaluate(&self) -> crate::Result<(f64, String)> {
        let mut score = 1.0;
        let mut feedback: Vec<String> = Vec::new();
        for step in &self.eval_procedure {
            let handler = self.registry.eval_handler(&step.action).ok_or_else(|| {
                crate::Error::Config(format!(
                    "unknown evaluation action '{}' for evaluator '{}'",
                    step.action, self.name
                ))
            })?;
            let step_score = match handler(&step.params) {
                Ok(()) => {
                    debug!(evaluator = %self.name, action = %step.action, "check passed");
                    1.0
                }
                Err(CheckError::Failed(message)) => {
                    warn!(
                        evaluator = %self.name,
                        action = %step.action,
                        %message,
                        "check failed"
                    );
                    feedback.push(message);
                    0.0
                }
                Err(CheckError::Handler(message)) => {
                    // May be a real bug rather than a task-failure signal.
                    error!(
                        evaluator = %self.name,
                        action = %step.action,
                        %message,
                        "check handler error"
                    );
                    feedback.push(format!(
                        "{}: check '{}' could not run: {message}",
                        self.name, step.action
                    ));
                    0.0
                }
            };
            score *= step_score;
        }
        Ok((score, feedback.join("\n")))
    }
}

/// An ordered combination of evaluators scored with AND semantics.
pub struct EvaluatorComb {
    evaluators: Vec<Evaluator>,
}

impl std::fmt::Debug for EvaluatorComb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluatorComb")
            .field(
                "evaluators",
                &self.evaluators.iter().map(Evaluator::name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl EvaluatorComb {
    pub fn new(evaluators: Vec<Evaluator>) -> Self {
        Self { evaluators }
    }

    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }

    /// Reset every evaluator in order. Order matters when evaluators share
    /// external state.
    pub fn reset(&self) -> crate::Result<()> {
        for evaluator in &self.evaluators {
            evaluator.reset()?;
        }
        Ok(())
    }

    /// Multiply per-evaluator scores and concatenate their feedback.
    pub fn evaluate(&self) -> crate::Result<(f64, String)> {
        let mut score = 1.0;
        let mut feedback: Vec<String> = Vec::new();
        for evaluator in &self.evaluators {
            let (evaluator_score, evaluator_feedback) = evaluator.evaluate()?;
            score *= evaluator_score;
            if !evaluator_feedback.is_empty() {
                feedback.push(evaluator_feedback);
            }
        }
        Ok((score, feedback.join("\n")))
    }
}

/// Build the evaluator combination for a task config.
///
/// Fails on an unknown `eval_type` and propagates handler registration
/// errors, so a malformed task definition surfaces before anything runs.
pub fn build_comb(config: &TaskConfig, gate: Arc<ConfirmationGate>) -> crate::Result<EvaluatorComb> {
    let mut evaluators = Vec::with_capacity(config.evals.len());
    for spec in &config.evals {
        let evaluator = match spec.eval_type.as_str() {
            "filesystem" => fs_evaluator(spec, Arc::clone(&gate))?,
            "process" => proc_evaluator(spec, Arc::clone(&gate))?,
            other => {
                return Err(crate::Error::Config(format!(
                    "unknown eval type '{other}' in task '{}'",
                    config.task_id
                )))
            }
        };
        evaluators.push(evaluator);
    }
    Ok(EvaluatorComb::new(evaluators))
}
