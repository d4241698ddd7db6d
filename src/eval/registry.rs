//! Handler registries
//!
//! Maps declarative action names from task configs onto check and reset
//! closures. The table is built once in each evaluator's constructor;
//! registering an empty or colliding name is a configuration error at
//! construction time, never a silent overwrite.

use std::collections::HashMap;

use serde_json::Value;

/// Failure raised by a handler while running a single step.
///
/// `Failed` means the verified condition does not hold; `Handler` means the
/// check itself could not run (malformed params, I/O failure, collaborator
/// error). Both zero the step's score; they differ in logging and feedback
/// wording so genuine task failures stay distinguishable from infrastructure
/// problems.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("{0}")]
    Failed(String),

    #[error("handler error: {0}")]
    Handler(String),
}

/// A named action implementation bound into a registry.
pub type Handler = Box<dyn Fn(&Value) -> Result<(), CheckError> + Send>;

/// Action-name lookup tables for one evaluator.
///
/// Eval and reset names are independent namespaces: a reset handler may
/// share a name with a check.
#[derive(Default)]
pub struct HandlerRegistry {
    eval: HashMap<String, Handler>,
    reset: HashMap<String, Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_eval<F>(&mut self, name: &str, handler: F) -> crate::Result<()>
    where
        F: Fn(&Value) -> Result<(), CheckError> + Send + 'static,
    {
        Self::insert(&mut self.eval, "evaluation", name, Box::new(handler))
    }

    pub fn register_reset<F>(&mut self, name: &str, handler: F) -> crate::Result<()>
    where
        F: Fn(&Value) -> Result<(), CheckError> + Send + 'static,
    {
        Self::insert(&mut self.reset, "reset", name, Box::new(handler))
    }

    fn insert(
        table: &mut HashMap<String, Handler>,
        role: &str,
        name: &str,
        handler: Handler,
    ) -> crate::Result<()> {
        if name.is_empty() {
            return Err(crate::Error::Config(format!(
                "cannot register a {role} handler with an empty name"
            )));
        }
        if table.contains_key(name) {
            return Err(crate::Error::Config(format!(
                "duplicate {role} handler '{name}'"
            )));
        }
        table.insert(name.to_string(), handler);
        Ok(())
    }

    pub fn eval_handler(&self, name: &str) -> Option<&Handler> {
        self.eval.get(name)
    }

    pub fn reset_handler(&self, name: &str) -> Option<&Handler> {
        self.reset.get(name)
    }
}
