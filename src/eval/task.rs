//! Task configurations
//!
//! Declarative task definitions consumed by the evaluator machinery. Each
//! eval spec names an evaluator type plus ordered reset and eval procedures;
//! a procedure step is a single-key mapping from action name to parameters,
//! e.g. `{"exists": {"/tmp/x": true}}`.

use std::fmt;
use std::path::Path;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One procedure step: an action name and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub action: String,
    pub params: Value,
}

impl Step {
    pub fn new(action: &str, params: Value) -> Self {
        Self {
            action: action.to_string(),
            params,
        }
    }
}

impl Serialize for Step {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.action, &self.params)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StepVisitor;

        impl<'de> Visitor<'de> for StepVisitor {
            type Value = Step;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a single-key map of action name to params")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Step, A::Error> {
                let (action, params): (String, Value) = access
                    .next_entry()?
                    .ok_or_else(|| de::Error::custom("step has no action"))?;
                if access.next_entry::<String, Value>()?.is_some() {
                    return Err(de::Error::custom(format!(
                        "step has more than one action (first: '{action}')"
                    )));
                }
                Ok(Step { action, params })
            }
        }

        deserializer.deserialize_map(StepVisitor)
    }
}

/// One evaluator definition inside a task config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalSpec {
    pub eval_type: String,
    #[serde(default)]
    pub reset_procedure: Vec<Step>,
    #[serde(default)]
    pub eval_procedure: Vec<Step>,
}

/// A complete task definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub task_id: String,
    #[serde(default)]
    pub instruction: String,
    #[serde(default)]
    pub evals: Vec<EvalSpec>,
}

impl TaskConfig {
    /// Load a task config from a JSON file.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TaskConfig = serde_json::from_str(&content)?;
        Ok(config)
    }
}
