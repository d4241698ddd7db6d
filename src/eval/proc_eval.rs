//! Process evaluator
//!
//! Checks: `is_running` (map of process name to expected state, probed with
//! `pgrep`). Resets: `run` (blocking shell command), `launch` (detached
//! spawn), and the gated destructive `terminate` (`pkill`).

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::eval::confirm::ConfirmationGate;
use crate::eval::evaluator::Evaluator;
use crate::eval::registry::{CheckError, HandlerRegistry};
use crate::eval::task::EvalSpec;
use crate::record::wm::shell_status;

fn expect_object(params: &Value) -> Result<&serde_json::Map<String, Value>, CheckError> {
    params
        .as_object()
        .ok_or_else(|| CheckError::Handler("params must be an object".to_string()))
}

fn parse<T: for<'de> Deserialize<'de>>(params: &Value) -> Result<T, CheckError> {
    serde_json::from_value(params.clone())
        .map_err(|e| CheckError::Handler(format!("malformed params: {e}")))
}

/// Single-quote a value for safe interpolation into a shell command.
fn sh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

fn probe_running(name: &str) -> Result<bool, CheckError> {
    let status = shell_status(&format!("pgrep -x {} > /dev/null", sh_quote(name)))
        .map_err(|e| CheckError::Handler(e.to_string()))?;
    match status.code() {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        _ => Err(CheckError::Handler(format!(
            "pgrep for '{name}' failed with {status}"
        ))),
    }
}

/// `{"is_running": {"firefox": true, "vim": false}}`
fn check_is_running(params: &Value) -> Result<(), CheckError> {
    for (name, expected) in expect_object(params)? {
        let expected = expected
            .as_bool()
            .ok_or_else(|| CheckError::Handler(format!("expected a boolean for '{name}'")))?;
        let actual = probe_running(name)?;
        if actual != expected {
            return Err(CheckError::Failed(format!(
                "{name}: expected running={expected}, found running={actual}"
            )));
        }
    }
    Ok(())
}

#[derive(Deserialize)]
struct CommandParams {
    command: String,
}

/// Run a setup command and wait for it; a non-zero exit is a reset failure.
fn reset_run(params: &Value) -> Result<(), CheckError> {
    let p: CommandParams = parse(params)?;
    let status =
        shell_status(&p.command).map_err(|e| CheckError::Handler(e.to_string()))?;
    if !status.success() {
        return Err(CheckError::Handler(format!(
            "command failed with {status}: {}",
            p.command
        )));
    }
    info!(command = %p.command, "ran setup command");
    Ok(())
}

/// Spawn a command detached; the child outlives the reset.
fn reset_launch(params: &Value) -> Result<(), CheckError> {
    let p: CommandParams = parse(params)?;
    #[cfg(unix)]
    let child = std::process::Command::new("sh")
        .arg("-c")
        .arg(&p.command)
        .spawn();
    #[cfg(windows)]
    let child = std::process::Command::new("cmd")
        .arg("/C")
        .arg(&p.command)
        .spawn();
    let child = child.map_err(|e| CheckError::Handler(format!("{}: {e}", p.command)))?;
    info!(command = %p.command, pid = child.id(), "launched process");
    Ok(())
}

#[derive(Deserialize)]
struct NameParams {
    name: String,
}

fn reset_terminate(gate: &ConfirmationGate, params: &Value) -> Result<(), CheckError> {
    let p: NameParams = parse(params)?;
    let (approved, _) = gate
        .confirm(&format!("Terminate process '{}'?", p.name), || {
            let status = shell_status(&format!("pkill -x {}", sh_quote(&p.name)))?;
            // pkill exits 1 when nothing matched; the goal state holds.
            match status.code() {
                Some(0) | Some(1) => Ok(()),
                _ => Err(crate::Error::Eval(format!(
                    "pkill for '{}' failed with {status}",
                    p.name
                ))),
            }
        })
        .map_err(|e| CheckError::Handler(e.to_string()))?;
    if approved {
        info!(name = %p.name, "terminated process");
    } else {
        warn!(name = %p.name, "termination denied; baseline may be dirty");
    }
    Ok(())
}

/// Build the process evaluator for one eval spec.
pub fn proc_evaluator(spec: &EvalSpec, gate: Arc<ConfirmationGate>) -> crate::Result<Evaluator> {
    let mut registry = HandlerRegistry::new();
    registry.register_eval("is_running", check_is_running)?;
    registry.register_reset("run", reset_run)?;
    registry.register_reset("launch", reset_launch)?;
    registry.register_reset("terminate", move |params| reset_terminate(&gate, params))?;
    Ok(Evaluator::new("process", spec, registry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::confirm::TaskState;
    use serde_json::json;

    const GHOST: &str = "deskbench-no-such-proc";

    fn open_gate() -> Arc<ConfirmationGate> {
        Arc::new(ConfirmationGate::new(Arc::new(TaskState::new()), false))
    }

    fn spec_from_json(value: Value) -> EvalSpec {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_sh_quote_escapes_single_quotes() {
        assert_eq!(sh_quote("plain"), "'plain'");
        assert_eq!(sh_quote("it's"), r#"'it'\''s'"#);
    }

    #[cfg(unix)]
    #[test]
    fn test_absent_process_checks() {
        let passing = spec_from_json(json!({
            "eval_type": "process",
            "eval_procedure": [{"is_running": {(GHOST): false}}]
        }));
        let (score, _) = proc_evaluator(&passing, open_gate())
            .unwrap()
            .evaluate()
            .unwrap();
        assert_eq!(score, 1.0);

        let failing = spec_from_json(json!({
            "eval_type": "process",
            "eval_procedure": [{"is_running": {(GHOST): true}}]
        }));
        let (score, feedback) = proc_evaluator(&failing, open_gate())
            .unwrap()
            .evaluate()
            .unwrap();
        assert_eq!(score, 0.0);
        assert!(feedback.contains(GHOST));
        assert!(feedback.contains("expected running=true"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_blocks_until_done() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("made");
        let spec = spec_from_json(json!({
            "eval_type": "process",
            "reset_procedure": [
                {"run": {"command": format!("mkdir -p {}", marker.display())}}
            ]
        }));

        proc_evaluator(&spec, open_gate()).unwrap().reset().unwrap();
        assert!(marker.is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_failure_is_fatal() {
        let spec = spec_from_json(json!({
            "eval_type": "process",
            "reset_procedure": [{"run": {"command": "false"}}]
        }));
        let err = proc_evaluator(&spec, open_gate())
            .unwrap()
            .reset()
            .unwrap_err();
        assert!(matches!(err, crate::Error::Eval(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_launch_spawns_detached() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("touched");
        let spec = spec_from_json(json!({
            "eval_type": "process",
            "reset_procedure": [
                {"launch": {"command": format!("touch {}", marker.display())}}
            ]
        }));

        proc_evaluator(&spec, open_gate()).unwrap().reset().unwrap();
        // The launch does not wait, so poll for the side effect.
        for _ in 0..100 {
            if marker.exists() {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        panic!("launched command never ran");
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_missing_process_is_ok() {
        let spec = spec_from_json(json!({
            "eval_type": "process",
            "reset_procedure": [{"terminate": {"name": GHOST}}]
        }));
        proc_evaluator(&spec, open_gate()).unwrap().reset().unwrap();
    }
}
