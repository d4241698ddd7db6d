//! Filesystem evaluator
//!
//! Checks: `exists` (map of path to expected presence), `file_contains`
//! (substring match), `file_matches` (regex match). Resets: `create_file`,
//! `mkdir`, and the gated destructive `delete_file`/`delete_dir`.

use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::eval::confirm::ConfirmationGate;
use crate::eval::evaluator::Evaluator;
use crate::eval::registry::{CheckError, HandlerRegistry};
use crate::eval::task::EvalSpec;

fn expect_object(params: &Value) -> Result<&serde_json::Map<String, Value>, CheckError> {
    params
        .as_object()
        .ok_or_else(|| CheckError::Handler("params must be an object".to_string()))
}

fn parse<T: for<'de> Deserialize<'de>>(params: &Value) -> Result<T, CheckError> {
    serde_json::from_value(params.clone())
        .map_err(|e| CheckError::Handler(format!("malformed params: {e}")))
}

/// `{"exists": {"/tmp/x": true, "/tmp/y": false}}`
fn check_exists(params: &Value) -> Result<(), CheckError> {
    for (path, expected) in expect_object(params)? {
        let expected = expected
            .as_bool()
            .ok_or_else(|| CheckError::Handler(format!("expected a boolean for '{path}'")))?;
        let actual = Path::new(path).exists();
        if actual != expected {
            return Err(CheckError::Failed(format!(
                "{path}: expected exists={expected}, found exists={actual}"
            )));
        }
    }
    Ok(())
}

#[derive(Deserialize)]
struct ContainsParams {
    path: String,
    text: String,
}

/// `{"file_contains": {"path": "...", "text": "..."}}`
fn check_file_contains(params: &Value) -> Result<(), CheckError> {
    let p: ContainsParams = parse(params)?;
    let content = std::fs::read_to_string(&p.path)
        .map_err(|e| CheckError::Failed(format!("{}: cannot read: {e}", p.path)))?;
    if !content.contains(&p.text) {
        return Err(CheckError::Failed(format!(
            "{}: does not contain '{}'",
            p.path, p.text
        )));
    }
    Ok(())
}

#[derive(Deserialize)]
struct MatchesParams {
    path: String,
    pattern: String,
}

/// `{"file_matches": {"path": "...", "pattern": "..."}}`
fn check_file_matches(params: &Value) -> Result<(), CheckError> {
    let p: MatchesParams = parse(params)?;
    let pattern = Regex::new(&p.pattern)
        .map_err(|e| CheckError::Handler(format!("invalid pattern '{}': {e}", p.pattern)))?;
    let content = std::fs::read_to_string(&p.path)
        .map_err(|e| CheckError::Failed(format!("{}: cannot read: {e}", p.path)))?;
    if !pattern.is_match(&content) {
        return Err(CheckError::Failed(format!(
            "{}: does not match /{}/",
            p.path, p.pattern
        )));
    }
    Ok(())
}

#[derive(Deserialize)]
struct CreateFileParams {
    path: String,
    #[serde(default)]
    content: String,
}

fn reset_create_file(params: &Value) -> Result<(), CheckError> {
    let p: CreateFileParams = parse(params)?;
    if let Some(parent) = Path::new(&p.path).parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| CheckError::Handler(format!("{}: {e}", p.path)))?;
    }
    std::fs::write(&p.path, &p.content)
        .map_err(|e| CheckError::Handler(format!("{}: {e}", p.path)))?;
    info!(path = %p.path, "created file");
    Ok(())
}

#[derive(Deserialize)]
struct PathParams {
    path: String,
}

fn reset_mkdir(params: &Value) -> Result<(), CheckError> {
    let p: PathParams = parse(params)?;
    std::fs::create_dir_all(&p.path)
        .map_err(|e| CheckError::Handler(format!("{}: {e}", p.path)))?;
    info!(path = %p.path, "created directory");
    Ok(())
}

fn gated_remove(
    gate: &ConfirmationGate,
    params: &Value,
    noun: &str,
    remove: fn(&Path) -> std::io::Result<()>,
) -> Result<(), CheckError> {
    let p: PathParams = parse(params)?;
    let path = Path::new(&p.path);
    if !path.exists() {
        debug!(path = %p.path, "already absent; nothing to delete");
        return Ok(());
    }
    let (approved, _) = gate
        .confirm(&format!("Delete {noun} '{}'?", p.path), || {
            remove(path)?;
            Ok(())
        })
        .map_err(|e| CheckError::Handler(e.to_string()))?;
    if approved {
        info!(path = %p.path, "deleted {noun}");
    } else {
        warn!(path = %p.path, "deletion denied; baseline may be dirty");
    }
    Ok(())
}

/// Build the filesystem evaluator for one eval spec.
pub fn fs_evaluator(spec: &EvalSpec, gate: Arc<ConfirmationGate>) -> crate::Result<Evaluator> {
    let mut registry = HandlerRegistry::new();
    registry.register_eval("exists", check_exists)?;
    registry.register_eval("file_contains", check_file_contains)?;
    registry.register_eval("file_matches", check_file_matches)?;
    registry.register_reset("create_file", reset_create_file)?;
    registry.register_reset("mkdir", reset_mkdir)?;
    {
        let gate = Arc::clone(&gate);
        registry.register_reset("delete_file", move |params| {
            gated_remove(&gate, params, "file", |path| std::fs::remove_file(path))
        })?;
    }
    registry.register_reset("delete_dir", move |params| {
        gated_remove(&gate, params, "directory", |path| {
            std::fs::remove_dir_all(path)
        })
    })?;
    Ok(Evaluator::new("filesystem", spec, registry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::confirm::{TaskPhase, TaskState};
    use serde_json::json;
    use std::thread;
    use std::time::Duration;

    fn open_gate() -> Arc<ConfirmationGate> {
        Arc::new(ConfirmationGate::new(Arc::new(TaskState::new()), false))
    }

    fn spec_from_json(value: Value) -> EvalSpec {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_exists_check_fails_then_passes_after_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x");
        let spec = spec_from_json(json!({
            "eval_type": "filesystem",
            "eval_procedure": [{"exists": {(path.to_str().unwrap()): true}}],
            "reset_procedure": [{"create_file": {"path": path.to_str().unwrap()}}]
        }));
        let evaluator = fs_evaluator(&spec, open_gate()).unwrap();

        let (score, feedback) = evaluator.evaluate().unwrap();
        assert_eq!(score, 0.0);
        assert!(feedback.contains(path.to_str().unwrap()));
        assert!(feedback.contains("expected exists=true"));
        assert!(feedback.contains("found exists=false"));

        evaluator.reset().unwrap();
        assert!(path.exists());

        let (score, feedback) = evaluator.evaluate().unwrap();
        assert_eq!(score, 1.0);
        assert!(feedback.is_empty());
    }

    #[test]
    fn test_exists_checks_absence_too() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present");
        std::fs::write(&present, "").unwrap();
        let spec = spec_from_json(json!({
            "eval_type": "filesystem",
            "eval_procedure": [{"exists": {(present.to_str().unwrap()): false}}]
        }));
        let evaluator = fs_evaluator(&spec, open_gate()).unwrap();

        let (score, feedback) = evaluator.evaluate().unwrap();
        assert_eq!(score, 0.0);
        assert!(feedback.contains("expected exists=false"));
    }

    #[test]
    fn test_file_contains() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello bench world").unwrap();

        let passing = spec_from_json(json!({
            "eval_type": "filesystem",
            "eval_procedure": [
                {"file_contains": {"path": path.to_str().unwrap(), "text": "bench"}}
            ]
        }));
        let (score, _) = fs_evaluator(&passing, open_gate())
            .unwrap()
            .evaluate()
            .unwrap();
        assert_eq!(score, 1.0);

        let failing = spec_from_json(json!({
            "eval_type": "filesystem",
            "eval_procedure": [
                {"file_contains": {"path": path.to_str().unwrap(), "text": "absent"}}
            ]
        }));
        let (score, feedback) = fs_evaluator(&failing, open_gate())
            .unwrap()
            .evaluate()
            .unwrap();
        assert_eq!(score, 0.0);
        assert!(feedback.contains("does not contain"));

        let missing = spec_from_json(json!({
            "eval_type": "filesystem",
            "eval_procedure": [
                {"file_contains": {"path": "/nonexistent/void.txt", "text": "x"}}
            ]
        }));
        let (score, feedback) = fs_evaluator(&missing, open_gate())
            .unwrap()
            .evaluate()
            .unwrap();
        assert_eq!(score, 0.0);
        assert!(feedback.contains("cannot read"));
    }

    #[test]
    fn test_file_matches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        std::fs::write(&path, "run 42 finished in 3.5s").unwrap();

        let passing = spec_from_json(json!({
            "eval_type": "filesystem",
            "eval_procedure": [
                {"file_matches": {"path": path.to_str().unwrap(), "pattern": r"run \d+ finished"}}
            ]
        }));
        let (score, _) = fs_evaluator(&passing, open_gate())
            .unwrap()
            .evaluate()
            .unwrap();
        assert_eq!(score, 1.0);

        let failing = spec_from_json(json!({
            "eval_type": "filesystem",
            "eval_procedure": [
                {"file_matches": {"path": path.to_str().unwrap(), "pattern": r"run \d+ aborted"}}
            ]
        }));
        let (score, feedback) = fs_evaluator(&failing, open_gate())
            .unwrap()
            .evaluate()
            .unwrap();
        assert_eq!(score, 0.0);
        assert!(feedback.contains("does not match"));

        // An invalid pattern is a handler error, not a plain failure.
        let invalid = spec_from_json(json!({
            "eval_type": "filesystem",
            "eval_procedure": [
                {"file_matches": {"path": path.to_str().unwrap(), "pattern": "(unclosed"}}
            ]
        }));
        let (score, feedback) = fs_evaluator(&invalid, open_gate())
            .unwrap()
            .evaluate()
            .unwrap();
        assert_eq!(score, 0.0);
        assert!(feedback.contains("could not run"));
    }

    #[test]
    fn test_create_file_with_content_and_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deep/file.txt");
        let spec = spec_from_json(json!({
            "eval_type": "filesystem",
            "reset_procedure": [
                {"create_file": {"path": path.to_str().unwrap(), "content": "seeded"}}
            ]
        }));

        fs_evaluator(&spec, open_gate()).unwrap().reset().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "seeded");
    }

    #[test]
    fn test_mkdir_and_delete_dir() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("workspace");
        let make = spec_from_json(json!({
            "eval_type": "filesystem",
            "reset_procedure": [{"mkdir": {"path": target.to_str().unwrap()}}]
        }));
        fs_evaluator(&make, open_gate()).unwrap().reset().unwrap();
        assert!(target.is_dir());

        let remove = spec_from_json(json!({
            "eval_type": "filesystem",
            "reset_procedure": [{"delete_dir": {"path": target.to_str().unwrap()}}]
        }));
        fs_evaluator(&remove, open_gate()).unwrap().reset().unwrap();
        assert!(!target.exists());
    }

    #[test]
    fn test_malformed_params_zero_the_check() {
        let spec = spec_from_json(json!({
            "eval_type": "filesystem",
            "eval_procedure": [{"exists": {"/tmp/x": "yes"}}]
        }));
        let (score, feedback) = fs_evaluator(&spec, open_gate())
            .unwrap()
            .evaluate()
            .unwrap();
        assert_eq!(score, 0.0);
        assert!(feedback.contains("could not run"));
    }

    #[test]
    fn test_malformed_reset_params_are_fatal() {
        let spec = spec_from_json(json!({
            "eval_type": "filesystem",
            "reset_procedure": [{"create_file": {"file": "/tmp/x"}}]
        }));
        let err = fs_evaluator(&spec, open_gate())
            .unwrap()
            .reset()
            .unwrap_err();
        assert!(matches!(err, crate::Error::Eval(_)));
    }

    fn respond_async(state: Arc<TaskState>, answer: &'static str) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            while state.phase() != TaskPhase::WaitForInput {
                thread::sleep(Duration::from_millis(5));
            }
            state.respond(answer);
        })
    }

    #[test]
    fn test_gated_delete_denied_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("precious");
        std::fs::write(&path, "data").unwrap();

        let state = Arc::new(TaskState::new());
        let gate = Arc::new(ConfirmationGate::new(Arc::clone(&state), true));
        let spec = spec_from_json(json!({
            "eval_type": "filesystem",
            "reset_procedure": [{"delete_file": {"path": path.to_str().unwrap()}}]
        }));
        let evaluator = fs_evaluator(&spec, gate).unwrap();

        let responder = respond_async(Arc::clone(&state), "n");
        evaluator.reset().unwrap();
        responder.join().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_gated_delete_approved_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disposable");
        std::fs::write(&path, "data").unwrap();

        let state = Arc::new(TaskState::new());
        let gate = Arc::new(ConfirmationGate::new(Arc::clone(&state), true));
        let spec = spec_from_json(json!({
            "eval_type": "filesystem",
            "reset_procedure": [{"delete_file": {"path": path.to_str().unwrap()}}]
        }));
        let evaluator = fs_evaluator(&spec, gate).unwrap();

        let responder = respond_async(Arc::clone(&state), "y");
        evaluator.reset().unwrap();
        responder.join().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_delete_missing_file_skips_the_gate() {
        // A gate with no responder would block forever if consulted.
        let state = Arc::new(TaskState::new());
        let gate = Arc::new(ConfirmationGate::new(state, true));
        let spec = spec_from_json(json!({
            "eval_type": "filesystem",
            "reset_procedure": [{"delete_file": {"path": "/nonexistent/ghost"}}]
        }));
        fs_evaluator(&spec, gate).unwrap().reset().unwrap();
    }
}
