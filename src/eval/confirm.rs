//! Human confirmation gate
//!
//! A shared [`TaskState`] slot hands confirmation prompts and answers
//! between the evaluation thread and whatever UI answers them. The
//! [`ConfirmationGate`] wraps destructive operations: when confirmation is
//! required it publishes a prompt, polls until the slot leaves
//! `WaitForInput`, and only invokes the operation on an approving answer.
//! There is deliberately no timeout: an unattended prompt blocks forever.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

/// How often the gate rechecks the task slot while waiting for an answer.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Phase of the shared task slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Pending,
    InProgress,
    WaitForInput,
    Finished,
}

struct TaskSlot {
    phase: TaskPhase,
    message: String,
    result: Option<String>,
}

/// Cross-thread task handoff slot.
///
/// One producer (the evaluation chain) and one consumer (the UI) share it by
/// `Arc`; all access goes through the lock, held only for the critical
/// section.
pub struct TaskState {
    slot: Mutex<TaskSlot>,
}

impl TaskState {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(TaskSlot {
                phase: TaskPhase::Pending,
                message: String::new(),
                result: None,
            }),
        }
    }

    /// Return the slot to `Pending` with message and result cleared.
    pub fn reset(&self) {
        let mut slot = self.slot.lock();
        slot.phase = TaskPhase::Pending;
        slot.message.clear();
        slot.result = None;
    }

    pub fn phase(&self) -> TaskPhase {
        self.slot.lock().phase
    }

    pub fn message(&self) -> String {
        self.slot.lock().message.clone()
    }

    pub fn result(&self) -> Option<String> {
        self.slot.lock().result.clone()
    }

    /// Mark the task as running.
    pub fn begin(&self) {
        self.slot.lock().phase = TaskPhase::InProgress;
    }

    /// Mark the task as finished with a result for the UI to pick up.
    pub fn finish(&self, result: &str) {
        let mut slot = self.slot.lock();
        slot.phase = TaskPhase::Finished;
        slot.result = Some(result.to_string());
    }

    /// Publish a prompt and park the task in `WaitForInput`.
    pub fn request_input(&self, prompt: &str) {
        let mut slot = self.slot.lock();
        slot.phase = TaskPhase::WaitForInput;
        slot.message = prompt.to_string();
    }

    /// Answer a pending prompt. Only valid while the slot is in
    /// `WaitForInput`; any other phase ignores the answer and returns
    /// `false`.
    pub fn respond(&self, message: &str) -> bool {
        let mut slot = self.slot.lock();
        if slot.phase != TaskPhase::WaitForInput {
            warn!(phase = ?slot.phase, "no prompt pending; response ignored");
            return false;
        }
        slot.message = message.to_string();
        slot.phase = TaskPhase::InProgress;
        true
    }
}

impl Default for TaskState {
    fn default() -> Self {
        Self::new()
    }
}

/// Gates destructive operations behind asynchronous human approval.
pub struct ConfirmationGate {
    state: Arc<TaskState>,
    required: bool,
}

impl ConfirmationGate {
    pub fn new(state: Arc<TaskState>, required: bool) -> Self {
        Self { state, required }
    }

    pub fn required(&self) -> bool {
        self.required
    }

    /// Shared handle to the task slot, for the answering side.
    pub fn state(&self) -> Arc<TaskState> {
        Arc::clone(&self.state)
    }

    /// Run `operation` behind the gate.
    ///
    /// With confirmation off, the operation always runs. With it on, this
    /// blocks (polling, no timeout) until the prompt is answered; a `y`
    /// answer runs the operation, anything else skips it and returns
    /// `(false, None)`.
    pub fn confirm<T>(
        &self,
        prompt: &str,
        operation: impl FnOnce() -> crate::Result<T>,
    ) -> crate::Result<(bool, Option<T>)> {
        if !self.required {
            return Ok((true, Some(operation()?)));
        }

        info!(prompt, "waiting for human confirmation");
        self.state.request_input(prompt);
        while self.state.phase() == TaskPhase::WaitForInput {
            std::thread::sleep(POLL_INTERVAL);
        }

        let answer = self.state.message();
        if answer.trim().eq_ignore_ascii_case("y") {
            info!("operation approved");
            Ok((true, Some(operation()?)))
        } else {
            info!(answer = %answer, "operation denied");
            Ok((false, None))
        }
    }
}
