//! Replay output sinks
//!
//! A [`InputSink`] receives the decoded input actions during replay; a
//! [`CommandRunner`] executes recorded code actions. The shipped sinks shell
//! out to OS injection commands built from configurable templates; the log
//! variants drive dry runs, and the memory variants back tests.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::record::event::{Button, EventData};
use crate::record::wm::shell_status;

/// Receives replayed mouse and keyboard actions.
pub trait InputSink: Send {
    fn mouse_move(&mut self, x: f64, y: f64) -> crate::Result<()>;
    fn mouse_down(&mut self, x: f64, y: f64, button: Button) -> crate::Result<()>;
    fn mouse_up(&mut self, x: f64, y: f64, button: Button) -> crate::Result<()>;
    fn scroll(&mut self, x: f64, y: f64, dx: i32, dy: i32) -> crate::Result<()>;
    fn key_press(&mut self, key: &str) -> crate::Result<()>;
    fn key_release(&mut self, key: &str) -> crate::Result<()>;
}

/// Executes replayed code actions.
pub trait CommandRunner: Send {
    fn run(&mut self, command: &str) -> crate::Result<()>;
}

/// Injection command templates for [`ShellSink`].
///
/// Placeholders: `{x}`, `{y}` (rounded to integers), `{button}` (name),
/// `{button_num}` (X11 button number), `{key}`, `{dx}`, `{dy}`. An empty
/// template disables that action type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkCommands {
    pub mouse_move: String,
    pub mouse_down: String,
    pub mouse_up: String,
    pub scroll: String,
    pub key_press: String,
    pub key_release: String,
}

impl Default for SinkCommands {
    fn default() -> Self {
        Self {
            mouse_move: "xdotool mousemove {x} {y}".to_string(),
            mouse_down: "xdotool mousemove {x} {y} mousedown {button_num}".to_string(),
            mouse_up: "xdotool mousemove {x} {y} mouseup {button_num}".to_string(),
            scroll: String::new(),
            key_press: "xdotool keydown {key}".to_string(),
            key_release: "xdotool keyup {key}".to_string(),
        }
    }
}

fn button_num(button: Button) -> u8 {
    match button {
        Button::Left => 1,
        Button::Middle => 2,
        Button::Right => 3,
    }
}

/// Input sink backed by external injection commands.
pub struct ShellSink {
    commands: SinkCommands,
}

impl ShellSink {
    pub fn new(commands: SinkCommands) -> Self {
        Self { commands }
    }

    /// Substitute placeholders and run the command; an empty template is a
    /// no-op.
    fn dispatch(&self, template: &str, fill: &[(&str, String)]) -> crate::Result<()> {
        if template.is_empty() {
            debug!("no injection command configured; action skipped");
            return Ok(());
        }
        let mut command = template.to_string();
        for (placeholder, value) in fill {
            command = command.replace(placeholder, value);
        }
        let status = shell_status(&command)?;
        if !status.success() {
            return Err(crate::Error::Replay(format!(
                "injection command failed with {status}: {command}"
            )));
        }
        Ok(())
    }
}

fn coord(value: f64) -> String {
    format!("{}", value.round() as i64)
}

impl InputSink for ShellSink {
    fn mouse_move(&mut self, x: f64, y: f64) -> crate::Result<()> {
        self.dispatch(
            &self.commands.mouse_move,
            &[("{x}", coord(x)), ("{y}", coord(y))],
        )
    }

    fn mouse_down(&mut self, x: f64, y: f64, button: Button) -> crate::Result<()> {
        self.dispatch(
            &self.commands.mouse_down,
            &[
                ("{x}", coord(x)),
                ("{y}", coord(y)),
                ("{button}", button.as_str().to_string()),
                ("{button_num}", button_num(button).to_string()),
            ],
        )
    }

    fn mouse_up(&mut self, x: f64, y: f64, button: Button) -> crate::Result<()> {
        self.dispatch(
            &self.commands.mouse_up,
            &[
                ("{x}", coord(x)),
                ("{y}", coord(y)),
                ("{button}", button.as_str().to_string()),
                ("{button_num}", button_num(button).to_string()),
            ],
        )
    }

    fn scroll(&mut self, x: f64, y: f64, dx: i32, dy: i32) -> crate::Result<()> {
        self.dispatch(
            &self.commands.scroll,
            &[
                ("{x}", coord(x)),
                ("{y}", coord(y)),
                ("{dx}", dx.to_string()),
                ("{dy}", dy.to_string()),
            ],
        )
    }

    fn key_press(&mut self, key: &str) -> crate::Result<()> {
        self.dispatch(&self.commands.key_press, &[("{key}", key.to_string())])
    }

    fn key_release(&mut self, key: &str) -> crate::Result<()> {
        self.dispatch(&self.commands.key_release, &[("{key}", key.to_string())])
    }
}

/// Command runner that executes recorded code actions through the shell.
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&mut self, command: &str) -> crate::Result<()> {
        let status = shell_status(command)?;
        if !status.success() {
            return Err(crate::Error::Replay(format!(
                "code action failed with {status}: {command}"
            )));
        }
        Ok(())
    }
}

/// Dry-run sink: logs every action instead of injecting it.
pub struct LogSink;

impl InputSink for LogSink {
    fn mouse_move(&mut self, x: f64, y: f64) -> crate::Result<()> {
        info!(x, y, "would move mouse");
        Ok(())
    }

    fn mouse_down(&mut self, x: f64, y: f64, button: Button) -> crate::Result<()> {
        info!(x, y, button = button.as_str(), "would press mouse button");
        Ok(())
    }

    fn mouse_up(&mut self, x: f64, y: f64, button: Button) -> crate::Result<()> {
        info!(x, y, button = button.as_str(), "would release mouse button");
        Ok(())
    }

    fn scroll(&mut self, x: f64, y: f64, dx: i32, dy: i32) -> crate::Result<()> {
        info!(x, y, dx, dy, "would scroll");
        Ok(())
    }

    fn key_press(&mut self, key: &str) -> crate::Result<()> {
        info!(key, "would press key");
        Ok(())
    }

    fn key_release(&mut self, key: &str) -> crate::Result<()> {
        info!(key, "would release key");
        Ok(())
    }
}

/// Dry-run command runner.
pub struct LogRunner;

impl CommandRunner for LogRunner {
    fn run(&mut self, command: &str) -> crate::Result<()> {
        info!(command, "would run code action");
        Ok(())
    }
}

/// Test sink that appends every action to a shared log.
pub struct MemorySink {
    log: Arc<Mutex<Vec<EventData>>>,
}

impl MemorySink {
    pub fn new(log: Arc<Mutex<Vec<EventData>>>) -> Self {
        Self { log }
    }
}

impl InputSink for MemorySink {
    fn mouse_move(&mut self, x: f64, y: f64) -> crate::Result<()> {
        self.log.lock().push(EventData::Move { x, y });
        Ok(())
    }

    fn mouse_down(&mut self, x: f64, y: f64, button: Button) -> crate::Result<()> {
        self.log.lock().push(EventData::Down { x, y, button });
        Ok(())
    }

    fn mouse_up(&mut self, x: f64, y: f64, button: Button) -> crate::Result<()> {
        self.log.lock().push(EventData::Up { x, y, button });
        Ok(())
    }

    fn scroll(&mut self, x: f64, y: f64, dx: i32, dy: i32) -> crate::Result<()> {
        self.log.lock().push(EventData::Scroll { x, y, dx, dy });
        Ok(())
    }

    fn key_press(&mut self, key: &str) -> crate::Result<()> {
        self.log.lock().push(EventData::Press {
            key: key.to_string(),
        });
        Ok(())
    }

    fn key_release(&mut self, key: &str) -> crate::Result<()> {
        self.log.lock().push(EventData::Release {
            key: key.to_string(),
        });
        Ok(())
    }
}

/// Test runner that appends every command to a shared log.
pub struct MemoryRunner {
    log: Arc<Mutex<Vec<String>>>,
}

impl MemoryRunner {
    pub fn new(log: Arc<Mutex<Vec<String>>>) -> Self {
        Self { log }
    }
}

impl CommandRunner for MemoryRunner {
    fn run(&mut self, command: &str) -> crate::Result<()> {
        self.log.lock().push(command.to_string());
        Ok(())
    }
}
