//! Window manager collaborator
//!
//! Minimizes the foreground window when capture starts and restores it when
//! capture stops, so recordings are not polluted by the recorder's own UI.
//! Implemented as configurable shell commands; disabled on remote sessions,
//! where there is no local window to hide. Failures are logged and never
//! interrupt capture.

use std::process::{Command, ExitStatus};

use tracing::{debug, warn};

/// Run a command line through the platform shell.
pub(crate) fn shell_status(command: &str) -> std::io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        Command::new("sh").arg("-c").arg(command).status()
    }
    #[cfg(windows)]
    {
        Command::new("cmd").args(["/C", command]).status()
    }
}

/// Whether this process appears to run inside a remote session.
pub fn detect_remote() -> bool {
    std::env::var_os("SSH_CONNECTION").is_some() || std::env::var_os("SSH_TTY").is_some()
}

/// Best-effort minimize/restore of the foreground window around capture.
#[derive(Debug, Clone, Default)]
pub struct WindowManager {
    mode: Mode,
}

#[derive(Debug, Clone, Default)]
enum Mode {
    #[default]
    Disabled,
    Shell {
        minimize: String,
        restore: String,
    },
}

impl WindowManager {
    /// A manager that does nothing (remote sessions, tests).
    pub fn disabled() -> Self {
        Self {
            mode: Mode::Disabled,
        }
    }

    /// A shell-command manager. Downgrades to disabled when either command
    /// is empty or `remote` is set.
    pub fn from_commands(minimize: &str, restore: &str, remote: bool) -> Self {
        if remote || minimize.is_empty() || restore.is_empty() {
            debug!(remote, "window manager disabled");
            return Self::disabled();
        }
        Self {
            mode: Mode::Shell {
                minimize: minimize.to_string(),
                restore: restore.to_string(),
            },
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.mode, Mode::Shell { .. })
    }

    /// Hide the foreground window before capture begins.
    pub fn minimize(&self) {
        if let Mode::Shell { minimize, .. } = &self.mode {
            run_command("minimize", minimize);
        }
    }

    /// Bring the foreground window back after capture ends.
    pub fn restore(&self) {
        if let Mode::Shell { restore, .. } = &self.mode {
            run_command("restore", restore);
        }
    }
}

fn run_command(what: &str, command: &str) {
    match shell_status(command) {
        Ok(status) if status.success() => debug!(what, "window manager command completed"),
        Ok(status) => warn!(what, %status, "window manager command failed"),
        Err(e) => warn!(what, error = %e, "window manager command could not run"),
    }
}
