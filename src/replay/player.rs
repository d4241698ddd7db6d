//! Session replay
//!
//! Replays a recorded session by re-injecting its actions at reconstructed
//! relative timestamps. One player object exists per action channel (mouse,
//! keyboard, code); all resynchronize against the same zero point, so a slow
//! dispatch on one channel delays later actions but never reorders them.
//! Pacing only ever waits: when replay falls behind it proceeds immediately
//! rather than skipping ahead.
//!
//! Players track currently-pressed buttons and keys. A double press or an
//! unmatched release is logged and skipped, never injected, and `stop`
//! releases everything still held so an aborted replay cannot leave input
//! devices stuck.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tracing::{debug, error, info, trace, warn};

use crate::record::event::{Button, EventData, EventKind};
use crate::record::session::SessionRecord;
use crate::replay::sink::{CommandRunner, InputSink, LogRunner, LogSink, ShellRunner, ShellSink, SinkCommands};
use crate::time::wait_for_offset;

/// Shared zero point for all replay channels.
struct ReplayClock {
    started: Instant,
    zero: f64,
}

impl ReplayClock {
    /// Anchor the clock so that timestep `zero` replays immediately.
    fn start(zero: f64) -> Self {
        Self {
            started: Instant::now(),
            zero,
        }
    }

    /// Sleep until `timestep` is due; returns immediately when behind.
    fn wait_until(&self, timestep: f64) {
        wait_for_offset(self.started, timestep - self.zero);
    }
}

/// Replays mouse actions, tracking pressed buttons.
pub struct MousePlayer {
    sink: Box<dyn InputSink>,
    pressed: HashSet<Button>,
    position: (f64, f64),
}

impl MousePlayer {
    pub fn new(sink: Box<dyn InputSink>) -> Self {
        Self {
            sink,
            pressed: HashSet::new(),
            position: (0.0, 0.0),
        }
    }

    /// Inject one mouse action. Returns `false` when the action was skipped
    /// rather than injected.
    pub fn play(&mut self, data: &EventData) -> crate::Result<bool> {
        match data {
            EventData::Move { x, y } => {
                self.sink.mouse_move(*x, *y)?;
                self.position = (*x, *y);
                Ok(true)
            }
            EventData::Down { x, y, button } => {
                if self.pressed.contains(button) {
                    warn!(button = button.as_str(), "button already pressed; down skipped");
                    return Ok(false);
                }
                self.sink.mouse_down(*x, *y, *button)?;
                self.pressed.insert(*button);
                self.position = (*x, *y);
                Ok(true)
            }
            EventData::Up { x, y, button } => {
                if !self.pressed.contains(button) {
                    warn!(button = button.as_str(), "button not pressed; up skipped");
                    return Ok(false);
                }
                self.sink.mouse_up(*x, *y, *button)?;
                self.pressed.remove(button);
                self.position = (*x, *y);
                Ok(true)
            }
            EventData::Scroll { x, y, dx, dy } => {
                self.sink.scroll(*x, *y, *dx, *dy)?;
                Ok(true)
            }
            _ => {
                debug!("non-mouse payload on mouse channel; skipped");
                Ok(false)
            }
        }
    }

    /// Release every still-pressed button at the last known position.
    pub fn stop(&mut self) {
        let (x, y) = self.position;
        let held: Vec<Button> = self.pressed.drain().collect();
        for button in held {
            warn!(button = button.as_str(), "releasing button still pressed at stop");
            if let Err(e) = self.sink.mouse_up(x, y, button) {
                warn!("failed to release {}: {}", button.as_str(), e);
            }
        }
    }
}

/// Replays keyboard actions, tracking press depth per key.
///
/// Press depth (rather than a set) keeps autorepeat sequences symmetric: a
/// recorded `press press release release` replays all four actions.
pub struct KeyboardPlayer {
    sink: Box<dyn InputSink>,
    pressed: HashMap<String, u32>,
}

impl KeyboardPlayer {
    pub fn new(sink: Box<dyn InputSink>) -> Self {
        Self {
            sink,
            pressed: HashMap::new(),
        }
    }

    pub fn play(&mut self, data: &EventData) -> crate::Result<bool> {
        match data {
            EventData::Press { key } => {
                self.sink.key_press(key)?;
                *self.pressed.entry(key.clone()).or_insert(0) += 1;
                Ok(true)
            }
            EventData::Release { key } => {
                match self.pressed.get_mut(key) {
                    Some(depth) if *depth > 0 => {
                        self.sink.key_release(key)?;
                        *depth -= 1;
                        if *depth == 0 {
                            self.pressed.remove(key);
                        }
                        Ok(true)
                    }
                    _ => {
                        warn!(key, "key not pressed; release skipped");
                        Ok(false)
                    }
                }
            }
            _ => {
                debug!("non-keyboard payload on keyboard channel; skipped");
                Ok(false)
            }
        }
    }

    /// Release every still-pressed key once.
    pub fn stop(&mut self) {
        let held: Vec<String> = self.pressed.drain().map(|(key, _)| key).collect();
        for key in held {
            warn!(key = key.as_str(), "releasing key still pressed at stop");
            if let Err(e) = self.sink.key_release(&key) {
                warn!("failed to release {key}: {e}");
            }
        }
    }
}

/// Replays code actions through a [`CommandRunner`].
pub struct CodePlayer {
    runner: Box<dyn CommandRunner>,
}

impl CodePlayer {
    pub fn new(runner: Box<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub fn play(&mut self, data: &EventData) -> crate::Result<bool> {
        match data {
            EventData::Command { command } => {
                self.runner.run(command)?;
                Ok(true)
            }
            _ => {
                debug!("non-code payload on code channel; skipped");
                Ok(false)
            }
        }
    }
}

/// Counters reported after a replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Actions injected.
    pub played: usize,
    /// Actions skipped: markers, double presses, unmatched releases.
    pub skipped: usize,
}

/// Replays a whole session across all channels.
pub struct Replayer {
    mouse: MousePlayer,
    keyboard: KeyboardPlayer,
    code: CodePlayer,
}

impl Replayer {
    pub fn new(
        mouse_sink: Box<dyn InputSink>,
        keyboard_sink: Box<dyn InputSink>,
        runner: Box<dyn CommandRunner>,
    ) -> Self {
        Self {
            mouse: MousePlayer::new(mouse_sink),
            keyboard: KeyboardPlayer::new(keyboard_sink),
            code: CodePlayer::new(runner),
        }
    }

    /// Replayer that injects through shell commands.
    pub fn shell(commands: SinkCommands) -> Self {
        Self::new(
            Box::new(ShellSink::new(commands.clone())),
            Box::new(ShellSink::new(commands)),
            Box::new(ShellRunner),
        )
    }

    /// Replayer that only logs what it would inject.
    pub fn dry_run() -> Self {
        Self::new(Box::new(LogSink), Box::new(LogSink), Box::new(LogRunner))
    }

    /// Replay every action in the session at its recorded relative time.
    ///
    /// The clock anchors on the first action, so lead-in silence is not
    /// replayed. On a sink error the replay aborts, but held inputs are
    /// released before the error propagates.
    pub fn play(&mut self, session: &SessionRecord) -> crate::Result<ReplayStats> {
        let actions = match &session.actions {
            Some(actions) if !actions.is_empty() => actions,
            _ => {
                info!(task_id = %session.task_id, "session has no actions to replay");
                return Ok(ReplayStats::default());
            }
        };
        info!(
            task_id = %session.task_id,
            actions = actions.len(),
            "replay started"
        );

        let clock = ReplayClock::start(actions[0].timestep);
        let mut stats = ReplayStats::default();
        for action in actions {
            clock.wait_until(action.timestep);
            let outcome = match action.kind {
                EventKind::Mouse => self.mouse.play(&action.data),
                EventKind::Keyboard => self.keyboard.play(&action.data),
                EventKind::Code => self.code.play(&action.data),
                EventKind::Pause | EventKind::Resume => {
                    trace!(timestep = action.timestep, "marker skipped");
                    Ok(false)
                }
            };
            match outcome {
                Ok(true) => stats.played += 1,
                Ok(false) => stats.skipped += 1,
                Err(e) => {
                    error!(timestep = action.timestep, "replay aborted: {}", e);
                    self.stop();
                    return Err(e);
                }
            }
        }

        self.stop();
        info!(
            played = stats.played,
            skipped = stats.skipped,
            "replay finished"
        );
        Ok(stats)
    }

    /// Release everything still pressed on any channel.
    pub fn stop(&mut self) {
        self.mouse.stop();
        self.keyboard.stop();
    }
}
