//! Recorded input events
//!
//! An [`Event`] is one timestamped input/action occurrence produced by a
//! capture feed. Events are immutable after creation and owned by the
//! recorder that created them until merged into a session record. This
//! module also implements the post-recording filters: the session time
//! window and the two-pass removal of unmatched press/release events.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::time::wall_time;

/// Mouse button identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Button {
    Left,
    Right,
    Middle,
}

impl Button {
    pub fn as_str(&self) -> &'static str {
        match self {
            Button::Left => "left",
            Button::Right => "right",
            Button::Middle => "middle",
        }
    }
}

/// Channel tag for a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Mouse,
    Keyboard,
    Code,
    Pause,
    Resume,
}

/// Structured payload of a recorded event, discriminated by `action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EventData {
    /// Sampled cursor position.
    Move { x: f64, y: f64 },
    /// Mouse button pressed at the cursor position.
    Down { x: f64, y: f64, button: Button },
    /// Mouse button released at the cursor position.
    Up { x: f64, y: f64, button: Button },
    /// Scroll wheel movement at the cursor position.
    Scroll { x: f64, y: f64, dx: i32, dy: i32 },
    /// Key pressed.
    Press { key: String },
    /// Key released.
    Release { key: String },
    /// Code action to execute verbatim at replay.
    Command { command: String },
    /// Recording paused marker.
    Pause,
    /// Recording resumed marker.
    Resume,
}

impl EventData {
    /// Channel this payload belongs to.
    pub fn kind(&self) -> EventKind {
        match self {
            EventData::Move { .. }
            | EventData::Down { .. }
            | EventData::Up { .. }
            | EventData::Scroll { .. } => EventKind::Mouse,
            EventData::Press { .. } | EventData::Release { .. } => EventKind::Keyboard,
            EventData::Command { .. } => EventKind::Code,
            EventData::Pause => EventKind::Pause,
            EventData::Resume => EventKind::Resume,
        }
    }

    pub fn is_mouse(&self) -> bool {
        self.kind() == EventKind::Mouse
    }

    pub fn is_keyboard(&self) -> bool {
        self.kind() == EventKind::Keyboard
    }

    /// Identity opened by this payload, if it is a press/down.
    fn opens(&self) -> Option<InputId> {
        match self {
            EventData::Down { button, .. } => Some(InputId::Button(*button)),
            EventData::Press { key } => Some(InputId::Key(key.clone())),
            _ => None,
        }
    }

    /// Identity closed by this payload, if it is a release/up.
    fn closes(&self) -> Option<InputId> {
        match self {
            EventData::Up { button, .. } => Some(InputId::Button(*button)),
            EventData::Release { key } => Some(InputId::Key(key.clone())),
            _ => None,
        }
    }
}

/// Key/button identity used to match presses with releases.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum InputId {
    Button(Button),
    Key(String),
}

/// One timestamped input/action occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Wall-clock seconds at capture.
    pub time: f64,
    /// Channel tag, kept alongside the payload in persisted records.
    pub kind: EventKind,
    /// Structured payload.
    pub data: EventData,
}

impl Event {
    /// Stamp a new event at the current wall time.
    pub fn now(data: EventData) -> Self {
        Self::at(wall_time(), data)
    }

    /// Create an event with an explicit timestamp.
    pub fn at(time: f64, data: EventData) -> Self {
        Self {
            time,
            kind: data.kind(),
            data,
        }
    }
}

/// Keep only events inside the `[start, stop]` session window (inclusive).
pub fn filter_window(events: Vec<Event>, start: f64, stop: f64) -> Vec<Event> {
    events
        .into_iter()
        .filter(|e| e.time >= start && e.time <= stop)
        .collect()
}

/// Remove unmatched press/release events so that every retained key/button
/// identity carries balanced down/up pairs.
///
/// Forward pass drops releases that no earlier press opened; the reverse
/// pass drops presses that no later release closes. Moves, scrolls, code
/// actions, and markers pass through untouched. The result is safe to
/// replay: a player never sees an "up" for an identity it never pressed,
/// nor a "down" that is never released.
pub fn prune_unmatched(events: Vec<Event>) -> Vec<Event> {
    let total = events.len();

    // Forward pass: a release only survives if an open is outstanding.
    let mut open: HashMap<InputId, usize> = HashMap::new();
    let mut kept: Vec<Event> = Vec::with_capacity(total);
    for event in events {
        if let Some(id) = event.data.opens() {
            *open.entry(id).or_insert(0) += 1;
            kept.push(event);
        } else if let Some(id) = event.data.closes() {
            match open.get_mut(&id) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    kept.push(event);
                }
                _ => {}
            }
        } else {
            kept.push(event);
        }
    }

    // Reverse pass: a press only survives if a close is still pending.
    let mut pending: HashMap<InputId, usize> = HashMap::new();
    let mut reversed: Vec<Event> = Vec::with_capacity(kept.len());
    for event in kept.into_iter().rev() {
        if let Some(id) = event.data.closes() {
            *pending.entry(id).or_insert(0) += 1;
            reversed.push(event);
        } else if let Some(id) = event.data.opens() {
            match pending.get_mut(&id) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    reversed.push(event);
                }
                _ => {}
            }
        } else {
            reversed.push(event);
        }
    }
    reversed.reverse();

    let dropped = total - reversed.len();
    if dropped > 0 {
        debug!(dropped, "pruned unmatched press/release events");
    }
    reversed
}

/// Post-recording filter applied to each source log: window, then prune.
pub fn filter_recorded_events(events: Vec<Event>, start: f64, stop: f64) -> Vec<Event> {
    prune_unmatched(filter_window(events, start, stop))
}
