//! Keyboard and mouse capture
//!
//! Input reaches the recorders through lock-free SPSC rings: the producer
//! half ([`InputFeed`]) is handed to whatever drives capture (an OS hook
//! bridge, a front-end, a test), stamps each occurrence with the wall time,
//! and never blocks; a full ring drops the push and counts it. Each recorder
//! drains its ring on a background thread into an event log.
//!
//! Keystroke logging is gated by the capture mode: `Init` logs nothing,
//! `Typing` logs every press/release, `Coding` accumulates keystrokes into a
//! single code event. The stop-hotkey matcher runs on every key transition
//! regardless of mode. Mouse moves are sampled at the capture frame rate;
//! clicks and scrolls always log.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, info, trace, warn};

use crate::record::event::{Event, EventData};
use crate::record::RecorderState;
use crate::time::wall_time;

/// Sleep between drain sweeps when the ring is empty.
const DRAIN_POLL: Duration = Duration::from_millis(2);

/// One raw input occurrence, stamped when it entered the feed.
#[derive(Debug, Clone)]
struct RawInput {
    time: f64,
    data: EventData,
}

/// Producer half of a recorder's input ring.
///
/// Pushes never block: when the ring is full the occurrence is dropped and
/// counted. All pushes are stamped with the current wall time.
pub struct InputFeed {
    producer: Producer<RawInput>,
    pushed: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl InputFeed {
    /// Push a payload stamped at the current wall time. Returns `false` when
    /// the ring was full and the occurrence was dropped.
    pub fn push(&mut self, data: EventData) -> bool {
        let raw = RawInput {
            time: wall_time(),
            data,
        };
        match self.producer.push(raw) {
            Ok(()) => {
                self.pushed.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("input ring full; occurrence dropped");
                false
            }
        }
    }

    pub fn mouse_move(&mut self, x: f64, y: f64) -> bool {
        self.push(EventData::Move { x, y })
    }

    pub fn mouse_down(&mut self, x: f64, y: f64, button: crate::record::Button) -> bool {
        self.push(EventData::Down { x, y, button })
    }

    pub fn mouse_up(&mut self, x: f64, y: f64, button: crate::record::Button) -> bool {
        self.push(EventData::Up { x, y, button })
    }

    pub fn scroll(&mut self, x: f64, y: f64, dx: i32, dy: i32) -> bool {
        self.push(EventData::Scroll { x, y, dx, dy })
    }

    pub fn key_press(&mut self, key: &str) -> bool {
        self.push(EventData::Press {
            key: key.to_string(),
        })
    }

    pub fn key_release(&mut self, key: &str) -> bool {
        self.push(EventData::Release {
            key: key.to_string(),
        })
    }
}

/// Producer-side counters for one input feed.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedStats {
    pub pushed: u64,
    pub dropped: u64,
}

/// Capture mode gate for keystroke logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// Keystrokes are used only for hotkey matching.
    #[default]
    Init,
    /// Every press/release is logged as a keyboard event.
    Typing,
    /// Keystrokes accumulate into a single code event.
    Coding,
}

/// Lock-free mode cell shared between the control surface and drain threads.
#[derive(Debug, Default)]
pub struct AtomicCaptureMode(AtomicU8);

impl AtomicCaptureMode {
    pub fn new(mode: CaptureMode) -> Self {
        let cell = Self(AtomicU8::new(0));
        cell.store(mode);
        cell
    }

    pub fn store(&self, mode: CaptureMode) {
        let raw = match mode {
            CaptureMode::Init => 0,
            CaptureMode::Typing => 1,
            CaptureMode::Coding => 2,
        };
        self.0.store(raw, Ordering::SeqCst);
    }

    pub fn load(&self) -> CaptureMode {
        match self.0.load(Ordering::SeqCst) {
            1 => CaptureMode::Typing,
            2 => CaptureMode::Coding,
            _ => CaptureMode::Init,
        }
    }
}

/// Matches a stop combo over the stream of key transitions.
#[derive(Debug, Clone)]
pub struct Hotkey {
    keys: Vec<String>,
    held: HashSet<String>,
}

impl Hotkey {
    pub fn new(keys: &[String]) -> Self {
        Self {
            keys: keys.iter().map(|k| k.to_lowercase()).collect(),
            held: HashSet::new(),
        }
    }

    /// Track one key transition; `true` when every combo key is held.
    pub fn observe(&mut self, data: &EventData) -> bool {
        match data {
            EventData::Press { key } => {
                let key = key.to_lowercase();
                if self.keys.contains(&key) {
                    self.held.insert(key);
                }
                !self.keys.is_empty() && self.held.len() == self.keys.len()
            }
            EventData::Release { key } => {
                self.held.remove(&key.to_lowercase());
                false
            }
            _ => false,
        }
    }
}

/// Background keyboard recorder.
pub struct KeyboardRecorder {
    capacity: usize,
    mode: Arc<AtomicCaptureMode>,
    paused: Arc<AtomicBool>,
    hotkey_keys: Vec<String>,
    hotkey_hit: Arc<AtomicBool>,
    events: Arc<Mutex<Vec<Event>>>,
    pushed: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    state: RecorderState,
    start_time: Option<f64>,
    stop_time: Option<f64>,
}

impl KeyboardRecorder {
    pub fn new(
        capacity: usize,
        hotkey: &[String],
        mode: Arc<AtomicCaptureMode>,
        paused: Arc<AtomicBool>,
    ) -> Self {
        Self {
            capacity,
            mode,
            paused,
            hotkey_keys: hotkey.to_vec(),
            hotkey_hit: Arc::new(AtomicBool::new(false)),
            events: Arc::new(Mutex::new(Vec::new())),
            pushed: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
            state: RecorderState::Created,
            start_time: None,
            stop_time: None,
        }
    }

    /// Clear the event log and counters; the recorder becomes ready.
    pub fn reset(&mut self) -> crate::Result<()> {
        if self.state == RecorderState::Recording {
            return Err(crate::Error::Record(
                "cannot reset a recording keyboard recorder".to_string(),
            ));
        }
        self.events.lock().clear();
        self.pushed.store(0, Ordering::SeqCst);
        self.dropped.store(0, Ordering::SeqCst);
        self.hotkey_hit.store(false, Ordering::SeqCst);
        self.start_time = None;
        self.stop_time = None;
        self.state = RecorderState::Ready;
        Ok(())
    }

    /// Spawn the drain thread and hand back the producer half of the ring.
    pub fn start(&mut self) -> crate::Result<InputFeed> {
        if self.state != RecorderState::Ready {
            return Err(crate::Error::Record(format!(
                "keyboard recorder cannot start from state {:?}",
                self.state
            )));
        }
        let (producer, consumer) = RingBuffer::new(self.capacity);
        let feed = InputFeed {
            producer,
            pushed: Arc::clone(&self.pushed),
            dropped: Arc::clone(&self.dropped),
        };

        self.running.store(true, Ordering::SeqCst);
        self.start_time = Some(wall_time());

        let running = Arc::clone(&self.running);
        let mut sink = KeyboardSink {
            mode: Arc::clone(&self.mode),
            paused: Arc::clone(&self.paused),
            events: Arc::clone(&self.events),
            hotkey: Hotkey::new(&self.hotkey_keys),
            hotkey_hit: Arc::clone(&self.hotkey_hit),
            code: None,
        };
        let handle = thread::Builder::new()
            .name("keyboard-recorder".to_string())
            .spawn(move || {
                run_drain_loop(consumer, running, |raw| sink.handle(raw));
                sink.flush_code();
            })
            .map_err(|e| crate::Error::Record(format!("failed to spawn drain thread: {e}")))?;

        self.handle = Some(handle);
        self.state = RecorderState::Recording;
        info!("keyboard recorder started");
        Ok(feed)
    }

    /// Signal the drain thread to exit and record the stop time.
    pub fn stop(&mut self) {
        if self.state != RecorderState::Recording {
            warn!(state = ?self.state, "keyboard recorder is not recording; stop ignored");
            return;
        }
        self.running.store(false, Ordering::SeqCst);
        self.stop_time = Some(wall_time());
        self.state = RecorderState::Stopped;
    }

    /// Join the drain thread; the event log is complete afterwards.
    pub fn wait_exit(&mut self) {
        if self.state == RecorderState::Recording {
            warn!("keyboard recorder still recording in wait_exit; stopping first");
            self.stop();
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("keyboard drain thread panicked");
            }
        }
        if self.state == RecorderState::Stopped {
            self.state = RecorderState::Finalized;
        }
        let stats = self.stats();
        if stats.dropped > 0 {
            warn!(dropped = stats.dropped, "keyboard ring dropped occurrences");
        }
        info!(events = self.events.lock().len(), "keyboard recorder finalized");
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    pub fn stop_time(&self) -> Option<f64> {
        self.stop_time
    }

    /// Whether the stop combo has been observed since the last reset.
    pub fn hotkey_pressed(&self) -> bool {
        self.hotkey_hit.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> FeedStats {
        FeedStats {
            pushed: self.pushed.load(Ordering::SeqCst),
            dropped: self.dropped.load(Ordering::SeqCst),
        }
    }

    /// Snapshot of the event log in capture order.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

impl Drop for KeyboardRecorder {
    fn drop(&mut self) {
        if self.state == RecorderState::Recording {
            self.stop();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Per-thread state for the keyboard drain loop.
struct KeyboardSink {
    mode: Arc<AtomicCaptureMode>,
    paused: Arc<AtomicBool>,
    events: Arc<Mutex<Vec<Event>>>,
    hotkey: Hotkey,
    hotkey_hit: Arc<AtomicBool>,
    code: Option<CodeBuffer>,
}

struct CodeBuffer {
    started: f64,
    text: String,
}

impl KeyboardSink {
    fn handle(&mut self, raw: RawInput) {
        // Hotkey matching runs regardless of mode or pause state.
        if self.hotkey.observe(&raw.data)
            && !self.hotkey_hit.swap(true, Ordering::SeqCst)
        {
            info!("stop hotkey matched");
        }
        if self.paused.load(Ordering::SeqCst) {
            return;
        }
        match self.mode.load() {
            CaptureMode::Init => {}
            CaptureMode::Typing => {
                self.flush_code();
                match raw.data {
                    EventData::Press { .. } | EventData::Release { .. } => {
                        self.events.lock().push(Event::at(raw.time, raw.data));
                    }
                    _ => debug!("non-keyboard payload on keyboard feed; ignored"),
                }
            }
            CaptureMode::Coding => {
                if let EventData::Press { key } = &raw.data {
                    let buffer = self.code.get_or_insert_with(|| CodeBuffer {
                        started: raw.time,
                        text: String::new(),
                    });
                    append_key(&mut buffer.text, key);
                }
            }
        }
    }

    /// Emit the buffered code text as a single code event.
    fn flush_code(&mut self) {
        if let Some(buffer) = self.code.take() {
            if !buffer.text.is_empty() {
                self.events.lock().push(Event::at(
                    buffer.started,
                    EventData::Command {
                        command: buffer.text,
                    },
                ));
            }
        }
    }
}

/// Append one named key to a code buffer.
fn append_key(text: &mut String, key: &str) {
    match key {
        "space" => text.push(' '),
        "enter" | "return" => text.push('\n'),
        "tab" => text.push('\t'),
        "backspace" => {
            text.pop();
        }
        k => {
            let mut chars = k.chars();
            if let (Some(c), None) = (chars.next(), chars.next()) {
                text.push(c);
            }
            // Multi-character names (shift, ctrl, ...) are ignored.
        }
    }
}

/// Background mouse recorder.
///
/// Moves are sampled so that at most one lands per capture frame; clicks and
/// scrolls always log.
pub struct MouseRecorder {
    capacity: usize,
    min_move_interval: f64,
    paused: Arc<AtomicBool>,
    events: Arc<Mutex<Vec<Event>>>,
    pushed: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    state: RecorderState,
    start_time: Option<f64>,
    stop_time: Option<f64>,
}

impl MouseRecorder {
    pub fn new(capacity: usize, fps: u32, paused: Arc<AtomicBool>) -> Self {
        let min_move_interval = if fps == 0 { 0.0 } else { 1.0 / f64::from(fps) };
        Self {
            capacity,
            min_move_interval,
            paused,
            events: Arc::new(Mutex::new(Vec::new())),
            pushed: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
            state: RecorderState::Created,
            start_time: None,
            stop_time: None,
        }
    }

    pub fn reset(&mut self) -> crate::Result<()> {
        if self.state == RecorderState::Recording {
            return Err(crate::Error::Record(
                "cannot reset a recording mouse recorder".to_string(),
            ));
        }
        self.events.lock().clear();
        self.pushed.store(0, Ordering::SeqCst);
        self.dropped.store(0, Ordering::SeqCst);
        self.start_time = None;
        self.stop_time = None;
        self.state = RecorderState::Ready;
        Ok(())
    }

    pub fn start(&mut self) -> crate::Result<InputFeed> {
        if self.state != RecorderState::Ready {
            return Err(crate::Error::Record(format!(
                "mouse recorder cannot start from state {:?}",
                self.state
            )));
        }
        let (producer, consumer) = RingBuffer::new(self.capacity);
        let feed = InputFeed {
            producer,
            pushed: Arc::clone(&self.pushed),
            dropped: Arc::clone(&self.dropped),
        };

        self.running.store(true, Ordering::SeqCst);
        self.start_time = Some(wall_time());

        let running = Arc::clone(&self.running);
        let mut sink = MouseSink {
            paused: Arc::clone(&self.paused),
            events: Arc::clone(&self.events),
            min_move_interval: self.min_move_interval,
            last_move: None,
        };
        let handle = thread::Builder::new()
            .name("mouse-recorder".to_string())
            .spawn(move || run_drain_loop(consumer, running, |raw| sink.handle(raw)))
            .map_err(|e| crate::Error::Record(format!("failed to spawn drain thread: {e}")))?;

        self.handle = Some(handle);
        self.state = RecorderState::Recording;
        info!("mouse recorder started");
        Ok(feed)
    }

    pub fn stop(&mut self) {
        if self.state != RecorderState::Recording {
            warn!(state = ?self.state, "mouse recorder is not recording; stop ignored");
            return;
        }
        self.running.store(false, Ordering::SeqCst);
        self.stop_time = Some(wall_time());
        self.state = RecorderState::Stopped;
    }

    pub fn wait_exit(&mut self) {
        if self.state == RecorderState::Recording {
            warn!("mouse recorder still recording in wait_exit; stopping first");
            self.stop();
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("mouse drain thread panicked");
            }
        }
        if self.state == RecorderState::Stopped {
            self.state = RecorderState::Finalized;
        }
        let stats = self.stats();
        if stats.dropped > 0 {
            warn!(dropped = stats.dropped, "mouse ring dropped occurrences");
        }
        info!(events = self.events.lock().len(), "mouse recorder finalized");
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    pub fn stop_time(&self) -> Option<f64> {
        self.stop_time
    }

    pub fn stats(&self) -> FeedStats {
        FeedStats {
            pushed: self.pushed.load(Ordering::SeqCst),
            dropped: self.dropped.load(Ordering::SeqCst),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

impl Drop for MouseRecorder {
    fn drop(&mut self) {
        if self.state == RecorderState::Recording {
            self.stop();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct MouseSink {
    paused: Arc<AtomicBool>,
    events: Arc<Mutex<Vec<Event>>>,
    min_move_interval: f64,
    last_move: Option<f64>,
}

impl MouseSink {
    fn handle(&mut self, raw: RawInput) {
        if self.paused.load(Ordering::SeqCst) {
            return;
        }
        match &raw.data {
            EventData::Move { .. } => {
                if let Some(last) = self.last_move {
                    if raw.time - last < self.min_move_interval {
                        trace!("move sampled out");
                        return;
                    }
                }
                self.last_move = Some(raw.time);
                self.events.lock().push(Event::at(raw.time, raw.data));
            }
            EventData::Down { .. } | EventData::Up { .. } | EventData::Scroll { .. } => {
                self.events.lock().push(Event::at(raw.time, raw.data));
            }
            _ => debug!("non-mouse payload on mouse feed; ignored"),
        }
    }
}

/// Pop until the ring is empty, sleep, repeat; one final sweep runs after
/// the stop flag flips so occurrences pushed before stop are never lost.
fn run_drain_loop<F: FnMut(RawInput)>(
    mut consumer: Consumer<RawInput>,
    running: Arc<AtomicBool>,
    mut handle: F,
) {
    loop {
        let active = running.load(Ordering::SeqCst);
        while let Ok(raw) = consumer.pop() {
            handle(raw);
        }
        if !active {
            break;
        }
        thread::sleep(DRAIN_POLL);
    }
}
