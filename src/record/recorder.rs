//! Composite recorder
//!
//! Orchestrates the screen, keyboard, and mouse recorders, owns the
//! pause/resume markers and submitted code actions, and exports the merged,
//! windowed, pruned event streams as a session record.
//!
//! The session window is `[max(component start times), min(component stop
//! times)]`: an event only survives export if every component was already
//! recording when it happened and none had stopped yet.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::record::event::{filter_recorded_events, Event, EventData};
use crate::record::frame::Region;
use crate::record::input::{
    AtomicCaptureMode, CaptureMode, FeedStats, InputFeed, KeyboardRecorder, MouseRecorder,
};
use crate::record::screen::{FrameSource, ScreenRecorder};
use crate::record::session::{Action, SessionRecord, VideoMeta, VideoRecord};
use crate::record::wm::WindowManager;
use crate::record::RecorderState;
use crate::time::wall_time;

/// Subdirectory of a saved session holding the exported PNG frames.
pub const FRAMES_DIR: &str = "frames";

/// File name of the session record inside its directory.
pub const SESSION_FILE: &str = "session.json";

/// Capture settings for a [`Recorder`].
pub struct RecorderOptions {
    /// Target frame rate; also the mouse-move sampling rate.
    pub fps: u32,
    /// Capacity of each input ring.
    pub ring_capacity: usize,
    /// Key combo that flags the recording to stop.
    pub stop_hotkey: Vec<String>,
    /// Screen capture setup, or `None` for an input-only recording.
    pub screen: Option<ScreenOptions>,
}

pub struct ScreenOptions {
    pub region: Region,
    pub source: Box<dyn FrameSource>,
    pub wm: WindowManager,
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            fps: 10,
            ring_capacity: 1024,
            stop_hotkey: Vec::new(),
            screen: None,
        }
    }
}

/// Producer halves of the input rings, handed to whatever drives capture.
pub struct RecorderFeeds {
    pub keyboard: InputFeed,
    pub mouse: InputFeed,
}

/// Counters reported after a recording.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecorderStats {
    pub frames: usize,
    pub frame_overruns: u64,
    pub keyboard: FeedStats,
    pub mouse: FeedStats,
}

/// Composite screen + keyboard + mouse recorder.
pub struct Recorder {
    task_id: String,
    instruction: String,
    screen: Option<ScreenRecorder>,
    keyboard: KeyboardRecorder,
    mouse: MouseRecorder,
    mode: Arc<AtomicCaptureMode>,
    paused: Arc<AtomicBool>,
    control: Arc<Mutex<Vec<Event>>>,
    state: RecorderState,
}

impl Recorder {
    pub fn new(task_id: &str, instruction: &str, options: RecorderOptions) -> Self {
        let mode = Arc::new(AtomicCaptureMode::new(CaptureMode::Init));
        let paused = Arc::new(AtomicBool::new(false));

        let screen = options.screen.map(|screen| {
            ScreenRecorder::new(
                options.fps,
                screen.region,
                screen.source,
                screen.wm,
                Arc::clone(&paused),
            )
        });
        let keyboard = KeyboardRecorder::new(
            options.ring_capacity,
            &options.stop_hotkey,
            Arc::clone(&mode),
            Arc::clone(&paused),
        );
        let mouse = MouseRecorder::new(options.ring_capacity, options.fps, Arc::clone(&paused));

        Self {
            task_id: task_id.to_string(),
            instruction: instruction.to_string(),
            screen,
            keyboard,
            mouse,
            mode,
            paused,
            control: Arc::new(Mutex::new(Vec::new())),
            state: RecorderState::Created,
        }
    }

    /// Clear every buffer; the recorder becomes ready to start.
    pub fn reset(&mut self) -> crate::Result<()> {
        if self.state == RecorderState::Recording {
            return Err(crate::Error::Record(
                "cannot reset a recording recorder".to_string(),
            ));
        }
        if let Some(screen) = self.screen.as_mut() {
            screen.reset()?;
        }
        self.keyboard.reset()?;
        self.mouse.reset()?;
        self.control.lock().clear();
        self.paused.store(false, std::sync::atomic::Ordering::SeqCst);
        self.mode.store(CaptureMode::Init);
        self.state = RecorderState::Ready;
        Ok(())
    }

    /// Start every component and hand back the input feeds.
    pub fn start(&mut self) -> crate::Result<RecorderFeeds> {
        if self.state != RecorderState::Ready {
            return Err(crate::Error::Record(format!(
                "recorder cannot start from state {:?}",
                self.state
            )));
        }
        if let Some(screen) = self.screen.as_mut() {
            screen.start()?;
        }
        let keyboard = match self.keyboard.start() {
            Ok(feed) => feed,
            Err(e) => {
                self.abort_start();
                return Err(e);
            }
        };
        let mouse = match self.mouse.start() {
            Ok(feed) => feed,
            Err(e) => {
                self.abort_start();
                return Err(e);
            }
        };
        self.state = RecorderState::Recording;
        info!(task_id = %self.task_id, "recorder started");
        Ok(RecorderFeeds { keyboard, mouse })
    }

    fn abort_start(&mut self) {
        if let Some(screen) = self.screen.as_mut() {
            if screen.state() == RecorderState::Recording {
                screen.stop();
                screen.wait_exit();
            }
        }
        if self.keyboard.state() == RecorderState::Recording {
            self.keyboard.stop();
            self.keyboard.wait_exit();
        }
    }

    /// Signal every component to stop.
    pub fn stop(&mut self) {
        if self.state != RecorderState::Recording {
            warn!(state = ?self.state, "recorder is not recording; stop ignored");
            return;
        }
        if let Some(screen) = self.screen.as_mut() {
            screen.stop();
        }
        self.keyboard.stop();
        self.mouse.stop();
        self.state = RecorderState::Stopped;
    }

    /// Join every component thread; buffers are complete afterwards.
    pub fn wait_exit(&mut self) {
        if self.state == RecorderState::Recording {
            warn!("recorder still recording in wait_exit; stopping first");
            self.stop();
        }
        if let Some(screen) = self.screen.as_mut() {
            screen.wait_exit();
        }
        self.keyboard.wait_exit();
        self.mouse.wait_exit();
        if self.state == RecorderState::Stopped {
            self.state = RecorderState::Finalized;
        }
    }

    /// Suspend data capture and log a pause marker.
    pub fn pause(&mut self) {
        if self.state != RecorderState::Recording {
            warn!("recorder is not recording; pause ignored");
            return;
        }
        if !self.paused.swap(true, std::sync::atomic::Ordering::SeqCst) {
            self.control.lock().push(Event::now(EventData::Pause));
            info!("recording paused");
        }
    }

    /// Resume data capture and log a resume marker.
    pub fn resume(&mut self) {
        if self.paused.swap(false, std::sync::atomic::Ordering::SeqCst) {
            self.control.lock().push(Event::now(EventData::Resume));
            info!("recording resumed");
        }
    }

    /// Switch the keystroke capture mode.
    pub fn set_mode(&self, mode: CaptureMode) {
        self.mode.store(mode);
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode.load()
    }

    /// Record a code action submitted by the driving front end.
    pub fn submit_code(&self, command: &str) {
        if self.paused.load(std::sync::atomic::Ordering::SeqCst) {
            debug!("recorder paused; code action ignored");
            return;
        }
        self.control.lock().push(Event::now(EventData::Command {
            command: command.to_string(),
        }));
    }

    /// Whether the stop combo has been observed.
    pub fn hotkey_pressed(&self) -> bool {
        self.keyboard.hotkey_pressed()
    }

    /// Session start: the maximum of all component start times.
    pub fn start_time(&self) -> Option<f64> {
        let mut start = f64::MIN;
        if let Some(screen) = &self.screen {
            start = start.max(screen.start_time()?);
        }
        start = start.max(self.keyboard.start_time()?);
        start = start.max(self.mouse.start_time()?);
        Some(start)
    }

    /// Session stop: the minimum of all component stop times.
    pub fn stop_time(&self) -> Option<f64> {
        let mut stop = f64::MAX;
        if let Some(screen) = &self.screen {
            stop = stop.min(screen.stop_time()?);
        }
        stop = stop.min(self.keyboard.stop_time()?);
        stop = stop.min(self.mouse.stop_time()?);
        Some(stop)
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn stats(&self) -> RecorderStats {
        RecorderStats {
            frames: self
                .screen
                .as_ref()
                .map_or(0, |screen| screen.buffer().len()),
            frame_overruns: self.screen.as_ref().map_or(0, ScreenRecorder::overruns),
            keyboard: self.keyboard.stats(),
            mouse: self.mouse.stats(),
        }
    }

    /// Merge, window, and prune every source log into session actions.
    fn collect_actions(&self, start: f64, stop: f64) -> Vec<Action> {
        let mut events = Vec::new();
        events.extend(filter_recorded_events(
            self.control.lock().clone(),
            start,
            stop,
        ));
        events.extend(filter_recorded_events(self.keyboard.events(), start, stop));
        events.extend(filter_recorded_events(self.mouse.events(), start, stop));
        // Stable sort: events with equal timestamps keep concatenation order.
        events.sort_by(|a, b| a.time.total_cmp(&b.time));
        events
            .into_iter()
            .map(|e| Action {
                timestep: e.time - start,
                kind: e.kind,
                data: e.data,
            })
            .collect()
    }

    fn video_record(&self, duration: f64) -> Option<VideoRecord> {
        self.screen.as_ref().map(|screen| VideoRecord {
            metadata: VideoMeta {
                region: screen.region(),
                fps: screen.fps(),
                duration,
            },
            path: FRAMES_DIR.to_string(),
        })
    }

    /// Build the session record from the completed recording.
    ///
    /// Joins any still-running component threads first; fails if the
    /// recorder is still recording or never ran.
    pub fn export(&mut self) -> crate::Result<SessionRecord> {
        if self.state == RecorderState::Recording {
            return Err(crate::Error::Record(
                "stop the recorder before exporting".to_string(),
            ));
        }
        if self.state == RecorderState::Stopped {
            self.wait_exit();
        }
        let start = self
            .start_time()
            .ok_or_else(|| crate::Error::Record("recorder never started".to_string()))?;
        let stop = self
            .stop_time()
            .ok_or_else(|| crate::Error::Record("recorder never stopped".to_string()))?;

        let mut session = SessionRecord::new(&self.task_id, &self.instruction);
        session.actions = Some(self.collect_actions(start, stop));
        session.video = self.video_record(stop - start);
        Ok(session)
    }

    /// Export the session and write it to `dir` along with the captured
    /// frames as a PNG sequence. Returns the session file path.
    pub fn save(&mut self, dir: &Path) -> crate::Result<PathBuf> {
        let session = self.export()?;
        std::fs::create_dir_all(dir)?;

        let mut frames_written = 0usize;
        if session.video.is_some() {
            if let Some(screen) = &self.screen {
                let frames_dir = dir.join(FRAMES_DIR);
                std::fs::create_dir_all(&frames_dir)?;
                for frame in screen.buffer().drain() {
                    frame
                        .image
                        .save(frames_dir.join(format!("{:06}.png", frame.sequence)))?;
                    frames_written += 1;
                }
            }
        }

        let path = dir.join(SESSION_FILE);
        session.save(&path)?;
        SessionRecord::remove_checkpoint(&path);
        info!(
            path = %path.display(),
            actions = session.action_count(),
            frames = frames_written,
            "session saved"
        );
        Ok(path)
    }

    /// Write a crash-recovery checkpoint of the session so far.
    ///
    /// Valid while recording: the window provisionally closes at the current
    /// wall time. Frames are not checkpointed, only actions.
    pub fn checkpoint(&self, dir: &Path) -> crate::Result<()> {
        let start = self
            .start_time()
            .ok_or_else(|| crate::Error::Record("recorder not started".to_string()))?;
        let now = wall_time();

        let mut session = SessionRecord::new(&self.task_id, &self.instruction);
        session.actions = Some(self.collect_actions(start, now));
        session.video = self.video_record(now - start);

        std::fs::create_dir_all(dir)?;
        session.save_checkpoint(&dir.join(SESSION_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::event::EventKind;
    use image::RgbaImage;
    use std::thread;
    use std::time::Duration;

    struct SolidSource;

    impl FrameSource for SolidSource {
        fn grab(&mut self, region: &Region) -> crate::Result<RgbaImage> {
            Ok(RgbaImage::new(region.width, region.height))
        }
    }

    fn input_only_recorder() -> Recorder {
        Recorder::new(
            "task-1",
            "type things",
            RecorderOptions {
                fps: 100,
                ring_capacity: 256,
                stop_hotkey: vec!["ctrl".to_string(), "q".to_string()],
                screen: None,
            },
        )
    }

    fn screen_recorder() -> Recorder {
        Recorder::new(
            "task-2",
            "watch things",
            RecorderOptions {
                fps: 50,
                ring_capacity: 256,
                stop_hotkey: Vec::new(),
                screen: Some(ScreenOptions {
                    region: Region::new(0, 0, 4, 4),
                    source: Box::new(SolidSource),
                    wm: WindowManager::disabled(),
                }),
            },
        )
    }

    #[test]
    fn test_lifecycle_and_export() {
        let mut recorder = input_only_recorder();
        recorder.reset().unwrap();
        recorder.set_mode(CaptureMode::Typing);
        let mut feeds = recorder.start().unwrap();

        feeds.keyboard.key_press("a");
        feeds.keyboard.key_release("a");
        feeds.mouse.mouse_down(1.0, 1.0, crate::record::Button::Left);
        feeds.mouse.mouse_up(1.0, 1.0, crate::record::Button::Left);
        thread::sleep(Duration::from_millis(20));

        recorder.stop();
        let session = recorder.export().unwrap();
        assert_eq!(recorder.state(), RecorderState::Finalized);
        assert_eq!(session.task_id, "task-1");
        assert!(session.video.is_none());

        let actions = session.actions.as_ref().unwrap();
        assert_eq!(actions.len(), 4);
        assert!(actions.iter().all(|a| a.timestep >= 0.0));
        assert!(actions
            .windows(2)
            .all(|pair| pair[0].timestep <= pair[1].timestep));
    }

    #[test]
    fn test_events_after_stop_are_windowed_out() {
        let mut recorder = input_only_recorder();
        recorder.reset().unwrap();
        recorder.set_mode(CaptureMode::Typing);
        let mut feeds = recorder.start().unwrap();

        feeds.keyboard.key_press("a");
        feeds.keyboard.key_release("a");
        thread::sleep(Duration::from_millis(20));
        recorder.stop();
        thread::sleep(Duration::from_millis(5));
        // Stamped after every component stopped, so outside the window.
        feeds.keyboard.key_press("z");
        feeds.keyboard.key_release("z");

        let session = recorder.export().unwrap();
        let actions = session.actions.unwrap();
        assert_eq!(actions.len(), 2);
        assert!(actions
            .iter()
            .all(|a| !matches!(&a.data, EventData::Press { key } if key == "z")));
    }

    #[test]
    fn test_window_bounds_are_max_start_min_stop() {
        let mut recorder = input_only_recorder();
        recorder.reset().unwrap();
        let _feeds = recorder.start().unwrap();
        thread::sleep(Duration::from_millis(10));
        recorder.stop();
        recorder.wait_exit();

        let start = recorder.start_time().unwrap();
        let stop = recorder.stop_time().unwrap();
        assert!(stop > start);
    }

    #[test]
    fn test_pause_markers_and_suppression() {
        let mut recorder = input_only_recorder();
        recorder.reset().unwrap();
        recorder.set_mode(CaptureMode::Typing);
        let mut feeds = recorder.start().unwrap();

        feeds.keyboard.key_press("a");
        feeds.keyboard.key_release("a");
        thread::sleep(Duration::from_millis(20));

        recorder.pause();
        feeds.keyboard.key_press("b");
        feeds.keyboard.key_release("b");
        thread::sleep(Duration::from_millis(20));
        recorder.resume();

        feeds.keyboard.key_press("c");
        feeds.keyboard.key_release("c");
        thread::sleep(Duration::from_millis(20));

        recorder.stop();
        let session = recorder.export().unwrap();
        let actions = session.actions.unwrap();

        let kinds: Vec<EventKind> = actions.iter().map(|a| a.kind).collect();
        assert!(kinds.contains(&EventKind::Pause));
        assert!(kinds.contains(&EventKind::Resume));
        assert!(!actions
            .iter()
            .any(|a| matches!(&a.data, EventData::Press { key } if key == "b")));
        assert!(actions
            .iter()
            .any(|a| matches!(&a.data, EventData::Press { key } if key == "c")));
    }

    #[test]
    fn test_submit_code_is_recorded() {
        let mut recorder = input_only_recorder();
        recorder.reset().unwrap();
        let _feeds = recorder.start().unwrap();
        recorder.submit_code("click(120, 80)");
        thread::sleep(Duration::from_millis(10));
        recorder.stop();

        let session = recorder.export().unwrap();
        let actions = session.actions.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, EventKind::Code);
    }

    #[test]
    fn test_export_requires_stop() {
        let mut recorder = input_only_recorder();
        recorder.reset().unwrap();
        let _feeds = recorder.start().unwrap();
        assert!(recorder.export().is_err());
        recorder.stop();
        assert!(recorder.export().is_ok());
    }

    #[test]
    fn test_export_without_start_fails() {
        let mut recorder = input_only_recorder();
        recorder.reset().unwrap();
        assert!(recorder.export().is_err());
    }

    #[test]
    fn test_save_writes_session_and_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = screen_recorder();
        recorder.reset().unwrap();
        let _feeds = recorder.start().unwrap();
        thread::sleep(Duration::from_millis(80));
        recorder.stop();

        let path = recorder.save(dir.path()).unwrap();
        assert_eq!(path, dir.path().join(SESSION_FILE));

        let session = SessionRecord::load(&path).unwrap();
        let video = session.video.unwrap();
        assert_eq!(video.path, FRAMES_DIR);
        assert_eq!(video.metadata.fps, 50);
        assert!(video.metadata.duration > 0.0);

        let frames: Vec<_> = std::fs::read_dir(dir.path().join(FRAMES_DIR))
            .unwrap()
            .collect();
        assert!(!frames.is_empty());
    }

    #[test]
    fn test_checkpoint_while_recording() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = input_only_recorder();
        recorder.reset().unwrap();
        recorder.set_mode(CaptureMode::Typing);
        let mut feeds = recorder.start().unwrap();
        feeds.keyboard.key_press("a");
        feeds.keyboard.key_release("a");
        thread::sleep(Duration::from_millis(20));

        recorder.checkpoint(dir.path()).unwrap();
        let recovered = SessionRecord::recover_checkpoints(dir.path());
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].1.task_id, "task-1");

        recorder.stop();
        recorder.save(dir.path()).unwrap();
        // A successful save clears the checkpoint.
        assert!(SessionRecord::recover_checkpoints(dir.path()).is_empty());
    }

    #[test]
    fn test_stats_reflect_activity() {
        let mut recorder = screen_recorder();
        recorder.reset().unwrap();
        recorder.set_mode(CaptureMode::Typing);
        let mut feeds = recorder.start().unwrap();
        feeds.keyboard.key_press("x");
        thread::sleep(Duration::from_millis(60));
        recorder.stop();
        recorder.wait_exit();

        let stats = recorder.stats();
        assert!(stats.frames > 0);
        assert_eq!(stats.keyboard.pushed, 1);
    }
}
