//! Recording pipeline
//!
//! Capture of desktop sessions: screen frames through a [`FrameSource`],
//! keyboard and mouse input through lock-free rings, all merged into a
//! persisted [`SessionRecord`]. Each capture source runs on its own
//! background thread behind a shared start/stop/pause lifecycle; the
//! composite [`Recorder`] owns the session window and the export filters.

pub mod event;
pub mod frame;
pub mod input;
pub mod recorder;
pub mod screen;
pub mod session;
pub mod wm;

pub use event::{
    filter_recorded_events, filter_window, prune_unmatched, Button, Event, EventData, EventKind,
};
pub use frame::{Frame, FrameBuffer, Region};
pub use input::{
    AtomicCaptureMode, CaptureMode, FeedStats, Hotkey, InputFeed, KeyboardRecorder, MouseRecorder,
};
pub use recorder::{
    Recorder, RecorderFeeds, RecorderOptions, RecorderStats, ScreenOptions, FRAMES_DIR,
    SESSION_FILE,
};
pub use screen::{FrameSource, ScreenRecorder, ShellGrabber};
pub use session::{
    Action, SessionRecord, VideoMeta, VideoRecord, CHECKPOINT_INTERVAL, CURRENT_FORMAT_VERSION,
};
pub use wm::{detect_remote, WindowManager};

/// Lifecycle state of a capture component.
///
/// Every recorder moves `Created → Ready → Recording → Stopped → Finalized`;
/// `reset` returns any non-recording state to `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// Constructed, never reset.
    Created,
    /// Buffers clear, ready to start.
    Ready,
    /// Capture threads live.
    Recording,
    /// Stop signalled, threads may still be draining.
    Stopped,
    /// Threads joined, buffers complete.
    Finalized,
}
