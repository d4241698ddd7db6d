//! Screen capture recorder
//!
//! A single background thread grabs region-bounded frames through a
//! [`FrameSource`], appends them to a [`FrameBuffer`] with incrementing
//! sequence ids, and paces itself at the target frame rate. Pacing is
//! best-effort: an iteration that takes longer than `1/fps` logs a rate
//! violation and continues. Grab errors terminate the capture thread; there
//! is no automatic restart.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use image::RgbaImage;
use tracing::{error, info, trace, warn};

use crate::record::frame::{FrameBuffer, Region};
use crate::record::wm::{shell_status, WindowManager};
use crate::record::RecorderState;
use crate::time::{wall_time, FramePacer};

/// How often the capture loop rechecks the stop/pause flags while paused.
const PAUSE_POLL: Duration = Duration::from_millis(20);

/// Produces screen images for the capture loop.
///
/// The shipped implementation shells out to an OS screenshot command; tests
/// substitute synthetic sources.
pub trait FrameSource: Send {
    /// Grab the current contents of `region` as RGBA pixels.
    fn grab(&mut self, region: &Region) -> crate::Result<RgbaImage>;
}

/// Frame source backed by an external screenshot command.
///
/// The configured command line must contain a `{path}` placeholder; the
/// command writes a PNG there and the grabber loads and crops it to the
/// requested region.
pub struct ShellGrabber {
    command: String,
    scratch: PathBuf,
}

impl ShellGrabber {
    pub fn new(command: &str) -> Self {
        static NEXT_SCRATCH: AtomicU64 = AtomicU64::new(0);
        let scratch = std::env::temp_dir().join(format!(
            "deskbench-grab-{}-{}.png",
            std::process::id(),
            NEXT_SCRATCH.fetch_add(1, Ordering::Relaxed)
        ));
        Self {
            command: command.to_string(),
            scratch,
        }
    }
}

impl FrameSource for ShellGrabber {
    fn grab(&mut self, region: &Region) -> crate::Result<RgbaImage> {
        let command = self
            .command
            .replace("{path}", &self.scratch.display().to_string());
        let status = shell_status(&command)?;
        if !status.success() {
            return Err(crate::Error::Record(format!(
                "capture command failed with {status}"
            )));
        }

        let image = image::open(&self.scratch)?.to_rgba8();
        if region.left == 0
            && region.top == 0
            && region.width == image.width()
            && region.height == image.height()
        {
            return Ok(image);
        }
        if !region.fits_within(image.width(), image.height()) {
            return Err(crate::Error::Record(format!(
                "capture region {}x{}+{}+{} does not fit the {}x{} screenshot",
                region.width,
                region.height,
                region.left,
                region.top,
                image.width(),
                image.height()
            )));
        }
        Ok(image::imageops::crop_imm(
            &image,
            region.left as u32,
            region.top as u32,
            region.width,
            region.height,
        )
        .to_image())
    }
}

/// Background screen recorder.
///
/// Lifecycle: `Created → reset → Ready → start → Recording → stop →
/// Stopped → wait_exit → Finalized`. The frame source is consumed by
/// `start`, so a recorder captures one session; build a new one to record
/// again.
pub struct ScreenRecorder {
    fps: u32,
    region: Region,
    buffer: Arc<FrameBuffer>,
    wm: WindowManager,
    state: RecorderState,
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    overruns: Arc<AtomicU64>,
    source: Option<Box<dyn FrameSource>>,
    handle: Option<JoinHandle<()>>,
    start_time: Option<f64>,
    stop_time: Option<f64>,
}

impl ScreenRecorder {
    pub fn new(
        fps: u32,
        region: Region,
        source: Box<dyn FrameSource>,
        wm: WindowManager,
        paused: Arc<AtomicBool>,
    ) -> Self {
        Self {
            fps,
            region,
            buffer: Arc::new(FrameBuffer::new()),
            wm,
            state: RecorderState::Created,
            running: Arc::new(AtomicBool::new(false)),
            paused,
            overruns: Arc::new(AtomicU64::new(0)),
            source: Some(source),
            handle: None,
            start_time: None,
            stop_time: None,
        }
    }

    /// Clear buffers and counters; the recorder becomes ready to start.
    pub fn reset(&mut self) -> crate::Result<()> {
        if self.state == RecorderState::Recording {
            return Err(crate::Error::Record(
                "cannot reset a recording screen recorder".to_string(),
            ));
        }
        self.buffer.reset();
        self.overruns.store(0, Ordering::SeqCst);
        self.start_time = None;
        self.stop_time = None;
        self.state = RecorderState::Ready;
        Ok(())
    }

    /// Spawn the capture thread and record the start time.
    pub fn start(&mut self) -> crate::Result<()> {
        if self.state != RecorderState::Ready {
            return Err(crate::Error::Record(format!(
                "screen recorder cannot start from state {:?}",
                self.state
            )));
        }
        let source = self.source.take().ok_or_else(|| {
            crate::Error::Record("screen recorder frame source already consumed".to_string())
        })?;

        self.wm.minimize();
        self.running.store(true, Ordering::SeqCst);
        self.start_time = Some(wall_time());

        let region = self.region;
        let fps = self.fps;
        let buffer = Arc::clone(&self.buffer);
        let running = Arc::clone(&self.running);
        let paused = Arc::clone(&self.paused);
        let overruns = Arc::clone(&self.overruns);

        let handle = thread::Builder::new()
            .name("screen-capture".to_string())
            .spawn(move || {
                if let Err(e) = run_capture_loop(source, region, fps, buffer, running, paused, overruns)
                {
                    error!("Screen capture loop failed: {}", e);
                }
            })
            .map_err(|e| crate::Error::Record(format!("failed to spawn capture thread: {e}")))?;

        self.handle = Some(handle);
        self.state = RecorderState::Recording;
        info!(fps, ?region, "screen recorder started");
        Ok(())
    }

    /// Signal the capture thread to exit and record the stop time.
    pub fn stop(&mut self) {
        if self.state != RecorderState::Recording {
            warn!(state = ?self.state, "screen recorder is not recording; stop ignored");
            return;
        }
        self.running.store(false, Ordering::SeqCst);
        self.stop_time = Some(wall_time());
        self.wm.restore();
        self.state = RecorderState::Stopped;
    }

    /// Block until the capture thread has fully drained.
    ///
    /// Must be called before reading the frame buffer for export; skipping
    /// it can silently exclude the last frame.
    pub fn wait_exit(&mut self) {
        if self.state == RecorderState::Recording {
            warn!("screen recorder still recording in wait_exit; stopping first");
            self.stop();
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("screen capture thread panicked");
            }
        }
        if self.state == RecorderState::Stopped {
            self.state = RecorderState::Finalized;
        }
        info!(
            frames = self.buffer.len(),
            overruns = self.overruns(),
            "screen recorder finalized"
        );
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

    /// Shared handle to the frame store.
    pub fn buffer(&self) -> Arc<FrameBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Number of iterations that exceeded the target period.
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::SeqCst)
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn region(&self) -> Region {
        self.region
    }
}

impl Drop for ScreenRecorder {
    fn drop(&mut self) {
        if self.state == RecorderState::Recording {
            self.stop();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_capture_loop(
    mut source: Box<dyn FrameSource>,
    region: Region,
    fps: u32,
    buffer: Arc<FrameBuffer>,
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    overruns: Arc<AtomicU64>,
) -> crate::Result<()> {
    let pacer = FramePacer::new(fps);
    while running.load(Ordering::SeqCst) {
        if paused.load(Ordering::SeqCst) {
            thread::sleep(PAUSE_POLL);
            continue;
        }
        let begin = Instant::now();
        let image = source.grab(&region)?;
        let sequence = buffer.push(image);
        trace!(sequence, "captured frame");
        if let Some(lag) = pacer.pace(begin) {
            overruns.fetch_add(1, Ordering::SeqCst);
            warn!(
                sequence,
                lag_ms = lag.as_millis() as u64,
                "frame capture exceeded the target period"
            );
        }
    }
    Ok(())
}
