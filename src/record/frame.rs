//! Captured screen frames
//!
//! [`FrameBuffer`] is the lock-protected ordered store shared between the
//! capture thread (single writer) and export. The lock is held only for the
//! critical section, never across I/O or sleeps.

use image::RgbaImage;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Screen rectangle captured by the recorder, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Whether this rectangle lies fully inside an image of the given size.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.left >= 0
            && self.top >= 0
            && self.left as u64 + u64::from(self.width) <= u64::from(width)
            && self.top as u64 + u64::from(self.height) <= u64::from(height)
    }
}

impl Default for Region {
    fn default() -> Self {
        Self::new(0, 0, 1920, 1080)
    }
}

/// One captured frame: an assigned sequence id and its pixel buffer.
#[derive(Debug, Clone)]
pub struct Frame {
    pub sequence: u64,
    pub image: RgbaImage,
}

/// Thread-safe ordered store of captured frames.
///
/// The capture thread appends; export reads after the thread has joined.
/// Sequence ids are assigned on push and strictly increase with no gaps;
/// [`FrameBuffer::reset`] clears the store and restarts the numbering.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    frames: Vec<Frame>,
    next_sequence: u64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an image, assigning the next sequence id. Returns the id.
    pub fn push(&self, image: RgbaImage) -> u64 {
        let mut inner = self.inner.lock();
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.frames.push(Frame { sequence, image });
        sequence
    }

    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().frames.is_empty()
    }

    /// Last assigned sequence id, if any frame has been pushed.
    pub fn last_sequence(&self) -> Option<u64> {
        let inner = self.inner.lock();
        inner.next_sequence.checked_sub(1)
    }

    /// Clone the frames whose sequence ids fall in `[first, last]`.
    pub fn range(&self, first: u64, last: u64) -> Vec<Frame> {
        self.inner
            .lock()
            .frames
            .iter()
            .filter(|f| f.sequence >= first && f.sequence <= last)
            .cloned()
            .collect()
    }

    /// Take every frame out of the buffer, leaving it empty.
    ///
    /// Sequence numbering continues from where it was; use
    /// [`FrameBuffer::reset`] to restart it.
    pub fn drain(&self) -> Vec<Frame> {
        std::mem::take(&mut self.inner.lock().frames)
    }

    /// Clear all frames and restart sequence numbering at zero.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.frames.clear();
        inner.next_sequence = 0;
    }
}
