//! Wall-clock timestamps and loop pacing
//!
//! Recorded events carry wall-clock timestamps in floating-point seconds so
//! that session action timesteps (`event.time - session.start_time`) survive
//! JSON round trips unchanged. Pacing for the capture and replay loops is
//! sleep-based and best-effort: a loop that falls behind proceeds
//! immediately instead of trying to catch up.

use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Current wall-clock time in seconds since the Unix epoch.
pub fn wall_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Paces a loop at a fixed target rate.
///
/// The loop records an [`Instant`] before doing its work, then calls
/// [`FramePacer::pace`], which sleeps out the remainder of the period. When
/// the work already took longer than the period, `pace` returns the overrun
/// amount instead of sleeping so the caller can log a rate violation.
#[derive(Debug, Clone, Copy)]
pub struct FramePacer {
    period: Duration,
}

impl FramePacer {
    /// Create a pacer targeting `fps` iterations per second.
    pub fn new(fps: u32) -> Self {
        let period = if fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / f64::from(fps))
        };
        Self { period }
    }

    /// Target period between iterations.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Sleep out the remainder of the period that began at `begin`.
    ///
    /// Returns `None` when the iteration fit inside the period, or
    /// `Some(overrun)` when it already exceeded it (no sleep happens in that
    /// case).
    pub fn pace(&self, begin: Instant) -> Option<Duration> {
        let elapsed = begin.elapsed();
        if elapsed <= self.period {
            thread::sleep(self.period - elapsed);
            None
        } else {
            Some(elapsed - self.period)
        }
    }
}

/// Sleep until `offset` seconds have elapsed since `start`.
///
/// Used by replay to reconstruct inter-event intervals: waits out the
/// remaining interval and returns the duration slept, or returns zero
/// immediately when the caller is already at or past the target. Never
/// sleeps a negative amount and never skips ahead.
pub fn wait_for_offset(start: Instant, offset: f64) -> Duration {
    let remaining = offset - start.elapsed().as_secs_f64();
    if remaining.is_finite() && remaining > 0.0 {
        let wait = Duration::from_secs_f64(remaining);
        thread::sleep(wait);
        wait
    } else {
        Duration::ZERO
    }
}
