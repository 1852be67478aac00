//! Frame timing.

use std::time::{Duration, Instant};

/// Measures time between frames.
///
/// Deltas are clamped to `max_delta` so that a long stall (window drag,
/// swapchain recreation, debugger break) does not teleport the camera.
#[derive(Debug)]
pub struct FrameTimer {
    start: Instant,
    last_tick: Instant,
    max_delta: Duration,
    frame_count: u64,
}

impl FrameTimer {
    /// Default delta clamp.
    pub const DEFAULT_MAX_DELTA: Duration = Duration::from_millis(250);

    pub fn new() -> Self {
        Self::with_max_delta(Self::DEFAULT_MAX_DELTA)
    }

    pub fn with_max_delta(max_delta: Duration) -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            max_delta,
            frame_count: 0,
        }
    }

    /// Total time since creation or the last [`reset`](Self::reset).
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Advance one frame, returning the clamped delta in seconds.
    pub fn tick(&mut self) -> f32 {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> f32 {
        let delta = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        self.frame_count += 1;
        delta.min(self.max_delta).as_secs_f32()
    }

    /// Number of ticks so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last_tick = now;
        self.frame_count = 0;
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_counts_frames() {
        let mut timer = FrameTimer::new();
        timer.tick();
        timer.tick();
        assert_eq!(timer.frame_count(), 2);
        timer.reset();
        assert_eq!(timer.frame_count(), 0);
    }

    #[test]
    fn test_tick_reports_delta() {
        let mut timer = FrameTimer::new();
        let start = timer.last_tick;
        let dt = timer.tick_at(start + Duration::from_millis(16));
        assert!((dt - 0.016).abs() < 1e-6);
    }

    #[test]
    fn test_tick_clamps_long_stall() {
        let mut timer = FrameTimer::with_max_delta(Duration::from_millis(100));
        let start = timer.last_tick;
        let dt = timer.tick_at(start + Duration::from_secs(5));
        assert!((dt - 0.1).abs() < 1e-6);
    }
}
