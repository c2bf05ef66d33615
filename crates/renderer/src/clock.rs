use std::time::{Duration, Instant};

use tracing::debug;

/// Elapsed time and frame counter shared by every pass of a frame.
///
/// `tick` samples the time before uniforms are uploaded; `advance` bumps the
/// frame counter once all passes are done. Both values restart from zero on
/// `reset`, which the renderer calls whenever the window size changes.
#[derive(Debug, Clone)]
pub struct FrameClock {
    origin: Instant,
    elapsed: f32,
    frame: u32,
    stats: FrameStats,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(now: Instant) -> Self {
        Self {
            origin: now,
            elapsed: 0.0,
            frame: 0,
            stats: FrameStats::new(now),
        }
    }

    pub fn reset(&mut self) {
        self.reset_at(Instant::now());
    }

    pub fn reset_at(&mut self, now: Instant) {
        self.origin = now;
        self.elapsed = 0.0;
        self.frame = 0;
    }

    pub fn tick(&mut self) -> f32 {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> f32 {
        self.elapsed = now.saturating_duration_since(self.origin).as_secs_f32();
        self.elapsed
    }

    pub fn advance(&mut self) {
        self.advance_at(Instant::now());
    }

    pub fn advance_at(&mut self, now: Instant) {
        self.frame = self.frame.saturating_add(1);
        if let Some(fps) = self.stats.record(now) {
            debug!(
                fps = fps.round(),
                frame_count = self.frame,
                time = self.elapsed,
                "render stats"
            );
        }
    }

    /// Seconds since the last reset, as of the last tick.
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Frame counter in the shape the `iFrame` uniform expects.
    pub fn frame_uniform(&self) -> i32 {
        self.frame.min(i32::MAX as u32) as i32
    }

    pub fn frames_per_second(&self) -> f32 {
        self.stats.frames_per_second
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Frames-per-second measured over one-second windows. Unaffected by resets
/// so the log keeps a steady cadence across resizes.
#[derive(Debug, Clone)]
struct FrameStats {
    last_update: Instant,
    frames_since_update: u32,
    frames_per_second: f32,
}

impl FrameStats {
    const WINDOW: Duration = Duration::from_secs(1);

    fn new(now: Instant) -> Self {
        Self {
            last_update: now,
            frames_since_update: 0,
            frames_per_second: 0.0,
        }
    }

    fn record(&mut self, now: Instant) -> Option<f32> {
        self.frames_since_update += 1;
        let elapsed = now.saturating_duration_since(self.last_update);
        if elapsed < Self::WINDOW {
            return None;
        }
        self.frames_per_second = self.frames_since_update as f32 / elapsed.as_secs_f32();
        self.frames_since_update = 0;
        self.last_update = now;
        Some(self.frames_per_second)
    }
}
