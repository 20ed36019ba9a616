//! Fixed-rate tick loop.
//!
//! Accumulates wall-clock time and runs as many whole ticks as fit, so the
//! simulation advances at `tick_rate` regardless of how long each frame of
//! host work takes.

use std::time::{Duration, Instant};

use tracing::warn;

/// Largest frame time carried into the accumulator. Longer stalls are
/// dropped instead of replayed as a burst of catch-up ticks.
pub const MAX_FRAME_TIME: f64 = 0.5;

/// Fixed-rate tick loop state.
pub struct TickLoop {
    tick_dt: f64,
    previous_time: Instant,
    accumulator: f64,
    tick_count: u64,
}

impl TickLoop {
    /// Creates a loop running `tick_rate` ticks per second.
    pub fn new(tick_rate: u32) -> Self {
        Self {
            tick_dt: 1.0 / f64::from(tick_rate.max(1)),
            previous_time: Instant::now(),
            accumulator: 0.0,
            tick_count: 0,
        }
    }

    /// Measures the time since the last call and runs the ticks it covers.
    /// Returns the number of ticks run.
    pub fn run_frame(&mut self, update: impl FnMut(u64)) -> u32 {
        let now = Instant::now();
        let frame_time = now.duration_since(self.previous_time).as_secs_f64();
        self.previous_time = now;
        self.advance(frame_time, update)
    }

    /// Adds `frame_time` seconds and runs `update(tick_index)` once per whole
    /// tick. Returns the number of ticks run.
    pub fn advance(&mut self, mut frame_time: f64, mut update: impl FnMut(u64)) -> u32 {
        if frame_time > MAX_FRAME_TIME {
            warn!(
                "Frame time {:.1}ms exceeds maximum, clamping to {:.1}ms",
                frame_time * 1000.0,
                MAX_FRAME_TIME * 1000.0
            );
            frame_time = MAX_FRAME_TIME;
        }

        self.accumulator += frame_time;
        let mut ran = 0;
        while self.accumulator >= self.tick_dt {
            update(self.tick_count);
            self.tick_count += 1;
            self.accumulator -= self.tick_dt;
            ran += 1;
        }
        ran
    }

    /// Time left until the next tick is due.
    pub fn time_until_next_tick(&self) -> Duration {
        Duration::from_secs_f64((self.tick_dt - self.accumulator).max(0.0))
    }

    /// Total ticks run.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_frame_runs_one_tick() {
        let mut tick_loop = TickLoop::new(20);
        assert_eq!(tick_loop.advance(0.05, |_| {}), 1);
        assert_eq!(tick_loop.tick_count(), 1);
    }

    #[test]
    fn test_short_frames_accumulate() {
        let mut tick_loop = TickLoop::new(20);
        let mut seen = Vec::new();
        for _ in 0..10 {
            tick_loop.advance(0.011, |i| seen.push(i));
        }
        // 0.11s at 20 Hz.
        assert_eq!(seen, vec![0, 1]);
    }

    #[test]
    fn test_long_stall_is_clamped() {
        let mut tick_loop = TickLoop::new(4);
        assert_eq!(tick_loop.advance(10.0, |_| {}), 2);
    }

    #[test]
    fn test_time_until_next_tick() {
        let mut tick_loop = TickLoop::new(10);
        tick_loop.advance(0.04, |_| {});
        let wait = tick_loop.time_until_next_tick().as_secs_f64();
        assert!((wait - 0.06).abs() < 1e-9);
    }
}
