//! Physics clock
//!
//! Splits each rendered frame into physics substeps. The substep length is
//! capped at `1 / min_cycles_per_second` unless that would need more than
//! `max_cycles_per_frame` substeps, in which case the frame is divided evenly.
//! Unless `allow_multiple_substeps` is set, only the first substep of each
//! frame is simulated and the remainder is dropped.

use log::trace;

use crate::config::ClockConfig;

/// Per-frame physics time accounting
#[derive(Debug, Clone)]
pub struct PhysicsClock {
    config: ClockConfig,
    /// Length of the substep currently being simulated, in seconds
    pub time_factor: f32,
    remaining_frame_time: f32,
    cycle_time_limit: f32,
    static_pair_interval_ms: u32,
    ms_since_static_pass: u32,
    static_pairs_due: bool,
    elapsed: f64,
    frame_count: u64,
}

impl PhysicsClock {
    /// Create a clock; static pairs are tested every `static_pair_interval_ms`
    pub const fn new(config: ClockConfig, static_pair_interval_ms: u32) -> Self {
        Self {
            config,
            time_factor: 0.0,
            remaining_frame_time: 0.0,
            cycle_time_limit: 0.0,
            static_pair_interval_ms,
            ms_since_static_pass: 0,
            static_pairs_due: false,
            elapsed: 0.0,
            frame_count: 0,
        }
    }

    /// Start a frame of `frame_delta` seconds
    pub fn begin_frame(&mut self, frame_delta: f32) {
        let dt = frame_delta.clamp(0.0, self.config.max_frame_delta);
        self.remaining_frame_time = dt;
        let max_cycles = self.config.max_cycles_per_frame.max(1) as f32;
        self.cycle_time_limit = if dt * self.config.min_cycles_per_second <= max_cycles {
            1.0 / self.config.min_cycles_per_second
        } else {
            dt / max_cycles
        };
        self.frame_count += 1;

        let frame_ms = (dt * 1000.0).round() as u32;
        self.ms_since_static_pass = self.ms_since_static_pass.saturating_add(frame_ms);
        self.static_pairs_due = self.ms_since_static_pass >= self.static_pair_interval_ms;
        if self.static_pairs_due {
            self.ms_since_static_pass = 0;
        }
        trace!(
            "PhysicsClock: frame {} dt {dt:.4}s substep limit {:.4}s",
            self.frame_count,
            self.cycle_time_limit
        );
    }

    /// Take the next substep; returns its length, or `None` once the frame is done
    pub fn next_substep(&mut self) -> Option<f32> {
        if self.remaining_frame_time <= f32::EPSILON {
            self.time_factor = 0.0;
            return None;
        }
        let step = self.remaining_frame_time.min(self.cycle_time_limit);
        self.remaining_frame_time = if self.config.allow_multiple_substeps {
            self.remaining_frame_time - step
        } else {
            0.0
        };
        self.time_factor = step;
        self.elapsed += f64::from(step);
        Some(step)
    }

    /// Time left in the current frame
    pub const fn remaining_frame_time(&self) -> f32 {
        self.remaining_frame_time
    }

    /// Largest substep for the current frame
    pub const fn cycle_time_limit(&self) -> f32 {
        self.cycle_time_limit
    }

    /// True on frames where static-vs-static pairs are tested
    pub const fn static_pairs_due(&self) -> bool {
        self.static_pairs_due
    }

    /// Simulated seconds since creation
    pub const fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Frames begun since creation
    pub const fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn clock(multiple: bool) -> PhysicsClock {
        let config = ClockConfig {
            allow_multiple_substeps: multiple,
            ..ClockConfig::default()
        };
        PhysicsClock::new(config, 1000)
    }

    #[test]
    fn test_single_substep_per_frame() {
        let mut clock = clock(false);
        clock.begin_frame(0.1);
        assert_relative_eq!(clock.cycle_time_limit(), 1.0 / 30.0);
        assert_relative_eq!(clock.next_substep().unwrap(), 1.0 / 30.0);
        assert!(clock.next_substep().is_none());
    }

    #[test]
    fn test_multiple_substeps_cover_frame() {
        let mut clock = clock(true);
        clock.begin_frame(0.1);
        let mut total = 0.0;
        let mut steps = 0;
        while let Some(step) = clock.next_substep() {
            total += step;
            steps += 1;
        }
        assert_relative_eq!(total, 0.1, epsilon = 1e-5);
        assert_eq!(steps, 3);
    }

    #[test]
    fn test_long_frame_divides_evenly() {
        let mut clock = clock(true);
        // 0.2s at 30 Hz would need six substeps; five is the cap
        clock.begin_frame(0.2);
        assert_relative_eq!(clock.cycle_time_limit(), 0.04, epsilon = 1e-6);

        // Deltas beyond the maximum are clamped
        clock.begin_frame(5.0);
        assert_relative_eq!(clock.remaining_frame_time(), 0.2);
    }

    #[test]
    fn test_static_pairs_due_periodically() {
        let mut clock = clock(false);
        let mut due_frames = Vec::new();
        for frame in 0..25 {
            clock.begin_frame(0.1);
            if clock.static_pairs_due() {
                due_frames.push(frame);
            }
        }
        assert_eq!(due_frames, vec![9, 19]);
    }
}
