//! sampler.rs — Adaptive sample buffer for one displayed trace
//!
//! Slow playback leaves more real time per simulated second, so the sample count
//! per window grows as the speed drops:
//! - resolution multiplier over one-sample-per-pixel, picked from the speed
//! - hard budget `min(2000 / speed, 20000)`
//!
//! Renderers look samples up nearest-preceding (no interpolation).

use serde::Serialize;

/// Sample budget at 1× speed.
pub const BASE_SAMPLE_BUDGET: f64 = 2000.0;
/// Absolute ceiling on samples per window.
pub const MAX_SAMPLES: usize = 20_000;

/// Samples per output pixel for a given playback speed.
pub fn resolution_multiplier(speed: f64) -> u32 {
    if speed >= 0.5 {
        1
    } else if speed >= 0.1 {
        2
    } else if speed >= 0.01 {
        5
    } else {
        10
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePlan {
    pub sample_count: usize,
    pub effective_time_step: f64,
}

#[derive(Debug, Clone)]
pub struct AdaptiveSampler {
    viewport_width: usize,
}

impl AdaptiveSampler {
    pub fn new(viewport_width: usize) -> Self {
        Self { viewport_width: viewport_width.max(1) }
    }

    pub fn viewport_width(&self) -> usize {
        self.viewport_width
    }

    pub fn plan(&self, time_window: f64, speed: f64) -> SamplePlan {
        // window / (pixel step / multiplier) reduces to width × multiplier
        let desired = (self.viewport_width as f64) * f64::from(resolution_multiplier(speed));
        let budget = (BASE_SAMPLE_BUDGET / speed).min(MAX_SAMPLES as f64);
        let sample_count = (desired.min(budget).floor() as usize).max(1);
        SamplePlan {
            sample_count,
            effective_time_step: time_window / sample_count as f64,
        }
    }

    /// Evaluate `eval` at uniform steps across `[window_start, window_start + time_window)`.
    pub fn sample<F>(&self, window_start: f64, time_window: f64, speed: f64, mut eval: F) -> SampleWindow
    where
        F: FnMut(f64) -> f64,
    {
        let plan = self.plan(time_window, speed);
        let samples = (0..plan.sample_count)
            .map(|i| eval(window_start + i as f64 * plan.effective_time_step))
            .collect();
        SampleWindow {
            samples,
            effective_time_step: plan.effective_time_step,
            window_start,
            time_window,
        }
    }
}

/// Sample buffer handed to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleWindow {
    pub samples: Vec<f64>,
    pub effective_time_step: f64,
    pub window_start: f64,
    pub time_window: f64,
}

impl SampleWindow {
    /// Index of the sample at or before `offset` seconds into the window, clamped.
    pub fn index_at(&self, offset: f64) -> usize {
        let last = self.samples.len().saturating_sub(1);
        if offset.is_nan() || offset <= 0.0 {
            return 0;
        }
        ((offset / self.effective_time_step).floor() as usize).min(last)
    }

    /// Nearest-preceding sample for absolute simulated time `t`.
    pub fn value_at_time(&self, t: f64) -> Option<f64> {
        self.samples.get(self.index_at(t - self.window_start)).copied()
    }

    /// Nearest-preceding sample for column `x` of a viewport `width` pixels wide.
    pub fn value_at_pixel(&self, x: usize, width: usize) -> Option<f64> {
        let pixel_time = x as f64 * self.time_window / width.max(1) as f64;
        self.samples.get(self.index_at(pixel_time)).copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
