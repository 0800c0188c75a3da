//! trigger.rs — Oscilloscope time base
//!
//! Picks where the displayed window starts. The window always spans four cycles.
//! - Free-run (`None`): the window trails the reference time, so the trace scrolls
//! - `Auto` / `Manual`: the window is centred on the rising-edge crossing of the
//!   target voltage inside the current cycle, so every refresh lands on the same
//!   phase and the trace stands still
//!
//! The crossing comes straight from the ideal sinusoid (`asin` of the normalised
//! level); no sample search is needed. A target outside the amplitude envelope
//! falls back to the cycle's zero crossing.

use serde::Serialize;
use tracing::info;

use mains_types::{SimulationParameters, TriggerConfig, TriggerMode};

/// Cycles shown in one window.
pub const CYCLES_PER_WINDOW: f64 = 4.0;

/// Width of the displayed window in simulated seconds.
pub fn time_window(params: &SimulationParameters) -> f64 {
    CYCLES_PER_WINDOW / params.frequency_hz
}

/// Rising-edge crossing of `target_v` in the cycle containing `reference_time`.
pub fn rising_crossing(params: &SimulationParameters, target_v: f64, reference_time: f64) -> f64 {
    let period = params.period();
    let cycle_start = (reference_time / period).floor() * period;
    let relative = target_v - params.effective_offset();
    if relative.abs() <= params.amplitude_v {
        // principal branch of asin is the rising edge
        let phase = (relative / params.amplitude_v).asin();
        cycle_start + phase / params.angular_frequency()
    } else {
        cycle_start
    }
}

/// Where a renderer draws the trigger indicator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TriggerMarker {
    pub mode: TriggerMode,
    /// Horizontal position as a fraction of the viewport width (0 = left edge)
    pub position: f64,
    pub crossing_time: Option<f64>,
    /// Trigger voltage, shown next to the marker
    pub level_v: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct TriggerEngine {
    config: TriggerConfig,
}

impl TriggerEngine {
    pub fn new(config: TriggerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> TriggerConfig {
        self.config
    }

    pub fn set_config(&mut self, config: TriggerConfig) {
        if config != self.config {
            info!("🎯 Trigger set to {config:?}");
        }
        self.config = config;
    }

    /// Trigger point for the window around `reference_time`; `None` in free-run.
    pub fn crossing_time(&self, params: &SimulationParameters, reference_time: f64) -> Option<f64> {
        self.config
            .target_voltage()
            .map(|target| rising_crossing(params, target, reference_time))
    }

    pub fn window_start(&self, params: &SimulationParameters, reference_time: f64) -> f64 {
        let window = time_window(params);
        match self.crossing_time(params, reference_time) {
            Some(crossing) => crossing - window / 2.0,
            None => reference_time - window,
        }
    }

    pub fn marker(&self, params: &SimulationParameters, reference_time: f64) -> TriggerMarker {
        match self.crossing_time(params, reference_time) {
            Some(crossing) => TriggerMarker {
                mode: self.config.mode(),
                position: 0.5,
                crossing_time: Some(crossing),
                level_v: self.config.target_voltage(),
            },
            None => {
                // free-run sweep repeats once per cycle
                let sweep = time_window(params) / CYCLES_PER_WINDOW;
                TriggerMarker {
                    mode: TriggerMode::None,
                    position: 1.0 - reference_time.rem_euclid(sweep) / sweep,
                    crossing_time: None,
                    level_v: None,
                }
            }
        }
    }
}
