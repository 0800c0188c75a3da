//! clock.rs — Simulated time base
//!
//! Simulated time advances by the *real* wall-clock time elapsed since the previous
//! tick, scaled by the playback speed. Pausing freezes simulated time; the wall-clock
//! reference is refreshed on pause and resume so the paused interval is never
//! replayed as one large step.

use std::time::Duration;

use tracing::{info, warn};

/// Slowest playback supported (sampling budgets divide by the speed).
pub const MIN_SPEED: f64 = 0.001;
/// Playback is capped at real time.
pub const MAX_SPEED: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct ClockModel {
    sim_time: f64,
    speed: f64,
    playing: bool,
    /// Wall-clock instant of the last tick / pause boundary (since driver start)
    last_wall: Option<Duration>,
}

impl ClockModel {
    pub fn new(speed: f64) -> Self {
        Self {
            sim_time: 0.0,
            speed: clamp_speed(speed).unwrap_or(MAX_SPEED),
            playing: true,
            last_wall: None,
        }
    }

    /// Current simulated time (s).
    pub fn time(&self) -> f64 {
        self.sim_time
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Set the speed multiplier, clamped to `[MIN_SPEED, MAX_SPEED]`.
    /// Returns the speed actually applied.
    pub fn set_speed(&mut self, speed: f64) -> f64 {
        match clamp_speed(speed) {
            Some(s) => self.speed = s,
            None => warn!("Ignoring non-finite speed {speed}"),
        }
        self.speed
    }

    /// Advance by the wall time elapsed since the last call. Returns the simulated
    /// seconds added (0 on the first call and while paused).
    pub fn advance(&mut self, now: Duration) -> f64 {
        let real_dt = match self.last_wall {
            Some(prev) => now.saturating_sub(prev).as_secs_f64(),
            None => 0.0,
        };
        self.last_wall = Some(now);
        if !self.playing {
            return 0.0;
        }
        let dt = real_dt * self.speed;
        self.sim_time += dt;
        dt
    }

    pub fn pause(&mut self, now: Duration) {
        if self.playing {
            info!("⏸ Simulation paused at t={:.3}s", self.sim_time);
        }
        self.playing = false;
        self.last_wall = Some(now);
    }

    pub fn resume(&mut self, now: Duration) {
        if !self.playing {
            info!("▶ Simulation resumed at t={:.3}s", self.sim_time);
        }
        self.playing = true;
        self.last_wall = Some(now);
    }

    /// Back to t=0; speed and play state are kept.
    pub fn reset(&mut self) {
        self.sim_time = 0.0;
    }
}

fn clamp_speed(speed: f64) -> Option<f64> {
    speed.is_finite().then(|| speed.clamp(MIN_SPEED, MAX_SPEED))
}
