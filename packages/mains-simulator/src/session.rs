//! session.rs — Simulation session
//!
//! Owns one instance of every engine component and sequences the tick:
//!   1. maintenance: prune faults that ran out during the previous frame
//!   2. trail: remember the previous reference time for redraws
//!   3. clock: advance by scaled wall time
//!   4. statistics: sample L1 (and L2 when split-phase) at the new simulated time
//!
//! Renderer queries (`sample_window`, `trigger_marker`, snapshots) happen between
//! ticks against the fault set as the tick left it.

use std::collections::VecDeque;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use mains_types::{
    FaultId, FaultStatus, FaultType, Leg, SimulationParameters, SpeedPreset, TransientSample,
    TriggerConfig, TriggerMode, VoltageStatistics,
};

use crate::clock::ClockModel;
use crate::fault_effects::FaultEffectModel;
use crate::faults::{FaultRegistry, DEFAULT_INTENSITY};
use crate::readout::{safety_alerts, SafetyAlert, WaveformReadout};
use crate::sampler::{AdaptiveSampler, SampleWindow};
use crate::statistics::{StatisticsTracker, DEFAULT_HISTORY_CAPACITY, DEFAULT_TRANSIENT_INTERVAL};
use crate::trigger::{time_window, TriggerEngine, TriggerMarker};
use crate::waveform::WaveformSynthesizer;

pub const DEFAULT_VIEWPORT_WIDTH: usize = 800;
pub const DEFAULT_TRAIL_LENGTH: usize = 400;

/// Construction-time knobs that are not part of the signal itself.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub viewport_width: usize,
    pub history_capacity: usize,
    pub transient_interval: Duration,
    pub trail_length: usize,
    pub intensity: f64,
    pub speed: f64,
    pub trigger: TriggerConfig,
    /// Fixed seed for the fault noise; `None` draws one from the OS
    pub seed: Option<u64>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            transient_interval: DEFAULT_TRANSIENT_INTERVAL,
            trail_length: DEFAULT_TRAIL_LENGTH,
            intensity: DEFAULT_INTENSITY,
            speed: 1.0,
            trigger: TriggerConfig::default(),
            seed: None,
        }
    }
}

/// What one call to [`Session::tick`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Clock frozen; only the wall-clock reference moved
    Paused,
    Advanced {
        sim_time: f64,
        dt: f64,
        /// Faults removed by the maintenance pass
        expired: Vec<FaultId>,
    },
}

pub struct Session {
    params: SimulationParameters,
    clock: ClockModel,
    faults: FaultRegistry,
    effects: FaultEffectModel,
    trigger: TriggerEngine,
    sampler: AdaptiveSampler,
    stats: StatisticsTracker,
    trail: VecDeque<f64>,
    trail_length: usize,
    rng: StdRng,
}

impl Session {
    pub fn new(params: SimulationParameters, options: SessionOptions) -> Self {
        let params = params.sanitized();
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            clock: ClockModel::new(options.speed),
            faults: FaultRegistry::new(options.intensity),
            effects: FaultEffectModel::default(),
            trigger: TriggerEngine::new(options.trigger),
            sampler: AdaptiveSampler::new(options.viewport_width),
            stats: StatisticsTracker::new(
                &params,
                options.history_capacity,
                options.transient_interval,
            ),
            trail: VecDeque::with_capacity(options.trail_length),
            trail_length: options.trail_length,
            rng,
            params,
        }
    }

    // ── Configuration ────────────────────────────────────────────────────────

    /// Replace the signal parameters; used from the next evaluation on.
    /// A new amplitude invalidates the recorded extrema, so they restart from nominal.
    pub fn configure(&mut self, params: SimulationParameters) {
        let params = params.sanitized();
        let amplitude_changed = params.amplitude_v != self.params.amplitude_v;
        self.params = params;
        if amplitude_changed {
            self.stats.reset(&self.params, self.clock.time());
        }
        info!(
            "🔧 Configured {:.1} Hz / {:.1} V peak, offset {:.1} V ({})",
            params.frequency_hz,
            params.amplitude_v,
            params.dc_offset_v,
            if params.chassis_grounded {
                "bonded"
            } else {
                "floating"
            }
        );
    }

    pub fn params(&self) -> &SimulationParameters {
        &self.params
    }

    // ── Faults ───────────────────────────────────────────────────────────────

    pub fn trigger_fault(&mut self, fault_type: FaultType) -> Option<FaultId> {
        self.faults.trigger(fault_type, self.clock.time())
    }

    /// Unknown names are a logged no-op.
    pub fn trigger_fault_named(&mut self, name: &str) -> Option<FaultId> {
        self.faults.trigger_named(name, self.clock.time())
    }

    pub fn clear_all_faults(&mut self) {
        self.faults.clear();
    }

    pub fn set_fault_intensity(&mut self, intensity: f64) -> f64 {
        self.faults.set_intensity(intensity)
    }

    pub fn faults(&self) -> &FaultRegistry {
        &self.faults
    }

    pub fn fault_statuses(&self) -> Vec<FaultStatus> {
        self.faults.statuses(self.clock.time())
    }

    /// Drop faults that have run out as of the current simulated time.
    pub fn maintain(&mut self) -> Vec<FaultId> {
        self.faults
            .prune_expired(self.clock.time())
            .into_iter()
            .map(|f| f.id)
            .collect()
    }

    // ── Trigger ──────────────────────────────────────────────────────────────

    pub fn set_trigger_config(&mut self, config: TriggerConfig) {
        self.trigger.set_config(config);
    }

    pub fn set_trigger(&mut self, mode: TriggerMode, level: Option<f64>) {
        self.set_trigger_config(TriggerConfig::from_mode(mode, level));
    }

    pub fn trigger_config(&self) -> TriggerConfig {
        self.trigger.config()
    }

    pub fn trigger_marker(&self, reference_time: f64) -> TriggerMarker {
        self.trigger.marker(&self.params, reference_time)
    }

    // ── Playback ─────────────────────────────────────────────────────────────

    /// Capped at real time; returns the speed applied.
    pub fn set_speed(&mut self, speed: f64) -> f64 {
        let applied = self.clock.set_speed(speed);
        info!("⏩ Speed set to {applied}×");
        applied
    }

    pub fn apply_speed_preset(&mut self, preset: SpeedPreset) -> f64 {
        self.set_speed(preset.multiplier())
    }

    pub fn speed(&self) -> f64 {
        self.clock.speed()
    }

    pub fn time(&self) -> f64 {
        self.clock.time()
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_playing()
    }

    pub fn pause(&mut self, now: Duration) {
        self.clock.pause(now);
    }

    pub fn resume(&mut self, now: Duration) {
        self.clock.resume(now);
    }

    pub fn toggle_play(&mut self, now: Duration) {
        if self.clock.is_playing() {
            self.pause(now);
        } else {
            self.resume(now);
        }
    }

    /// Time back to zero, faults and trail gone, chassis re-bonded with no offset.
    pub fn reset(&mut self) {
        self.clock.reset();
        self.faults.clear();
        self.trail.clear();
        self.params.dc_offset_v = 0.0;
        self.params.chassis_grounded = true;
        self.stats.clear(&self.params);
        info!("↺ Simulation reset");
    }

    /// One animation tick at wall-clock `now` (time since driver start).
    pub fn tick(&mut self, now: Duration) -> TickOutcome {
        if !self.clock.is_playing() {
            self.clock.advance(now);
            return TickOutcome::Paused;
        }

        let expired = self.maintain();

        let previous = self.clock.time();
        if self.trail_length > 0 {
            if self.trail.len() == self.trail_length {
                self.trail.pop_front();
            }
            self.trail.push_back(previous);
        }

        let dt = self.clock.advance(now);
        let sim_time = self.clock.time();

        let l1 = self.value(sim_time, Leg::L1.offset());
        let l2 = self
            .params
            .split_phase
            .then(|| self.value(sim_time, Leg::L2.offset()));
        self.stats.record(&self.params, &self.faults, sim_time, l1, l2, now);

        TickOutcome::Advanced { sim_time, dt, expired }
    }

    // ── Rendering queries ────────────────────────────────────────────────────

    /// Instantaneous voltage; `t` need not be the current time.
    pub fn value(&mut self, t: f64, phase_offset: f64) -> f64 {
        WaveformSynthesizer::new(&self.params, &self.faults, &self.effects)
            .value(t, phase_offset, &mut self.rng)
    }

    /// Sample buffer for the four-cycle window positioned around `reference_time`.
    pub fn sample_window(&mut self, reference_time: f64, phase_offset: f64) -> SampleWindow {
        let window = time_window(&self.params);
        let start = self.trigger.window_start(&self.params, reference_time);
        let speed = self.clock.speed();
        let synth = WaveformSynthesizer::new(&self.params, &self.faults, &self.effects);
        let rng = &mut self.rng;
        self.sampler
            .sample(start, window, speed, |t| synth.value(t, phase_offset, &mut *rng))
    }

    /// Previous reference times, oldest first, for redrawing fading trail frames.
    pub fn trail_frames(&self) -> impl Iterator<Item = f64> + '_ {
        self.trail.iter().copied()
    }

    pub fn statistics_snapshot(&self) -> VoltageStatistics {
        self.stats.snapshot()
    }

    pub fn transient_history(&self, timebase_ms: f64) -> Vec<TransientSample> {
        self.stats.history(timebase_ms).copied().collect()
    }

    pub fn latest_transient(&self) -> Option<TransientSample> {
        self.stats.latest().copied()
    }

    pub fn readout(&self) -> WaveformReadout {
        WaveformReadout::compute(&self.params, self.clock.time(), self.clock.speed())
    }

    pub fn safety_alerts(&self) -> Vec<SafetyAlert> {
        safety_alerts(&self.params, &self.faults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(
            SimulationParameters::default(),
            SessionOptions { seed: Some(11), ..Default::default() },
        )
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn first_tick_establishes_reference() {
        let mut s = session();
        assert_eq!(
            s.tick(ms(500)),
            TickOutcome::Advanced { sim_time: 0.0, dt: 0.0, expired: vec![] }
        );
        s.tick(ms(600));
        assert!((s.time() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn speed_scales_simulated_time() {
        let mut s = session();
        s.set_speed(0.1);
        s.tick(ms(0));
        s.tick(ms(1000));
        assert!((s.time() - 0.1).abs() < 1e-12);
        assert_eq!(s.set_speed(4.0), 1.0);
    }

    #[test]
    fn toggle_play_freezes_and_restarts() {
        let mut s = session();
        s.tick(ms(0));
        s.tick(ms(100));
        s.toggle_play(ms(100));
        assert!(!s.is_playing());
        assert_eq!(s.tick(ms(5000)), TickOutcome::Paused);
        s.toggle_play(ms(6000));
        s.tick(ms(6050));
        assert!((s.time() - 0.15).abs() < 1e-12);
    }

    #[test]
    fn trail_is_bounded() {
        let mut s = Session::new(
            SimulationParameters::default(),
            SessionOptions { trail_length: 3, seed: Some(1), ..Default::default() },
        );
        for i in 0..10 {
            s.tick(ms(i * 10));
        }
        let trail: Vec<f64> = s.trail_frames().collect();
        assert_eq!(trail.len(), 3);
        assert!(trail.windows(2).all(|w| w[0] < w[1]));
        assert!(trail[2] < s.time());
    }

    #[test]
    fn reset_restores_bonded_zero_state() {
        let mut s = session();
        s.configure(SimulationParameters {
            dc_offset_v: 40.0,
            chassis_grounded: false,
            ..Default::default()
        });
        s.trigger_fault(FaultType::DcInjection);
        s.tick(ms(0));
        s.tick(ms(200));
        s.reset();
        assert_eq!(s.time(), 0.0);
        assert!(s.faults().is_empty());
        assert_eq!(s.trail_frames().count(), 0);
        assert_eq!(s.params().dc_offset_v, 0.0);
        assert!(s.params().chassis_grounded);
        assert!(s.latest_transient().is_none());
        assert!(s.safety_alerts().is_empty());
    }

    #[test]
    fn configure_floors_invalid_values() {
        let mut s = session();
        s.configure(SimulationParameters { frequency_hz: 0.0, amplitude_v: -3.0, ..Default::default() });
        assert!(s.params().frequency_hz > 0.0);
        assert!(s.params().amplitude_v > 0.0);
        let window = s.sample_window(1.0, 0.0);
        assert!(window.samples.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn configure_with_new_amplitude_resets_statistics() {
        let mut s = session();
        s.configure(SimulationParameters { amplitude_v: 155.0, ..Default::default() });
        let stats = s.statistics_snapshot();
        assert_eq!(stats.peak_high, 155.0);
        assert_eq!(stats.peak_low, -155.0);
    }

    #[test]
    fn unknown_fault_name_is_rejected() {
        let mut s = session();
        assert!(s.trigger_fault_named("toaster-fire").is_none());
        assert!(s.faults().is_empty());
        assert!(s.trigger_fault_named("ground-fault").is_some());
    }

    #[test]
    fn trigger_mode_switch_changes_marker() {
        let mut s = session();
        s.set_trigger(TriggerMode::Manual, Some(60.0));
        assert_eq!(s.trigger_config(), TriggerConfig::Manual { voltage_v: 60.0 });
        assert_eq!(s.trigger_marker(1.0).level_v, Some(60.0));
        s.set_trigger(TriggerMode::None, None);
        assert!(s.trigger_marker(1.0).crossing_time.is_none());
    }

    #[test]
    fn inrush_that_ended_mid_step_does_not_sag_the_sample() {
        let mut s = session();
        s.set_fault_intensity(1.0);
        s.tick(ms(0));
        s.trigger_fault(FaultType::MotorStart240V);
        s.tick(ms(600));

        let nominal = s.params().nominal_rms();
        let sample = s.latest_transient().unwrap();
        assert!((sample.rms_estimate - nominal).abs() < 1e-9);
        assert_eq!(sample.active_fault_count, 0);
        let stats = s.statistics_snapshot();
        assert_eq!(stats.min_rms, nominal);
        assert_eq!(stats.min_rms_time, 0.0);
        // pruned on the following tick
        assert_eq!(s.faults().len(), 1);
        s.tick(ms(616));
        assert!(s.faults().is_empty());
    }

    #[test]
    fn single_phase_statistics_ignore_l2_faults() {
        let mut s = Session::new(
            SimulationParameters { split_phase: false, ..Default::default() },
            SessionOptions { seed: Some(3), ..Default::default() },
        );
        s.set_fault_intensity(1.0);
        s.trigger_fault(FaultType::Imbalanced240V);
        s.tick(ms(0));
        for i in 1..=30 {
            s.tick(ms(i * 17));
        }
        // L1 alone never leaves ±amplitude; a modelled L2 would reach -255 V
        let stats = s.statistics_snapshot();
        assert_eq!(stats.peak_low, -170.0);
        assert_eq!(s.latest_transient().unwrap().peak_magnitude_l2, 0.0);
    }
}
