//! statistics.rs — Running voltage statistics and transient history
//!
//! Fed once per tick with the instantaneous L1/L2 values at the current simulated
//! time. Keeps:
//! 1. Peak extrema with outlier rejection (arc noise must not redefine the record)
//! 2. RMS extrema of a heuristic RMS estimate, bounded around nominal
//! 3. A bounded history of transient samples, rate-limited on wall-clock time

use std::collections::VecDeque;
use std::time::Duration;

use tracing::debug;

use mains_types::{Fault, FaultType, SimulationParameters, TransientSample, VoltageStatistics};

use crate::faults::FaultRegistry;

/// Without arc faults, extrema beyond ±1.5× amplitude are treated as glitches.
pub const PEAK_ACCEPT_RATIO: f64 = 1.5;
/// With an arc fault active, only extrema beyond ±1.8× amplitude are recorded.
pub const ARC_PEAK_ACCEPT_RATIO: f64 = 1.8;
/// RMS estimates outside `[0.5, 1.5] × nominal` never reach the extrema.
pub const RMS_MIN_RATIO: f64 = 0.5;
pub const RMS_MAX_RATIO: f64 = 1.5;
/// Floor of the heuristic RMS estimate, relative to nominal.
pub const RMS_FLOOR_RATIO: f64 = 0.3;

/// Minimum wall-clock spacing of transient samples (~one 60 Hz frame).
pub const DEFAULT_TRANSIENT_INTERVAL: Duration = Duration::from_millis(16);
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Heuristic RMS: nominal `A/√2` plus per-fault adjustments, floored at 30 %.
///
/// Not an integral over samples; fault contributions are fixed fractions of nominal.
pub fn stable_rms<'a>(
    params: &SimulationParameters,
    faults: impl IntoIterator<Item = &'a Fault>,
) -> f64 {
    let nominal = params.nominal_rms();
    let adjustment: f64 = faults
        .into_iter()
        .map(|fault| {
            let factor = match fault.fault_type {
                FaultType::NeutralLoss => 0.5,
                FaultType::PhaseImbalance => -0.2,
                FaultType::HarmonicDistortion => 0.1,
                ft if ft.is_motor_start() => -0.3,
                _ => 0.05,
            };
            factor * fault.intensity * nominal
        })
        .sum();
    (nominal + adjustment).max(RMS_FLOOR_RATIO * nominal)
}

#[derive(Debug, Clone)]
pub struct StatisticsTracker {
    stats: VoltageStatistics,
    history: VecDeque<TransientSample>,
    capacity: usize,
    interval: Duration,
    last_sample_wall: Option<Duration>,
}

impl StatisticsTracker {
    pub fn new(params: &SimulationParameters, capacity: usize, interval: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            stats: VoltageStatistics::nominal(params, 0.0),
            history: VecDeque::with_capacity(capacity),
            capacity,
            interval,
            last_sample_wall: None,
        }
    }

    /// Back to amplitude-derived nominal values, recorded at `now`.
    pub fn reset(&mut self, params: &SimulationParameters, now: f64) {
        self.stats = VoltageStatistics::nominal(params, now);
    }

    /// Drop the transient history as well as the extrema.
    pub fn clear(&mut self, params: &SimulationParameters) {
        self.reset(params, 0.0);
        self.history.clear();
        self.last_sample_wall = None;
    }

    /// Fold in one tick. Returns the transient sample if one was appended.
    ///
    /// Only faults still running at `sim_time` count; ones that ran out during this
    /// step are still registered until the next maintenance pass. `l2` is `None`
    /// when the second leg is not modelled.
    pub fn record(
        &mut self,
        params: &SimulationParameters,
        faults: &FaultRegistry,
        sim_time: f64,
        l1: f64,
        l2: Option<f64>,
        wall: Duration,
    ) -> Option<TransientSample> {
        let active = || faults.iter().filter(move |f| !f.is_expired(sim_time));

        let arcing = active().any(|f| f.fault_type.is_arc());
        self.track_peaks(params.amplitude_v, arcing, sim_time, l1, l2);

        let rms = stable_rms(params, active());
        self.track_rms(params, sim_time, rms);

        let due = match self.last_sample_wall {
            Some(last) => wall.saturating_sub(last) >= self.interval,
            None => true,
        };
        if !due {
            return None;
        }
        self.last_sample_wall = Some(wall);

        let sample = TransientSample {
            simulated_time: sim_time,
            rms_estimate: rms,
            peak_magnitude_l1: l1.abs(),
            peak_magnitude_l2: l2.map_or(0.0, f64::abs),
            active_fault_count: active().count(),
            wall_clock_ms: wall.as_secs_f64() * 1000.0,
        };
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(sample);
        debug!("transient sample t={sim_time:.4}s rms={rms:.1}V ({:?})", sample.classify());
        Some(sample)
    }

    fn track_peaks(&mut self, amp: f64, arcing: bool, sim_time: f64, l1: f64, l2: Option<f64>) {
        let high = l2.map_or(l1, |v| l1.max(v));
        let low = l2.map_or(l1, |v| l1.min(v));

        let (accept_high, accept_low) = if arcing {
            (high > ARC_PEAK_ACCEPT_RATIO * amp, low < -ARC_PEAK_ACCEPT_RATIO * amp)
        } else {
            (high <= PEAK_ACCEPT_RATIO * amp, low >= -PEAK_ACCEPT_RATIO * amp)
        };

        if accept_high && high > self.stats.peak_high {
            self.stats.peak_high = high;
            self.stats.peak_high_time = sim_time;
        }
        if accept_low && low < self.stats.peak_low {
            self.stats.peak_low = low;
            self.stats.peak_low_time = sim_time;
        }
    }

    fn track_rms(&mut self, params: &SimulationParameters, sim_time: f64, rms: f64) {
        let nominal = params.nominal_rms();
        if rms < RMS_MIN_RATIO * nominal || rms > RMS_MAX_RATIO * nominal {
            return;
        }
        if rms > self.stats.max_rms {
            self.stats.max_rms = rms;
            self.stats.max_rms_time = sim_time;
        }
        if rms < self.stats.min_rms {
            self.stats.min_rms = rms;
            self.stats.min_rms_time = sim_time;
        }
    }

    pub fn snapshot(&self) -> VoltageStatistics {
        self.stats
    }

    pub fn latest(&self) -> Option<&TransientSample> {
        self.history.back()
    }

    /// Samples within `timebase_ms` of the newest one, oldest first.
    pub fn history(&self, timebase_ms: f64) -> impl Iterator<Item = &TransientSample> {
        let newest = self.history.back().map_or(0.0, |s| s.wall_clock_ms);
        let cutoff = newest - timebase_ms;
        self.history.iter().filter(move |s| s.wall_clock_ms >= cutoff)
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mains_types::TransientEvent;

    fn tracker(params: &SimulationParameters) -> StatisticsTracker {
        StatisticsTracker::new(params, 4, DEFAULT_TRANSIENT_INTERVAL)
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn stable_rms_is_nominal_without_faults() {
        let params = SimulationParameters::default();
        let rms = stable_rms(&params, std::iter::empty());
        assert!((rms - 120.208).abs() < 1e-3);
    }

    #[test]
    fn stable_rms_applies_fault_adjustments() {
        let params = SimulationParameters::default();
        let nominal = params.nominal_rms();
        let mut faults = FaultRegistry::new(1.0);
        faults.trigger(FaultType::NeutralLoss, 0.0);
        faults.trigger(FaultType::GroundFault, 0.0);
        let rms = stable_rms(&params, faults.iter());
        assert!((rms - nominal * 1.55).abs() < 1e-9);
    }

    #[test]
    fn stable_rms_is_floored() {
        let params = SimulationParameters::default();
        let mut faults = FaultRegistry::new(1.0);
        for _ in 0..5 {
            faults.trigger(FaultType::MotorStart240V, 0.0);
        }
        let rms = stable_rms(&params, faults.iter());
        assert!((rms - 0.3 * params.nominal_rms()).abs() < 1e-9);
    }

    #[test]
    fn peaks_reject_outliers_without_arcs() {
        let params = SimulationParameters::default();
        let faults = FaultRegistry::default();
        let mut t = tracker(&params);
        t.record(&params, &faults, 1.0, 200.0, Some(-200.0), ms(0));
        assert_eq!(t.snapshot().peak_high, 200.0);
        assert_eq!(t.snapshot().peak_high_time, 1.0);
        // 300 V > 1.5 × 170 V
        t.record(&params, &faults, 2.0, 300.0, Some(-300.0), ms(20));
        assert_eq!(t.snapshot().peak_high, 200.0);
        assert_eq!(t.snapshot().peak_low, -200.0);
    }

    #[test]
    fn arc_faults_need_extreme_peaks() {
        let params = SimulationParameters::default();
        let mut faults = FaultRegistry::default();
        faults.trigger(FaultType::ArcFault240V, 0.0);
        let mut t = tracker(&params);
        t.record(&params, &faults, 0.1, 250.0, Some(-250.0), ms(0));
        assert_eq!(t.snapshot().peak_high, 170.0);
        // 1.8 × 170 = 306
        t.record(&params, &faults, 0.2, 310.0, Some(-310.0), ms(20));
        assert_eq!(t.snapshot().peak_high, 310.0);
        assert_eq!(t.snapshot().peak_low, -310.0);
    }

    #[test]
    fn rms_extrema_stay_in_band() {
        let params = SimulationParameters::default();
        let nominal = params.nominal_rms();
        let mut faults = FaultRegistry::new(1.0);
        for _ in 0..4 {
            faults.trigger(FaultType::MotorStartL1, 0.0);
        }
        let mut t = tracker(&params);
        t.record(&params, &faults, 0.1, 0.0, Some(0.0), ms(0));
        assert_eq!(t.snapshot().min_rms, nominal);

        faults.clear();
        faults.trigger(FaultType::MotorStartL1, 0.0);
        t.record(&params, &faults, 0.2, 0.0, Some(0.0), ms(20));
        assert!((t.snapshot().min_rms - 0.7 * nominal).abs() < 1e-9);
        assert_eq!(t.snapshot().min_rms_time, 0.2);
    }

    #[test]
    fn history_is_rate_limited_and_bounded() {
        let params = SimulationParameters::default();
        let faults = FaultRegistry::default();
        let mut t = tracker(&params);
        assert!(t.record(&params, &faults, 0.0, 0.0, Some(0.0), ms(0)).is_some());
        assert!(t.record(&params, &faults, 0.0, 0.0, Some(0.0), ms(10)).is_none());
        assert!(t.record(&params, &faults, 0.0, 0.0, Some(0.0), ms(16)).is_some());
        for i in 0..10 {
            t.record(&params, &faults, 0.0, 0.0, Some(0.0), ms(100 + i * 20));
        }
        assert_eq!(t.history_len(), 4);
        assert_eq!(t.latest().map(|s| s.wall_clock_ms), Some(280.0));
        assert_eq!(t.history(40.0).count(), 3);
    }

    #[test]
    fn neutral_loss_sample_classifies_as_swell() {
        let params = SimulationParameters::default();
        let mut faults = FaultRegistry::new(0.5);
        faults.trigger(FaultType::NeutralLoss, 0.0);
        let mut t = tracker(&params);
        let sample = t.record(&params, &faults, 0.1, 0.0, Some(0.0), ms(0)).unwrap();
        assert_eq!(sample.active_fault_count, 1);
        assert_eq!(sample.classify(), TransientEvent::Swell);
    }

    #[test]
    fn faults_that_ran_out_this_step_no_longer_count() {
        let params = SimulationParameters::default();
        let nominal = params.nominal_rms();
        let mut faults = FaultRegistry::new(1.0);
        faults.trigger(FaultType::MotorStart240V, 0.0);
        let mut t = tracker(&params);

        // 0.6 s is past the 0.5 s inrush, but nothing has pruned it yet
        let sample = t.record(&params, &faults, 0.6, 0.0, Some(0.0), ms(0)).unwrap();
        assert_eq!(faults.len(), 1);
        assert!((sample.rms_estimate - nominal).abs() < 1e-9);
        assert_eq!(sample.active_fault_count, 0);
        assert_eq!(sample.classify(), TransientEvent::Normal);
        assert_eq!(t.snapshot().min_rms, nominal);
        assert_eq!(t.snapshot().min_rms_time, 0.0);
    }

    #[test]
    fn expired_arc_does_not_gate_peaks() {
        let params = SimulationParameters::default();
        let mut faults = FaultRegistry::default();
        faults.trigger(FaultType::ArcFaultL1, 0.0);
        let mut t = tracker(&params);
        // arc lasts 0.3 s; at 1.0 s the normal ±1.5× regime applies again
        t.record(&params, &faults, 1.0, 200.0, Some(-200.0), ms(0));
        assert_eq!(t.snapshot().peak_high, 200.0);
        assert_eq!(t.snapshot().peak_low, -200.0);
    }

    #[test]
    fn single_phase_ignores_the_second_leg() {
        let params = SimulationParameters { split_phase: false, ..Default::default() };
        let faults = FaultRegistry::default();
        let mut t = tracker(&params);
        let sample = t.record(&params, &faults, 0.5, 180.0, None, ms(0)).unwrap();
        assert_eq!(t.snapshot().peak_high, 180.0);
        assert_eq!(t.snapshot().peak_low, -170.0);
        assert_eq!(sample.peak_magnitude_l2, 0.0);
    }
}
