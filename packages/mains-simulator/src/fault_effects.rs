//! fault_effects.rs — Voltage perturbation per fault type
//!
//! Each fault type maps `elapsed = t - start_time` to an additive perturbation in
//! volts on the leg(s) it affects. Shapes are stylised teaching waveforms, not
//! circuit-accurate transients:
//! 1. Inrush: exponentially damped tones, optionally with a damped sag
//! 2. Switching / arcing: short high-frequency bursts, arcs with bounded random amplitude
//! 3. Wiring faults: constant shifts on one or both legs
//! 4. Non-linear faults: harmonics, half-cycle clamping, saturation spikes
//!
//! Noise comes from the `Rng` handed in by the caller, so a seeded generator
//! replays a run exactly.

use std::f64::consts::PI;

use rand::Rng;
use rand_distr::{Distribution, Uniform};

use mains_types::{Fault, FaultType, SimulationParameters};

/// Half-width of the random factor applied to arc bursts.
pub const ARC_NOISE_BOUND: f64 = 0.5;
/// Feedback oscillation frequency is drawn from `[MIN, MAX)` on every evaluation.
pub const FEEDBACK_FREQ_MIN_HZ: f64 = 800.0;
pub const FEEDBACK_FREQ_MAX_HZ: f64 = 1000.0;

/// Switching bursts only ring for this long, whatever the fault duration.
const SWITCH_BURST_S: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct FaultEffectModel {
    arc_noise: Uniform<f64>,
    feedback_freq: Uniform<f64>,
}

impl Default for FaultEffectModel {
    fn default() -> Self {
        Self {
            arc_noise: Uniform::new(-ARC_NOISE_BOUND, ARC_NOISE_BOUND),
            feedback_freq: Uniform::new(FEEDBACK_FREQ_MIN_HZ, FEEDBACK_FREQ_MAX_HZ),
        }
    }
}

impl FaultEffectModel {
    /// Perturbation of `fault` at simulated time `t` on the trace at `phase_offset`.
    ///
    /// `base` is the fault-free signal (sinusoid plus effective DC offset) at the
    /// same point; only transformer saturation reads it. Returns 0 before the fault
    /// starts, after a non-persistent fault has run out, and on unaffected legs.
    pub fn effect<R: Rng + ?Sized>(
        &self,
        params: &SimulationParameters,
        t: f64,
        phase_offset: f64,
        base: f64,
        fault: &Fault,
        rng: &mut R,
    ) -> f64 {
        let elapsed = fault.elapsed(t);
        if elapsed < 0.0 || fault.is_expired(t) {
            return 0.0;
        }
        if !fault.fault_type.affected_legs().applies_to(phase_offset) {
            return 0.0;
        }

        let amp = params.amplitude_v;
        let k = amp * fault.intensity;

        match fault.fault_type {
            FaultType::MotorStartL1 | FaultType::MotorStartL2 => {
                k * damping(elapsed, 5.0) * tone(180.0, elapsed)
            }
            FaultType::MotorStart240V | FaultType::AcCompressor => {
                let d = damping(elapsed, 3.0);
                let sag = -0.3 * k * d;
                let ring = 0.5 * k * d * tone(120.0, elapsed);
                sag + ring
            }
            FaultType::ResistiveSwitchL1 | FaultType::ResistiveSwitchL2 => {
                if elapsed < SWITCH_BURST_S {
                    0.3 * k * damping(elapsed, 40.0) * tone(1000.0, elapsed)
                } else {
                    0.0
                }
            }
            FaultType::ArcFaultL1 | FaultType::ArcFaultL2 => {
                0.4 * k * self.arc_noise.sample(rng) * tone(500.0, elapsed)
            }
            FaultType::ArcFault240V => 0.3 * k * self.arc_noise.sample(rng) * tone(300.0, elapsed),
            FaultType::Imbalanced240V => -0.5 * k,
            FaultType::NeutralLoss => 0.6 * k,
            FaultType::PhaseImbalance => -0.3 * k,
            FaultType::GroundFault => 0.2 * k,
            FaultType::HarmonicDistortion => {
                let w = params.angular_frequency();
                let third = (3.0 * w * t + phase_offset).sin();
                let fifth = (5.0 * w * t + phase_offset).sin();
                0.3 * k * (0.6 * third + 0.4 * fifth)
            }
            FaultType::MosfetFailure => {
                // ideal sinusoid, offset excluded
                let ideal = (params.angular_frequency() * t + phase_offset).sin();
                let bias = 0.5 * k;
                if ideal < 0.0 { bias + 0.8 * k } else { bias }
            }
            FaultType::TransformerSaturation => {
                let saturation = amp * (1.0 - 0.3 * fault.intensity);
                if base.abs() > saturation {
                    0.8 * k * base.signum()
                } else {
                    0.0
                }
            }
            FaultType::DcInjection => 0.4 * k,
            FaultType::FeedbackOscillation => {
                let freq = self.feedback_freq.sample(rng);
                0.3 * k * tone(freq, elapsed) * damping(elapsed, 2.0)
            }
        }
    }
}

fn damping(elapsed: f64, rate: f64) -> f64 {
    (-elapsed * rate).exp()
}

fn tone(freq_hz: f64, elapsed: f64) -> f64 {
    (2.0 * PI * freq_hz * elapsed).sin()
}
