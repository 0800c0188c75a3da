//! waveform.rs — Instantaneous voltage synthesis
//!
//! `value = A·sin(2πft + φ) + effective DC offset + Σ fault effects`.
//!
//! The synthesizer only borrows its inputs, so a whole frame (current trace, trail
//! frames, statistics sample) is evaluated against one frozen fault set. Calls may
//! use any `t`, in any order.

use rand::Rng;

use mains_types::SimulationParameters;

use crate::fault_effects::FaultEffectModel;
use crate::faults::FaultRegistry;

/// Ideal sinusoid without offset or faults.
pub fn ideal(params: &SimulationParameters, t: f64, phase_offset: f64) -> f64 {
    params.amplitude_v * (params.angular_frequency() * t + phase_offset).sin()
}

#[derive(Debug, Clone, Copy)]
pub struct WaveformSynthesizer<'a> {
    params: &'a SimulationParameters,
    faults: &'a FaultRegistry,
    effects: &'a FaultEffectModel,
}

impl<'a> WaveformSynthesizer<'a> {
    pub fn new(
        params: &'a SimulationParameters,
        faults: &'a FaultRegistry,
        effects: &'a FaultEffectModel,
    ) -> Self {
        Self { params, faults, effects }
    }

    /// Sinusoid plus the effective DC offset (zero while the chassis is bonded).
    pub fn base(&self, t: f64, phase_offset: f64) -> f64 {
        ideal(self.params, t, phase_offset) + self.params.effective_offset()
    }

    /// Instantaneous voltage at simulated time `t` on the trace at `phase_offset`.
    ///
    /// Fault effects are superposed: each one sees the same fault-free `base`.
    pub fn value<R: Rng + ?Sized>(&self, t: f64, phase_offset: f64, rng: &mut R) -> f64 {
        let base = self.base(t, phase_offset);
        let perturbation: f64 = self
            .faults
            .iter()
            .map(|fault| self.effects.effect(self.params, t, phase_offset, base, fault, &mut *rng))
            .sum();
        base + perturbation
    }
}
