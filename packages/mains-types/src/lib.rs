//! # mains-types
//!
//! Shared data model for the split-phase mains waveform simulator.
//!
//! These types are used by:
//! - `mains-simulator`: the synthesis, trigger, sampling and statistics engine
//! - external renderers: everything here is serde-serializable so a UI can consume
//!   telemetry frames and send control commands as JSON
//!
//! ## Conventions
//!
//! - **Time**: simulated seconds (`f64`) unless a field name says otherwise
//! - **Voltage**: volts, instantaneous unless named `rms`
//! - **Legs**: L1 is the reference phase (offset 0), L2 is L1 shifted by π

use std::f64::consts::{PI, SQRT_2};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lower bound applied to the signal frequency before any division by it.
pub const MIN_FREQUENCY_HZ: f64 = 0.01;
/// Lower bound applied to the peak amplitude before any division by it.
pub const MIN_AMPLITUDE_V: f64 = 0.01;

/// Fixed RMS reference used for sag/swell classification (North American service).
pub const NOMINAL_RMS_REFERENCE_V: f64 = 120.0;
/// Below `SAG_RATIO × reference` a transient sample is a sag.
pub const SAG_RATIO: f64 = 0.9;
/// Above `SWELL_RATIO × reference` a transient sample is a swell.
pub const SWELL_RATIO: f64 = 1.1;

// ── Legs ──────────────────────────────────────────────────────────────────────

/// One hot leg of a split-phase service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Leg {
    L1,
    L2,
}

impl Leg {
    const OFFSET_TOLERANCE: f64 = 1e-9;

    /// Phase offset of this leg in radians.
    pub fn offset(self) -> f64 {
        match self {
            Leg::L1 => 0.0,
            Leg::L2 => PI,
        }
    }

    /// Classify a raw phase offset. Offsets other than 0 and π belong to no leg.
    pub fn from_offset(offset: f64) -> Option<Self> {
        if offset.abs() < Self::OFFSET_TOLERANCE {
            Some(Leg::L1)
        } else if (offset - PI).abs() < Self::OFFSET_TOLERANCE {
            Some(Leg::L2)
        } else {
            None
        }
    }
}

/// Which legs a fault type perturbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffectedLegs {
    L1,
    L2,
    Both,
}

impl AffectedLegs {
    /// Whether a sample evaluated at `phase_offset` is perturbed.
    /// Two-leg faults apply to any offset, including ones that are neither leg.
    pub fn applies_to(self, phase_offset: f64) -> bool {
        match self {
            AffectedLegs::Both => true,
            AffectedLegs::L1 => Leg::from_offset(phase_offset) == Some(Leg::L1),
            AffectedLegs::L2 => Leg::from_offset(phase_offset) == Some(Leg::L2),
        }
    }
}

// ── Simulation parameters ─────────────────────────────────────────────────────

/// Signal configuration, replaced wholesale by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationParameters {
    /// Mains frequency (Hz, > 0)
    pub frequency_hz: f64,
    /// Peak voltage of each leg (V, > 0)
    pub amplitude_v: f64,
    /// DC offset (V). Only has an effect while the chassis is floating.
    pub dc_offset_v: f64,
    /// Chassis bonded to ground; suppresses `dc_offset_v`
    pub chassis_grounded: bool,
    /// Model the second leg (L2, 180°)
    pub split_phase: bool,
}

impl Default for SimulationParameters {
    /// 120 V split-phase North American service.
    fn default() -> Self {
        Self {
            frequency_hz: 60.0,
            amplitude_v: 170.0,
            dc_offset_v: 0.0,
            chassis_grounded: true,
            split_phase: true,
        }
    }
}

impl SimulationParameters {
    /// Copy with frequency and amplitude floored to strictly positive values.
    /// Non-finite inputs fall back to the floor as well.
    pub fn sanitized(mut self) -> Self {
        self.frequency_hz = floor_positive(self.frequency_hz, MIN_FREQUENCY_HZ);
        self.amplitude_v = floor_positive(self.amplitude_v, MIN_AMPLITUDE_V);
        if !self.dc_offset_v.is_finite() {
            self.dc_offset_v = 0.0;
        }
        self
    }

    /// DC offset actually present on the signal.
    pub fn effective_offset(&self) -> f64 {
        if self.chassis_grounded {
            0.0
        } else {
            self.dc_offset_v
        }
    }

    pub fn period(&self) -> f64 {
        1.0 / self.frequency_hz
    }

    pub fn angular_frequency(&self) -> f64 {
        2.0 * PI * self.frequency_hz
    }

    /// amplitude / √2
    pub fn nominal_rms(&self) -> f64 {
        self.amplitude_v / SQRT_2
    }
}

fn floor_positive(value: f64, floor: f64) -> f64 {
    if value.is_finite() {
        value.max(floor)
    } else {
        floor
    }
}

// ── Fault catalogue ───────────────────────────────────────────────────────────

pub type FaultId = u64;

/// Every injectable fault. Unknown names never reach the engine: parsing rejects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultType {
    #[serde(rename = "motor-start-l1")]
    MotorStartL1,
    #[serde(rename = "motor-start-l2")]
    MotorStartL2,
    #[serde(rename = "motor-start-240v")]
    MotorStart240V,
    #[serde(rename = "ac-compressor")]
    AcCompressor,
    #[serde(rename = "resistive-switch-l1")]
    ResistiveSwitchL1,
    #[serde(rename = "resistive-switch-l2")]
    ResistiveSwitchL2,
    #[serde(rename = "arc-fault-l1")]
    ArcFaultL1,
    #[serde(rename = "arc-fault-l2")]
    ArcFaultL2,
    #[serde(rename = "arc-fault-240v")]
    ArcFault240V,
    #[serde(rename = "imbalanced-240v")]
    Imbalanced240V,
    #[serde(rename = "neutral-loss")]
    NeutralLoss,
    #[serde(rename = "phase-imbalance")]
    PhaseImbalance,
    #[serde(rename = "ground-fault")]
    GroundFault,
    #[serde(rename = "harmonic-distortion")]
    HarmonicDistortion,
    #[serde(rename = "mosfet-failure")]
    MosfetFailure,
    #[serde(rename = "transformer-saturation")]
    TransformerSaturation,
    #[serde(rename = "dc-injection")]
    DcInjection,
    #[serde(rename = "feedback-oscillation")]
    FeedbackOscillation,
}

/// How alarming a fault (or derived alert) is for the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Danger,
}

impl FaultType {
    pub const ALL: [FaultType; 18] = [
        FaultType::MotorStartL1,
        FaultType::MotorStartL2,
        FaultType::MotorStart240V,
        FaultType::AcCompressor,
        FaultType::ResistiveSwitchL1,
        FaultType::ResistiveSwitchL2,
        FaultType::ArcFaultL1,
        FaultType::ArcFaultL2,
        FaultType::ArcFault240V,
        FaultType::Imbalanced240V,
        FaultType::NeutralLoss,
        FaultType::PhaseImbalance,
        FaultType::GroundFault,
        FaultType::HarmonicDistortion,
        FaultType::MosfetFailure,
        FaultType::TransformerSaturation,
        FaultType::DcInjection,
        FaultType::FeedbackOscillation,
    ];

    /// Kebab-case wire name, e.g. `"neutral-loss"`.
    pub fn as_str(self) -> &'static str {
        match self {
            FaultType::MotorStartL1 => "motor-start-l1",
            FaultType::MotorStartL2 => "motor-start-l2",
            FaultType::MotorStart240V => "motor-start-240v",
            FaultType::AcCompressor => "ac-compressor",
            FaultType::ResistiveSwitchL1 => "resistive-switch-l1",
            FaultType::ResistiveSwitchL2 => "resistive-switch-l2",
            FaultType::ArcFaultL1 => "arc-fault-l1",
            FaultType::ArcFaultL2 => "arc-fault-l2",
            FaultType::ArcFault240V => "arc-fault-240v",
            FaultType::Imbalanced240V => "imbalanced-240v",
            FaultType::NeutralLoss => "neutral-loss",
            FaultType::PhaseImbalance => "phase-imbalance",
            FaultType::GroundFault => "ground-fault",
            FaultType::HarmonicDistortion => "harmonic-distortion",
            FaultType::MosfetFailure => "mosfet-failure",
            FaultType::TransformerSaturation => "transformer-saturation",
            FaultType::DcInjection => "dc-injection",
            FaultType::FeedbackOscillation => "feedback-oscillation",
        }
    }

    /// Short label for fault lists.
    pub fn display_name(self) -> &'static str {
        match self {
            FaultType::MotorStartL1 => "Motor Start (L1)",
            FaultType::MotorStartL2 => "Motor Start (L2)",
            FaultType::MotorStart240V => "Heavy Motor (240V)",
            FaultType::AcCompressor => "A/C Compressor",
            FaultType::ResistiveSwitchL1 => "Switch (L1)",
            FaultType::ResistiveSwitchL2 => "Switch (L2)",
            FaultType::ArcFaultL1 => "Arc Fault (L1)",
            FaultType::ArcFaultL2 => "Arc Fault (L2)",
            FaultType::ArcFault240V => "Arc Fault (240V)",
            FaultType::Imbalanced240V => "Imbalanced 240V",
            FaultType::NeutralLoss => "NEUTRAL LOSS",
            FaultType::PhaseImbalance => "Phase Imbalance",
            FaultType::GroundFault => "Ground Fault",
            FaultType::HarmonicDistortion => "Harmonics",
            FaultType::MosfetFailure => "MOSFET Failure",
            FaultType::TransformerSaturation => "Transformer Sat.",
            FaultType::DcInjection => "DC Injection",
            FaultType::FeedbackOscillation => "Feedback Osc.",
        }
    }

    /// Operator-facing alert text.
    pub fn description(self) -> &'static str {
        match self {
            FaultType::MotorStartL1 | FaultType::MotorStartL2 => {
                "Motor startup transient - High inrush current detected"
            }
            FaultType::MotorStart240V | FaultType::AcCompressor => {
                "Heavy 240V motor startup - Voltage sag on both phases"
            }
            FaultType::ResistiveSwitchL1 | FaultType::ResistiveSwitchL2 => {
                "Switching transient - Brief high-frequency burst"
            }
            FaultType::ArcFaultL1 | FaultType::ArcFaultL2 | FaultType::ArcFault240V => {
                "ARC FAULT DETECTED - Fire hazard present!"
            }
            FaultType::NeutralLoss => "NEUTRAL LOSS - EXTREME DANGER! 240V on 120V circuits!",
            FaultType::GroundFault => "Ground fault detected - Protective device should trip",
            FaultType::PhaseImbalance | FaultType::Imbalanced240V => {
                "Phase imbalance detected - Uneven loading"
            }
            FaultType::HarmonicDistortion => {
                "Harmonic distortion - Non-linear loads affecting power quality"
            }
            FaultType::MosfetFailure => "MOSFET failure - Inverter malfunction detected",
            FaultType::TransformerSaturation => "Transformer saturation - Core overflux condition",
            FaultType::DcInjection => "DC injection detected - Transformer heating risk",
            FaultType::FeedbackOscillation => "Control feedback oscillation - System instability",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            FaultType::ArcFaultL1
            | FaultType::ArcFaultL2
            | FaultType::ArcFault240V
            | FaultType::NeutralLoss
            | FaultType::GroundFault
            | FaultType::MosfetFailure => Severity::Danger,
            _ => Severity::Warning,
        }
    }

    /// Natural lifetime in simulated seconds. Meaningless for persistent faults,
    /// which report the 10 s default.
    pub fn default_duration(self) -> f64 {
        match self {
            FaultType::MotorStartL1
            | FaultType::MotorStartL2
            | FaultType::MotorStart240V
            | FaultType::AcCompressor => 0.5,
            FaultType::ResistiveSwitchL1 | FaultType::ResistiveSwitchL2 => 0.05,
            FaultType::ArcFaultL1 | FaultType::ArcFaultL2 | FaultType::ArcFault240V => 0.3,
            FaultType::GroundFault => 2.0,
            FaultType::HarmonicDistortion => 5.0,
            FaultType::FeedbackOscillation => 0.8,
            _ => 10.0,
        }
    }

    /// Persistent faults never expire and are limited to one instance per type.
    pub fn is_persistent(self) -> bool {
        matches!(
            self,
            FaultType::NeutralLoss
                | FaultType::PhaseImbalance
                | FaultType::MosfetFailure
                | FaultType::TransformerSaturation
                | FaultType::DcInjection
        )
    }

    pub fn affected_legs(self) -> AffectedLegs {
        match self {
            FaultType::MotorStartL1
            | FaultType::ResistiveSwitchL1
            | FaultType::ArcFaultL1
            | FaultType::MosfetFailure => AffectedLegs::L1,
            FaultType::MotorStartL2
            | FaultType::ResistiveSwitchL2
            | FaultType::ArcFaultL2
            | FaultType::Imbalanced240V
            | FaultType::PhaseImbalance => AffectedLegs::L2,
            _ => AffectedLegs::Both,
        }
    }

    /// Arc faults produce noise spikes that must not redefine recorded peaks.
    pub fn is_arc(self) -> bool {
        matches!(
            self,
            FaultType::ArcFaultL1 | FaultType::ArcFaultL2 | FaultType::ArcFault240V
        )
    }

    /// Motor and compressor inrush events.
    pub fn is_motor_start(self) -> bool {
        matches!(
            self,
            FaultType::MotorStartL1
                | FaultType::MotorStartL2
                | FaultType::MotorStart240V
                | FaultType::AcCompressor
        )
    }
}

impl fmt::Display for FaultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown fault type `{0}`")]
pub struct ParseFaultTypeError(pub String);

impl FromStr for FaultType {
    type Err = ParseFaultTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        FaultType::ALL
            .into_iter()
            .find(|ft| ft.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| ParseFaultTypeError(name.to_string()))
    }
}

// ── Fault instance ────────────────────────────────────────────────────────────

/// One active fault. Created by the registry, removed by clear or natural expiry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fault {
    pub id: FaultId,
    pub fault_type: FaultType,
    /// Simulated time at creation
    pub start_time: f64,
    /// Lifetime in simulated seconds (ignored when persistent)
    pub duration: f64,
    /// 0–1 scale applied to every magnitude of the effect
    pub intensity: f64,
    pub persistent: bool,
}

impl Fault {
    pub fn elapsed(&self, t: f64) -> f64 {
        t - self.start_time
    }

    /// `elapsed > duration` for a non-persistent fault.
    pub fn is_expired(&self, t: f64) -> bool {
        !self.persistent && self.elapsed(t) > self.duration
    }

    pub fn status(&self, t: f64) -> FaultStatus {
        FaultStatus {
            id: self.id,
            fault_type: self.fault_type,
            display_name: self.fault_type.display_name(),
            severity: self.fault_type.severity(),
            elapsed: self.elapsed(t).max(0.0),
            duration: if self.persistent {
                None
            } else {
                Some(self.duration)
            },
            intensity_pct: (self.intensity * 100.0).round() as u8,
        }
    }
}

/// Display row for an active fault list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaultStatus {
    pub id: FaultId,
    pub fault_type: FaultType,
    pub display_name: &'static str,
    pub severity: Severity,
    pub elapsed: f64,
    /// `None` means persistent
    pub duration: Option<f64>,
    pub intensity_pct: u8,
}

impl fmt::Display for FaultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.duration {
            Some(d) => write!(
                f,
                "{} {:.1}s / {:.1}s | Intensity: {}%",
                self.display_name, self.elapsed, d, self.intensity_pct
            ),
            None => write!(
                f,
                "{} PERSISTENT | Intensity: {}%",
                self.display_name, self.intensity_pct
            ),
        }
    }
}

// ── Trigger configuration ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    None,
    Auto,
    Manual,
}

/// Oscilloscope trigger setup. Exactly one mode is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum TriggerConfig {
    /// Free-run: the window trails the reference time
    None,
    /// Rising-edge level trigger
    Auto { level_v: f64 },
    /// Fixed trigger voltage set by hand
    Manual { voltage_v: f64 },
}

impl Default for TriggerConfig {
    fn default() -> Self {
        TriggerConfig::Auto { level_v: 0.0 }
    }
}

impl TriggerConfig {
    /// Build from a mode and optional level; a missing level means 0 V.
    pub fn from_mode(mode: TriggerMode, level: Option<f64>) -> Self {
        let level = level.filter(|v| v.is_finite()).unwrap_or(0.0);
        match mode {
            TriggerMode::None => TriggerConfig::None,
            TriggerMode::Auto => TriggerConfig::Auto { level_v: level },
            TriggerMode::Manual => TriggerConfig::Manual { voltage_v: level },
        }
    }

    pub fn mode(&self) -> TriggerMode {
        match self {
            TriggerConfig::None => TriggerMode::None,
            TriggerConfig::Auto { .. } => TriggerMode::Auto,
            TriggerConfig::Manual { .. } => TriggerMode::Manual,
        }
    }

    /// Voltage to lock onto, `None` in free-run.
    pub fn target_voltage(&self) -> Option<f64> {
        match *self {
            TriggerConfig::None => None,
            TriggerConfig::Auto { level_v } => Some(level_v),
            TriggerConfig::Manual { voltage_v } => Some(voltage_v),
        }
    }
}

// ── Statistics ────────────────────────────────────────────────────────────────

/// Running extrema, each paired with the simulated time it was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoltageStatistics {
    pub peak_high: f64,
    pub peak_high_time: f64,
    pub peak_low: f64,
    pub peak_low_time: f64,
    pub max_rms: f64,
    pub max_rms_time: f64,
    pub min_rms: f64,
    pub min_rms_time: f64,
}

impl VoltageStatistics {
    /// Amplitude-derived starting point: ±amplitude peaks, amplitude/√2 RMS.
    pub fn nominal(params: &SimulationParameters, t: f64) -> Self {
        let rms = params.nominal_rms();
        Self {
            peak_high: params.amplitude_v,
            peak_high_time: t,
            peak_low: -params.amplitude_v,
            peak_low_time: t,
            max_rms: rms,
            max_rms_time: t,
            min_rms: rms,
            min_rms_time: t,
        }
    }

    pub fn peak_to_peak(&self) -> f64 {
        self.peak_high - self.peak_low
    }
}

/// Power-quality classification of one transient sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransientEvent {
    Normal,
    Sag,
    Swell,
}

/// One point of the rolling measurement history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransientSample {
    pub simulated_time: f64,
    pub rms_estimate: f64,
    pub peak_magnitude_l1: f64,
    pub peak_magnitude_l2: f64,
    pub active_fault_count: usize,
    /// Wall-clock time of the tick that produced this sample (ms since driver start)
    pub wall_clock_ms: f64,
}

impl TransientSample {
    /// Sag/swell against the fixed reference, not the live nominal.
    pub fn classify(&self) -> TransientEvent {
        if self.rms_estimate < SAG_RATIO * NOMINAL_RMS_REFERENCE_V {
            TransientEvent::Sag
        } else if self.rms_estimate > SWELL_RATIO * NOMINAL_RMS_REFERENCE_V {
            TransientEvent::Swell
        } else {
            TransientEvent::Normal
        }
    }
}

// ── Presets & standards ───────────────────────────────────────────────────────

/// Playback speed shortcuts from the control panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedPreset {
    UltraSlow,
    Slow,
    Normal,
}

impl SpeedPreset {
    pub fn multiplier(self) -> f64 {
        match self {
            SpeedPreset::UltraSlow => 0.01,
            SpeedPreset::Slow => 0.1,
            SpeedPreset::Normal => 1.0,
        }
    }
}

/// Service standard recognised from the configured peak amplitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoltageStandard {
    /// 170 V peak, 120 V RMS split-phase
    NorthAmericanSplitPhase,
    /// 155 V peak, 110 V RMS single-phase
    SinglePhase110,
    /// 230 V peak setting
    SinglePhase230,
    Custom,
}

impl VoltageStandard {
    pub fn from_amplitude(amplitude_v: f64) -> Self {
        let matches = |nominal: f64| (amplitude_v - nominal).abs() < 0.5;
        if matches(170.0) {
            VoltageStandard::NorthAmericanSplitPhase
        } else if matches(155.0) {
            VoltageStandard::SinglePhase110
        } else if matches(230.0) {
            VoltageStandard::SinglePhase230
        } else {
            VoltageStandard::Custom
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            VoltageStandard::NorthAmericanSplitPhase => {
                "North American Standard (120V RMS Split-Phase)"
            }
            VoltageStandard::SinglePhase110 => "European Standard (110V RMS Single-Phase)",
            VoltageStandard::SinglePhase230 => "European Standard (230V RMS Single-Phase)",
            VoltageStandard::Custom => "Custom Voltage Level",
        }
    }
}
