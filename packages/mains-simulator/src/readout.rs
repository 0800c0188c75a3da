//! readout.rs — Derived measurement panel and safety alerts
//!
//! Nothing here is stored: every value is recomputed from the current parameters,
//! clock and fault set on request.

use std::fmt;

use serde::Serialize;

use mains_types::{FaultType, Severity, SimulationParameters, VoltageStandard};

use crate::faults::FaultRegistry;

/// |effective offset| above this puts the chassis at a dangerous potential.
pub const DANGEROUS_OFFSET_V: f64 = 30.0;
/// Floating chassis with more than this much DC offset gets a warning.
pub const FLOATING_OFFSET_WARNING_V: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GroundState {
    Bonded,
    Floating,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaveformReadout {
    pub peak_to_peak: f64,
    pub rms_voltage: f64,
    pub zero_crossing: f64,
    pub max_positive: f64,
    pub max_negative: f64,
    pub ground_state: GroundState,
    pub sim_time: f64,
    pub speed: f64,
    pub standard: VoltageStandard,
}

impl WaveformReadout {
    pub fn compute(params: &SimulationParameters, sim_time: f64, speed: f64) -> Self {
        let amp = params.amplitude_v;
        let offset = params.effective_offset();
        Self {
            peak_to_peak: 2.0 * amp,
            rms_voltage: params.nominal_rms(),
            zero_crossing: offset,
            max_positive: amp + offset,
            max_negative: -amp + offset,
            ground_state: if params.chassis_grounded {
                GroundState::Bonded
            } else {
                GroundState::Floating
            },
            sim_time,
            speed,
            standard: VoltageStandard::from_amplitude(amp),
        }
    }
}

impl fmt::Display for WaveformReadout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Vpp {:.1}V | RMS {:.1}V | zero {:.1}V | +{:.1}V / {:.1}V | {:?} | t={:.3}s @ {}x",
            self.peak_to_peak,
            self.rms_voltage,
            self.zero_crossing,
            self.max_positive,
            self.max_negative,
            self.ground_state,
            self.sim_time,
            self.speed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafetyAlert {
    pub severity: Severity,
    pub message: String,
    /// Set when the alert comes from an active fault
    pub fault: Option<FaultType>,
}

/// Offset alerts first, then one alert per active fault in registry order.
pub fn safety_alerts(params: &SimulationParameters, faults: &FaultRegistry) -> Vec<SafetyAlert> {
    let mut alerts = Vec::new();
    let offset = params.effective_offset();

    if offset.abs() > DANGEROUS_OFFSET_V {
        alerts.push(SafetyAlert {
            severity: Severity::Danger,
            message: format!("DANGER: {offset:.1}V DC offset on chassis - shock hazard!"),
            fault: None,
        });
    }
    if !params.chassis_grounded && params.dc_offset_v.abs() > FLOATING_OFFSET_WARNING_V {
        alerts.push(SafetyAlert {
            severity: Severity::Warning,
            message: "WARNING: Chassis not bonded to ground - DC offset present".to_string(),
            fault: None,
        });
    }

    alerts.extend(faults.iter().map(|fault| SafetyAlert {
        severity: fault.fault_type.severity(),
        message: fault.fault_type.description().to_string(),
        fault: Some(fault.fault_type),
    }));
    alerts
}
