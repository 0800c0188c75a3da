//! telemetry.rs — JSON-lines telemetry output
//!
//! One frame per `telemetry_every_ticks` ticks, written to stdout by the driver.
//! Write errors are logged but never stop the simulation.

use std::io::Write;

use serde::Serialize;
use tracing::{debug, warn};

use mains_types::{FaultStatus, Leg, TransientEvent, TransientSample, VoltageStatistics};

use crate::readout::{SafetyAlert, WaveformReadout};
use crate::session::Session;
use crate::trigger::TriggerMarker;

#[derive(Debug, Clone, Serialize)]
pub struct TransientReport {
    #[serde(flatten)]
    pub sample: TransientSample,
    pub event: TransientEvent,
}

/// Shape of the L1 sample buffer; the samples themselves stay in-process.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WindowSummary {
    pub window_start: f64,
    pub effective_time_step: f64,
    pub sample_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TelemetryFrame {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub tick: u64,
    pub sim_time: f64,
    pub speed: f64,
    pub playing: bool,
    pub l1: f64,
    /// Absent when split-phase is off
    pub l2: Option<f64>,
    pub readout: WaveformReadout,
    pub statistics: VoltageStatistics,
    pub faults: Vec<FaultStatus>,
    pub alerts: Vec<SafetyAlert>,
    pub transient: Option<TransientReport>,
    pub trigger: TriggerMarker,
    pub window: WindowSummary,
}

impl TelemetryFrame {
    pub fn capture(session: &mut Session, tick: u64) -> Self {
        let t = session.time();
        let l1 = session.value(t, Leg::L1.offset());
        let l2 = session
            .params()
            .split_phase
            .then(|| session.value(t, Leg::L2.offset()));
        let window = session.sample_window(t, Leg::L1.offset());

        Self {
            kind: "telemetry",
            tick,
            sim_time: t,
            speed: session.speed(),
            playing: session.is_playing(),
            l1,
            l2,
            readout: session.readout(),
            statistics: session.statistics_snapshot(),
            faults: session.fault_statuses(),
            alerts: session.safety_alerts(),
            transient: session.latest_transient().map(|sample| TransientReport {
                event: sample.classify(),
                sample,
            }),
            trigger: session.trigger_marker(t),
            window: WindowSummary {
                window_start: window.window_start,
                effective_time_step: window.effective_time_step,
                sample_count: window.len(),
            },
        }
    }
}

pub struct TelemetryWriter<W: Write> {
    out: W,
    frames: u64,
}

impl<W: Write> TelemetryWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, frames: 0 }
    }

    /// Serialize `frame` as one line. Returns false if it could not be written.
    pub fn write(&mut self, frame: &TelemetryFrame) -> bool {
        let result = serde_json::to_writer(&mut self.out, frame)
            .map_err(std::io::Error::from)
            .and_then(|()| self.out.write_all(b"\n"))
            .and_then(|()| self.out.flush());
        match result {
            Ok(()) => {
                self.frames += 1;
                debug!("telemetry frame {} written (tick {})", self.frames, frame.tick);
                true
            }
            Err(e) => {
                warn!("Telemetry write failed: {e}");
                false
            }
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionOptions;
    use mains_types::{FaultType, SimulationParameters};
    use std::time::Duration;

    fn session() -> Session {
        Session::new(
            SimulationParameters::default(),
            SessionOptions { seed: Some(9), ..Default::default() },
        )
    }

    #[test]
    fn frame_serializes_as_one_json_line() {
        let mut s = session();
        s.trigger_fault(FaultType::NeutralLoss);
        s.tick(Duration::ZERO);
        let frame = TelemetryFrame::capture(&mut s, 1);

        let mut writer = TelemetryWriter::new(Vec::new());
        assert!(writer.write(&frame));
        assert_eq!(writer.frames_written(), 1);
        let bytes = writer.into_inner();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.lines().count(), 1);

        let v: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(v["type"], "telemetry");
        assert_eq!(v["faults"][0]["fault_type"], "neutral-loss");
        assert_eq!(v["transient"]["event"], "swell");
        assert_eq!(v["window"]["sample_count"], 800);
        assert_eq!(v["readout"]["peak_to_peak"], 340.0);
    }

    #[test]
    fn single_phase_frame_has_no_l2() {
        let mut s = Session::new(
            SimulationParameters { split_phase: false, ..Default::default() },
            SessionOptions { seed: Some(9), ..Default::default() },
        );
        let frame = TelemetryFrame::capture(&mut s, 0);
        assert!(frame.l2.is_none());
        assert!(frame.transient.is_none());
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_errors_are_swallowed() {
        let mut s = session();
        let frame = TelemetryFrame::capture(&mut s, 0);
        let mut writer = TelemetryWriter::new(Broken);
        assert!(!writer.write(&frame));
        assert_eq!(writer.frames_written(), 0);
    }
}
